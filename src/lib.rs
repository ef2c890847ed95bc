// Copyright © 2024 BundleFlow. All rights reserved.
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # BundleFlow Library
//!
//! BundleFlow computes the minimal, correctly ordered set of source modules
//! and resources an application entry point needs, and serves that set
//! through content plugins addressed by request paths such as
//! `common-js/module/app/Main.js` or `js/prod/combined/bundle.js`.
//!
//! The [`Bundler`] facade ties the layers together: it discovers the
//! application model, owns the plugin registry and the content router, and
//! optionally keeps a file watcher alive so memoized state is only recomputed
//! when files change.

#![doc = include_str!("../README.md")]
#![crate_name = "bundleflow"]
#![crate_type = "lib"]

use std::io::Write;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use crate::bundling::{BundleSet, BundleSetBuilder};
use crate::core::config::{Config, Profile};
use crate::memoization::WatchService;
use crate::model::discovery::{self, DiscoveryOptions};
use crate::model::{BundlableKind, Model, NodeId};
use crate::plugins::{PluginRegistry, ResponseContent};
use crate::router::ContentRouter;

/// Alias files, scenarios and alias resolution.
pub mod aliasing;

/// Bundle-set construction, module ordering and dependency reports.
pub mod bundling;

/// Configuration, errors and the plugin traits.
pub mod core;

/// File-change detection and memoized values.
pub mod memoization;

/// The asset model and its discovery from an application directory.
pub mod model;

/// Built-in content plugins and minifiers.
pub mod plugins;

/// Content path parsing and request routing.
pub mod router;

pub use crate::core::config::ConfigBuilder;
pub use crate::core::error::{BundlerError, Result};
pub use crate::core::traits::{ContentPlugin, InputSource, MinifierPlugin};

/// Serves the content of one application.
///
/// A `Bundler` is cheap to query: the model is shared behind an `Arc`, and
/// each request builds a fresh [`BundleSet`] for the node it targets.
#[derive(Debug)]
pub struct Bundler {
    config: Arc<RwLock<Config>>,
    model: Arc<Model>,
    registry: PluginRegistry,
    router: ContentRouter,
    watcher: Option<WatchService>,
}

impl Bundler {
    /// Discovers the application named by `config` and prepares its plugins.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the configured minifier setting is not
    /// handled by any registered minifier, and any error raised by
    /// discovery or by starting the file watcher.
    pub fn open(config: Arc<RwLock<Config>>) -> Result<Self> {
        let snapshot = config.read().clone();

        let registry = PluginRegistry::with_minifier_setting(&snapshot.content.minifier);
        if registry.minifier(&snapshot.content.minifier).is_none() {
            return Err(BundlerError::config_error(
                format!(
                    "No minifier handles the setting '{}' (known settings: {})",
                    snapshot.content.minifier,
                    registry.minifier_settings().join(", ")
                ),
                None,
            ));
        }
        let router = ContentRouter::new(&registry)?;

        let options = DiscoveryOptions {
            bootstrap_library: snapshot.bundling.bootstrap_library.clone(),
            default_aspect: snapshot.bundling.default_aspect.clone(),
            watch: snapshot.bundling.watch,
        };
        let model = Arc::new(discovery::discover(&snapshot.app_dir, &options)?);

        let watcher = if snapshot.bundling.watch {
            Some(WatchService::start(Arc::clone(model.file_registry()))?)
        } else {
            None
        };

        info!(
            "Opened '{}' with {} bundlable nodes",
            model.root().display(),
            model.nodes().len()
        );
        Ok(Self {
            config,
            model,
            registry,
            router,
            watcher,
        })
    }

    /// The shared configuration.
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.config
    }

    /// The discovered application model.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The plugins serving content.
    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Whether file changes are being watched.
    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    /// Looks up a bundlable node by kind and name.
    ///
    /// # Errors
    ///
    /// Returns `ModelOperation` when the application has no such node.
    pub fn node(&self, kind: BundlableKind, name: &str) -> Result<NodeId> {
        self.model
            .find_node(kind, name)
            .map(|node| node.id())
            .ok_or_else(|| {
                let kind = match kind {
                    BundlableKind::Aspect => "aspect",
                    BundlableKind::Workbench => "workbench",
                };
                BundlerError::model_operation(
                    format!("The application has no {} named '{}'", kind, name),
                    None,
                )
            })
    }

    /// Builds the bundle set of `node`.
    pub fn bundle_set(&self, node: NodeId) -> Result<BundleSet> {
        BundleSetBuilder::new(Arc::clone(&self.model), node).build()
    }

    /// Every request path the plugins advertise for `node` under `profile`.
    pub fn valid_content_paths(&self, node: NodeId, profile: Profile) -> Result<Vec<String>> {
        let bundle_set = self.bundle_set(node)?;
        let locales = self.config.read().content.locales.clone();

        let mut paths = Vec::new();
        for plugin in self.registry.content_plugins() {
            let plugin_paths = match profile {
                Profile::Development => plugin.valid_dev_paths(&bundle_set, &locales)?,
                Profile::Production => plugin.valid_prod_paths(&bundle_set, &locales)?,
            };
            paths.extend(plugin_paths);
        }
        Ok(paths)
    }

    /// Renders the content at `path` for `node`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` or `MalformedToken` when the path is not
    /// understood, the bundle-set build error when the node cannot be built,
    /// and `ContentProcessing` wrapping whatever failed while the plugin
    /// wrote its output.
    pub fn content(&self, node: NodeId, path: &str) -> Result<ResponseContent> {
        let (plugin, parsed) = self.router.route(&self.registry, path)?;
        let bundle_set = self.bundle_set(node)?;

        let mut buffer = Vec::new();
        plugin
            .write_content(&parsed, &bundle_set, &self.registry, &mut buffer)
            .map_err(|e| e.into_content_processing(&format!("Failed to write '{}'", path)))?;
        debug!("Rendered {} bytes for '{}'", buffer.len(), path);

        Ok(ResponseContent::new(path, plugin.group(), buffer))
    }

    /// Renders the content at `path` for `node` into `out`, returning the
    /// number of bytes written.
    pub fn write_content(&self, node: NodeId, path: &str, out: &mut dyn Write) -> Result<u64> {
        self.content(node, path)?.write_to(out)
    }

    /// Renders the dependency tree of `node`.
    pub fn dependency_report(&self, node: NodeId, show_all: bool) -> Result<String> {
        bundling::report::node_report(&self.model, node, show_all)
    }

    /// Renders the dependency tree of the module `alias` resolves to.
    pub fn alias_report(&self, node: NodeId, alias: &str, show_all: bool) -> Result<String> {
        bundling::report::alias_report(&self.model, node, alias, show_all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, path: &str, text: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    fn sample_app() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "libs/lib/src/lib/Util.js", "module.exports = 1;");
        write(root, "default-aspect/index.html", "require('app/Main');");
        write(
            root,
            "default-aspect/src/app/Main.js",
            "var util = require('lib/Util');\nmodule.exports = util;",
        );
        write(root, "default-aspect/resources/style.css", "body {}\n");
        write(root, "default-aspect/resources/en.properties", "app.title = Title\n");
        dir
    }

    fn open(app: &TempDir) -> Bundler {
        let config = ConfigBuilder::new()
            .with_override("app_dir", app.path().to_string_lossy().into_owned())
            .build()
            .unwrap();
        Bundler::open(config).unwrap()
    }

    #[test]
    fn test_valid_content_paths_per_profile() {
        let app = sample_app();
        let bundler = open(&app);
        let node = bundler.node(BundlableKind::Aspect, "default").unwrap();

        let dev = bundler.valid_content_paths(node, Profile::Development).unwrap();
        assert!(dev.contains(&"common-js/module/lib/Util.js".to_string()));
        assert!(dev.contains(&"common-js/module/app/Main.js".to_string()));
        assert!(dev.contains(&"js/dev/combined/bundle.js".to_string()));
        assert!(dev.contains(&"css/bundle.css".to_string()));
        assert!(dev.contains(&"i18n/en.js".to_string()));

        let prod = bundler.valid_content_paths(node, Profile::Production).unwrap();
        assert!(prod.contains(&"common-js/bundle.js".to_string()));
        assert!(prod.contains(&"js/prod/combined/bundle.js".to_string()));
        assert!(!prod.contains(&"common-js/module/app/Main.js".to_string()));
    }

    #[test]
    fn test_content_orders_dependencies_first() {
        let app = sample_app();
        let bundler = open(&app);
        let node = bundler.node(BundlableKind::Aspect, "default").unwrap();

        let response = bundler.content(node, "/common-js/bundle.js").unwrap();
        let text = response.to_text();
        let util = text.find("define('lib/Util'").unwrap();
        let main = text.find("define('app/Main'").unwrap();
        assert!(util < main);
        assert_eq!(response.content_length(), text.len() as u64);

        let mut out = Vec::new();
        let written = bundler.write_content(node, "css/bundle.css", &mut out).unwrap();
        assert_eq!(written, out.len() as u64);
        assert_eq!(String::from_utf8(out).unwrap(), "body {}\n");
    }

    #[test]
    fn test_unknown_requests_and_nodes() {
        let app = sample_app();
        let bundler = open(&app);
        let node = bundler.node(BundlableKind::Aspect, "default").unwrap();

        assert!(matches!(
            bundler.content(node, "nope/bundle.js"),
            Err(BundlerError::MalformedRequest { .. })
        ));
        assert!(matches!(
            bundler.content(node, "common-js/module/app/Missing.js"),
            Err(BundlerError::ContentProcessing { .. })
        ));
        assert!(matches!(
            bundler.node(BundlableKind::Workbench, "missing"),
            Err(BundlerError::ModelOperation { .. })
        ));
    }

    #[test]
    fn test_unknown_minifier_setting_is_rejected() {
        let app = sample_app();
        let config = ConfigBuilder::new()
            .with_override("app_dir", app.path().to_string_lossy().into_owned())
            .with_override("content.minifier", "uglify")
            .build()
            .unwrap();
        assert!(matches!(
            Bundler::open(config),
            Err(BundlerError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_dependency_report_names_modules() {
        let app = sample_app();
        let bundler = open(&app);
        let node = bundler.node(BundlableKind::Aspect, "default").unwrap();

        let report = bundler.dependency_report(node, false).unwrap();
        assert!(report.starts_with("Aspect 'default' dependencies found:"));
        assert!(report.contains("default-aspect/src/app/Main.js"));
        assert!(report.contains("lib/src/lib/Util.js"));
    }
}
