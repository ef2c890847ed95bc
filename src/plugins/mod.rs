//! # Content Plugins
//!
//! Built-in [`ContentPlugin`]s and [`MinifierPlugin`]s, and the
//! [`PluginRegistry`] that owns them. The registry is constructed once and
//! passed by reference to the router, the facade and to plugins that need to
//! reach their siblings.
//!
//! | Prefix | Plugin | Group |
//! |---|---|---|
//! | `common-js` | [`CommonJsContentPlugin`](common_js::CommonJsContentPlugin) | `text/javascript` |
//! | `aliasing` | [`AliasingContentPlugin`](alias_js::AliasingContentPlugin) | `text/javascript` |
//! | `namespaced-js` | [`NamespacedJsContentPlugin`](namespaced_js::NamespacedJsContentPlugin) | `text/javascript` |
//! | `js` | [`CompositeJsContentPlugin`](composite_js::CompositeJsContentPlugin) | |
//! | `css` | [`CssContentPlugin`](css::CssContentPlugin) | |
//! | `i18n` | [`I18nContentPlugin`](i18n::I18nContentPlugin) | |

use std::fmt;

use log::warn;

use crate::core::error::{BundlerError, Result};
use crate::core::traits::{ContentPlugin, MinifierPlugin};
use crate::router::ContentPathParser;

/// `define()` wrappers for alias modules.
pub mod alias_js;
/// CommonJS module wrapping.
pub mod common_js;
/// Aggregation of every `text/javascript` plugin.
pub mod composite_js;
/// Stylesheet concatenation.
pub mod css;
/// Translation bundles.
pub mod i18n;
/// Concatenating and whitespace minifiers.
pub mod minifiers;
/// Namespaced module globalisation.
pub mod namespaced_js;
/// Length-checked response bodies.
pub mod response;

pub use response::{CountingWriter, ResponseContent};

/// The group of every plugin producing JavaScript.
pub const JS_GROUP: &str = "text/javascript";

/// The minifier setting used when none is configured.
pub const DEFAULT_MINIFIER_SETTING: &str = "combined";

/// Creates the request of `form` for one module, or `None` when the module's
/// require path cannot appear in a request (e.g. `lib/jquery.min`).
pub(crate) fn module_request(
    parser: &ContentPathParser,
    form: &str,
    require_path: &str,
) -> Result<Option<String>> {
    match parser.create_request(form, &[require_path]) {
        Ok(request) => Ok(Some(request)),
        Err(BundlerError::MalformedToken { message, .. }) => {
            warn!(
                "Module '{}' cannot be requested on its own and is left out of the dev paths: {}",
                require_path, message
            );
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Owns the content and minifier plugins of a bundler.
#[derive(Default)]
pub struct PluginRegistry {
    content_plugins: Vec<Box<dyn ContentPlugin>>,
    minifiers: Vec<Box<dyn MinifierPlugin>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field(
                "content_plugins",
                &self
                    .content_plugins
                    .iter()
                    .map(|plugin| plugin.request_prefix())
                    .collect::<Vec<_>>(),
            )
            .field("minifier_settings", &self.minifier_settings())
            .finish()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in plugin.
    pub fn with_defaults() -> Self {
        Self::with_minifier_setting(DEFAULT_MINIFIER_SETTING)
    }

    /// Creates a registry holding every built-in plugin, with the composite
    /// JavaScript plugin advertising paths for `setting`.
    pub fn with_minifier_setting(setting: &str) -> Self {
        let mut registry = Self::new();
        registry.add_content_plugin(Box::new(common_js::CommonJsContentPlugin::new()));
        registry.add_content_plugin(Box::new(alias_js::AliasingContentPlugin::new()));
        registry.add_content_plugin(Box::new(namespaced_js::NamespacedJsContentPlugin::new()));
        registry.add_content_plugin(Box::new(
            composite_js::CompositeJsContentPlugin::new().with_minifier_setting(setting),
        ));
        registry.add_content_plugin(Box::new(css::CssContentPlugin::new()));
        registry.add_content_plugin(Box::new(i18n::I18nContentPlugin::new()));
        registry.add_minifier(Box::new(minifiers::ConcatenatingMinifier));
        registry.add_minifier(Box::new(minifiers::WhitespaceMinifier));
        registry
    }

    /// Registers a content plugin.
    pub fn add_content_plugin(&mut self, plugin: Box<dyn ContentPlugin>) {
        self.content_plugins.push(plugin);
    }

    /// Registers a minifier.
    pub fn add_minifier(&mut self, minifier: Box<dyn MinifierPlugin>) {
        self.minifiers.push(minifier);
    }

    /// Every content plugin in registration order.
    pub fn content_plugins(&self) -> &[Box<dyn ContentPlugin>] {
        &self.content_plugins
    }

    /// The content plugin answering to `prefix`.
    pub fn content_plugin(&self, prefix: &str) -> Option<&dyn ContentPlugin> {
        self.content_plugins
            .iter()
            .find(|plugin| plugin.request_prefix() == prefix)
            .map(|plugin| plugin.as_ref())
    }

    /// Content plugins of `group`, in registration order.
    pub fn content_plugins_in_group<'r>(
        &'r self,
        group: &'r str,
    ) -> impl Iterator<Item = &'r dyn ContentPlugin> + 'r {
        self.content_plugins
            .iter()
            .filter(move |plugin| plugin.group() == Some(group))
            .map(|plugin| plugin.as_ref())
    }

    /// The minifier handling `setting`.
    pub fn minifier(&self, setting: &str) -> Option<&dyn MinifierPlugin> {
        self.minifiers
            .iter()
            .find(|minifier| minifier.setting_names().contains(&setting))
            .map(|minifier| minifier.as_ref())
    }

    /// Every minifier setting, in registration order.
    pub fn minifier_settings(&self) -> Vec<&'static str> {
        self.minifiers
            .iter()
            .flat_map(|minifier| minifier.setting_names().iter().copied())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::Arc;

    use crate::aliasing::{AliasDefinition, AliasDefinitionsFile};
    use crate::bundling::{BundleSet, BundleSetBuilder};
    use crate::model::{
        AssetKind, BundlableKind, ContainerId, ContainerKind, LocationId, ModelBuilder,
    };

    /// A model with a library and one aspect whose index page is the only seed.
    pub(crate) struct AppFixture {
        pub(crate) builder: ModelBuilder,
        pub(crate) src: LocationId,
        pub(crate) res: LocationId,
        lib_res: LocationId,
        index: String,
        containers: Vec<ContainerId>,
        app: ContainerId,
        aspect: ContainerId,
        root: LocationId,
        aliases: Vec<AliasDefinition>,
    }

    impl AppFixture {
        pub(crate) fn new(index: &str) -> Self {
            let mut builder = ModelBuilder::new("/app");
            let app = builder.add_container("app", ContainerKind::App, "/app");
            let lib = builder.add_container("lib", ContainerKind::Library, "/app/libs/lib");
            let lib_res = builder.add_location(lib, "resources", "/app/libs/lib/resources");
            let aspect = builder.add_container("default", ContainerKind::Aspect, "/app/default-aspect");
            let root = builder.add_location(aspect, "root", "/app/default-aspect");
            let src = builder.add_location(aspect, "src", "/app/default-aspect/src");
            let res = builder.add_location(aspect, "resources", "/app/default-aspect/resources");
            builder.location_depends_on(src, res);
            builder.location_depends_on(src, lib_res);
            Self {
                builder,
                src,
                res,
                lib_res,
                index: index.to_string(),
                containers: vec![lib, app, aspect],
                app,
                aspect,
                root,
                aliases: Vec::new(),
            }
        }

        pub(crate) fn module(mut self, require_path: &str, text: &str) -> Self {
            _ = self.builder.add_source_module(self.src, require_path, text);
            self
        }

        pub(crate) fn resource(mut self, file_name: &str, kind: AssetKind, text: &str) -> Self {
            _ = self.builder.add_inline_asset(self.res, file_name, kind, text);
            self
        }

        pub(crate) fn library_resource(mut self, file_name: &str, kind: AssetKind, text: &str) -> Self {
            _ = self.builder.add_inline_asset(self.lib_res, file_name, kind, text);
            self
        }

        /// Defines `name` at app level with `class` as its default target.
        pub(crate) fn alias(mut self, name: &str, class: &str) -> Self {
            self.aliases.push(AliasDefinition {
                name: name.to_string(),
                class: Some(class.to_string()),
                ..AliasDefinition::default()
            });
            self
        }

        pub(crate) fn bundle_set(self) -> BundleSet {
            let mut builder = self.builder;
            if !self.aliases.is_empty() {
                builder.set_alias_definitions(
                    self.app,
                    AliasDefinitionsFile::new(PathBuf::from("/app/alias-definitions.toml"), self.aliases),
                );
            }
            let index = builder.add_inline_asset(self.root, "index.html", AssetKind::Linked, &self.index);
            let node = builder.add_node(
                "default",
                BundlableKind::Aspect,
                self.aspect,
                vec![index],
                self.containers,
            );
            let model = Arc::new(builder.build().unwrap());
            BundleSetBuilder::new(model, node).build().unwrap()
        }
    }
}
