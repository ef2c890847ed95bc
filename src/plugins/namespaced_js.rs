//! Namespaced JavaScript.
//!
//! Namespaced modules assign themselves to a dotted global such as
//! `app.view.Main`. Before a namespaced module runs, every CommonJS module it
//! depends on is exposed under its class name, and the package objects the
//! class names hang off are created up front.

use std::fmt::Write as _;
use std::io::Write;

use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use super::{module_request, JS_GROUP};
use crate::bundling::BundleSet;
use crate::core::error::{BundlerError, Result};
use crate::core::traits::ContentPlugin;
use crate::model::AssetId;
use crate::plugins::PluginRegistry;
use crate::router::{ContentPathParser, ContentPathParserBuilder, ParsedContentPath, TokenClass};

const BUNDLE_REQUEST: &str = "bundle-request";
const SINGLE_MODULE_REQUEST: &str = "single-module-request";
const PACKAGE_DEFINITIONS_REQUEST: &str = "package-definitions-request";
const GLOBALIZE_EXTRA_CLASSES_REQUEST: &str = "globalize-extra-classes-request";

#[allow(clippy::expect_used)] // constant request templates
static PARSER: Lazy<ContentPathParser> = Lazy::new(|| {
    ContentPathParserBuilder::new()
        .accepts("namespaced-js/bundle.js")
        .as_form(BUNDLE_REQUEST)
        .and("namespaced-js/module/<module>.js")
        .as_form(SINGLE_MODULE_REQUEST)
        .and("namespaced-js/package-definitions.js")
        .as_form(PACKAGE_DEFINITIONS_REQUEST)
        .and("namespaced-js/globalize-extra-classes.js")
        .as_form(GLOBALIZE_EXTRA_CLASSES_REQUEST)
        .where_token("module")
        .has_form(TokenClass::Path)
        .build()
        .expect("namespaced-js request forms are valid")
});

/// Serves namespaced modules with their globalized dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NamespacedJsContentPlugin;

impl NamespacedJsContentPlugin {
    /// Creates the plugin.
    pub fn new() -> Self {
        Self
    }
}

impl ContentPlugin for NamespacedJsContentPlugin {
    fn request_prefix(&self) -> &str {
        "namespaced-js"
    }

    fn group(&self) -> Option<&str> {
        Some(JS_GROUP)
    }

    fn path_parser(&self) -> &ContentPathParser {
        &PARSER
    }

    fn valid_dev_paths(&self, bundle_set: &BundleSet, _locales: &[String]) -> Result<Vec<String>> {
        let mut paths = vec![PARSER.create_request(PACKAGE_DEFINITIONS_REQUEST, &[])?];
        for module in namespaced_modules(bundle_set) {
            if let Some(require_path) = bundle_set.model().asset(module).require_path() {
                paths.extend(module_request(&PARSER, SINGLE_MODULE_REQUEST, require_path)?);
            }
        }
        paths.push(PARSER.create_request(GLOBALIZE_EXTRA_CLASSES_REQUEST, &[])?);
        Ok(paths)
    }

    fn valid_prod_paths(&self, _bundle_set: &BundleSet, _locales: &[String]) -> Result<Vec<String>> {
        Ok(vec![PARSER.create_request(BUNDLE_REQUEST, &[])?])
    }

    fn write_content(
        &self,
        path: &ParsedContentPath,
        bundle_set: &BundleSet,
        _registry: &PluginRegistry,
        out: &mut dyn Write,
    ) -> Result<()> {
        let model = bundle_set.model();
        let mut globalizer = Globalizer::new(bundle_set);
        let mut text = String::new();

        match path.form_name.as_str() {
            SINGLE_MODULE_REQUEST => {
                let require_path = path.property("module").unwrap_or_default();
                let module = bundle_set.source_module(require_path).ok_or_else(|| {
                    BundlerError::content_processing_error(
                        format!("Module '{}' is not part of the bundle", require_path),
                        None,
                    )
                })?;
                globalizer.globalize_dependencies(module.id(), &mut text);
                text.push_str(&module.content()?);
            }
            BUNDLE_REQUEST => {
                let mut modules = String::new();
                for module in namespaced_modules(bundle_set) {
                    let asset = model.asset(module);
                    globalizer.globalize_dependencies(module, &mut modules);
                    _ = writeln!(modules, "// {}", asset.require_path().unwrap_or_default());
                    modules.push_str(&asset.content()?);
                    modules.push_str("\n\n");
                }
                text.push_str(&globalizer.package_definitions());
                text.push('\n');
                text.push_str(&modules);
                text.push('\n');
                globalizer.globalize_remaining(&mut text);
            }
            PACKAGE_DEFINITIONS_REQUEST => {
                let mut discarded = String::new();
                for module in namespaced_modules(bundle_set) {
                    globalizer.globalize_dependencies(module, &mut discarded);
                }
                text.push_str(&globalizer.package_definitions());
            }
            GLOBALIZE_EXTRA_CLASSES_REQUEST => {
                let mut discarded = String::new();
                for module in namespaced_modules(bundle_set) {
                    globalizer.globalize_dependencies(module, &mut discarded);
                }
                globalizer.globalize_remaining(&mut text);
            }
            other => {
                return Err(BundlerError::content_processing_error(
                    format!("Unknown request form '{}'", other),
                    None,
                ))
            }
        }

        out.write_all(text.as_bytes())?;
        Ok(())
    }
}

fn namespaced_modules(bundle_set: &BundleSet) -> Vec<AssetId> {
    bundle_set
        .source_modules()
        .filter(|asset| asset.source_module().map_or(false, |info| !info.encapsulated))
        .map(|asset| asset.id())
        .collect()
}

/// Tracks which CommonJS modules have been exposed as globals.
struct Globalizer<'a> {
    bundle_set: &'a BundleSet,
    globalized: Vec<AssetId>,
}

impl<'a> Globalizer<'a> {
    fn new(bundle_set: &'a BundleSet) -> Self {
        Self {
            bundle_set,
            globalized: Vec::new(),
        }
    }

    fn globalize_dependencies(&mut self, module: AssetId, out: &mut String) {
        for dependency in self.bundle_set.module_dependencies(module) {
            self.globalize(dependency, out);
        }
    }

    fn globalize_remaining(&mut self, out: &mut String) {
        for module in self.bundle_set.source_module_ids() {
            self.globalize(*module, out);
        }
    }

    fn globalize(&mut self, module: AssetId, out: &mut String) {
        let Some(info) = self.bundle_set.model().asset(module).source_module() else {
            return;
        };
        if info.encapsulated && !self.globalized.contains(&module) {
            self.globalized.push(module);
            _ = writeln!(out, "{} = require('{}');", info.class_name, info.require_path);
        }
    }

    /// `window.<package> = {...};` lines for every package a namespaced or
    /// globalized class lives in.
    fn package_definitions(&self) -> String {
        let mut packages = Map::new();
        for module in namespaced_modules(self.bundle_set) {
            if let Some(info) = self.bundle_set.model().asset(module).source_module() {
                add_package(&mut packages, &info.class_name);
            }
        }
        for module in &self.globalized {
            if let Some(info) = self.bundle_set.model().asset(*module).source_module() {
                let name = info.require_path.replace('/', ".");
                add_package(&mut packages, name.trim_start_matches('.'));
            }
        }

        let mut out = String::new();
        if !packages.is_empty() {
            out.push_str("// package definition block\n");
            for (name, package) in &packages {
                _ = writeln!(out, "window.{} = {};", name, package);
            }
        }
        out
    }
}

fn add_package(packages: &mut Map<String, Value>, class_name: &str) {
    let mut segments: Vec<&str> = class_name.split('.').collect();
    _ = segments.pop();

    let mut current = packages;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
}
