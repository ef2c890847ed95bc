use std::io::Write;

use once_cell::sync::Lazy;

use super::{module_request, JS_GROUP};
use crate::bundling::BundleSet;
use crate::core::error::{BundlerError, Result};
use crate::core::traits::ContentPlugin;
use crate::model::Asset;
use crate::plugins::PluginRegistry;
use crate::router::{ContentPathParser, ContentPathParserBuilder, ParsedContentPath, TokenClass};

const BUNDLE_REQUEST: &str = "bundle-request";
const SINGLE_MODULE_REQUEST: &str = "single-module-request";

#[allow(clippy::expect_used)] // constant request templates
static PARSER: Lazy<ContentPathParser> = Lazy::new(|| {
    ContentPathParserBuilder::new()
        .accepts("common-js/bundle.js")
        .as_form(BUNDLE_REQUEST)
        .and("common-js/module/<module>.js")
        .as_form(SINGLE_MODULE_REQUEST)
        .where_token("module")
        .has_form(TokenClass::Path)
        .build()
        .expect("common-js request forms are valid")
});

/// Wraps every CommonJS module of a bundle in a `define()` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonJsContentPlugin;

impl CommonJsContentPlugin {
    /// Creates the plugin.
    pub fn new() -> Self {
        Self
    }
}

fn encapsulated_modules(bundle_set: &BundleSet) -> impl Iterator<Item = &Asset> + '_ {
    bundle_set
        .source_modules()
        .filter(|asset| asset.source_module().map_or(false, |info| info.encapsulated))
}

fn write_module(module: &Asset, out: &mut dyn Write) -> Result<()> {
    let require_path = module.require_path().unwrap_or_default();
    writeln!(out, "define('{}', function(require, exports, module) {{", require_path)?;
    writeln!(out, "{}", module.content()?)?;
    writeln!(out, "}});")?;
    Ok(())
}

impl ContentPlugin for CommonJsContentPlugin {
    fn request_prefix(&self) -> &str {
        "common-js"
    }

    fn group(&self) -> Option<&str> {
        Some(JS_GROUP)
    }

    fn path_parser(&self) -> &ContentPathParser {
        &PARSER
    }

    fn valid_dev_paths(&self, bundle_set: &BundleSet, _locales: &[String]) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        for require_path in encapsulated_modules(bundle_set).filter_map(Asset::require_path) {
            paths.extend(module_request(&PARSER, SINGLE_MODULE_REQUEST, require_path)?);
        }
        Ok(paths)
    }

    fn valid_prod_paths(&self, bundle_set: &BundleSet, _locales: &[String]) -> Result<Vec<String>> {
        if encapsulated_modules(bundle_set).next().is_none() {
            return Ok(Vec::new());
        }
        Ok(vec![PARSER.create_request(BUNDLE_REQUEST, &[])?])
    }

    fn write_content(
        &self,
        path: &ParsedContentPath,
        bundle_set: &BundleSet,
        _registry: &PluginRegistry,
        out: &mut dyn Write,
    ) -> Result<()> {
        match path.form_name.as_str() {
            SINGLE_MODULE_REQUEST => {
                let require_path = path.property("module").unwrap_or_default();
                let module = bundle_set.source_module(require_path).ok_or_else(|| {
                    BundlerError::content_processing_error(
                        format!("Module '{}' is not part of the bundle", require_path),
                        None,
                    )
                })?;
                write_module(module, out)
            }
            BUNDLE_REQUEST => {
                for module in encapsulated_modules(bundle_set) {
                    write_module(module, out)?;
                }
                Ok(())
            }
            other => Err(BundlerError::content_processing_error(
                format!("Unknown request form '{}'", other),
                None,
            )),
        }
    }
}
