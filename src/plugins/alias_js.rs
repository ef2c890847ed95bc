use std::io::Write;

use log::debug;
use once_cell::sync::Lazy;

use super::JS_GROUP;
use crate::bundling::BundleSet;
use crate::core::error::{BundlerError, Result};
use crate::core::traits::ContentPlugin;
use crate::plugins::PluginRegistry;
use crate::router::{ContentPathParser, ContentPathParserBuilder, ParsedContentPath};

const BUNDLE_REQUEST: &str = "bundle-request";

#[allow(clippy::expect_used)] // constant request templates
static PARSER: Lazy<ContentPathParser> = Lazy::new(|| {
    ContentPathParserBuilder::new()
        .accepts("aliasing/bundle.js")
        .as_form(BUNDLE_REQUEST)
        .build()
        .expect("aliasing request forms are valid")
});

/// Defines an `alias!<name>` module for every alias the bundle uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct AliasingContentPlugin;

impl AliasingContentPlugin {
    /// Creates the plugin.
    pub fn new() -> Self {
        Self
    }
}

impl ContentPlugin for AliasingContentPlugin {
    fn request_prefix(&self) -> &str {
        "aliasing"
    }

    fn group(&self) -> Option<&str> {
        Some(JS_GROUP)
    }

    fn path_parser(&self) -> &ContentPathParser {
        &PARSER
    }

    fn valid_dev_paths(&self, bundle_set: &BundleSet, _locales: &[String]) -> Result<Vec<String>> {
        if bundle_set.aliases().is_empty() {
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
        if path.form_name != BUNDLE_REQUEST {
            return Err(BundlerError::content_processing_error(
                format!("Unknown request form '{}'", path.form_name),
                None,
            ));
        }

        debug!(
            "Writing {} aliases for scenario '{}'",
            bundle_set.aliases().len(),
            bundle_set.scenario().unwrap_or("default")
        );
        for (alias, target) in bundle_set.aliases() {
            let Some(info) = bundle_set.model().asset(*target).source_module() else {
                continue;
            };
            writeln!(out, "define('alias!{}', function(require, exports, module) {{", alias)?;
            if info.encapsulated {
                writeln!(out, "\tmodule.exports = require('{}');", info.require_path)?;
            } else {
                writeln!(out, "\tmodule.exports = {};", info.class_name)?;
            }
            writeln!(out, "}});")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::test_support::AppFixture;

    #[test]
    fn test_aliases_are_defined() {
        let bundle_set = AppFixture::new("require('alias!logger'); require('alias!view');")
            .module("app/ConsoleLogger", "module.exports = console;")
            .module("app/View", "app.View = function() {};")
            .alias("logger", "app/ConsoleLogger")
            .alias("view", "app.View")
            .bundle_set();

        let plugin = AliasingContentPlugin::new();
        assert_eq!(
            plugin.valid_dev_paths(&bundle_set, &[]).unwrap(),
            vec!["aliasing/bundle.js"]
        );

        let path = plugin.path_parser().parse("aliasing/bundle.js").unwrap();
        let mut out = Vec::new();
        plugin
            .write_content(&path, &bundle_set, &PluginRegistry::new(), &mut out)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "define('alias!logger', function(require, exports, module) {\n\
             \tmodule.exports = require('app/ConsoleLogger');\n\
             });\n\
             define('alias!view', function(require, exports, module) {\n\
             \tmodule.exports = app.View;\n\
             });\n"
        );
    }

    #[test]
    fn test_no_aliases_no_paths() {
        let bundle_set = AppFixture::new("require('app/A');")
            .module("app/A", "module.exports = 1;")
            .bundle_set();
        assert!(AliasingContentPlugin::new()
            .valid_dev_paths(&bundle_set, &[])
            .unwrap()
            .is_empty());
    }
}
