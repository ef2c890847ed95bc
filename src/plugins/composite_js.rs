use std::io::Write;

use log::debug;
use once_cell::sync::Lazy;

use super::{DEFAULT_MINIFIER_SETTING, JS_GROUP};
use crate::bundling::BundleSet;
use crate::core::error::{BundlerError, Result};
use crate::core::traits::{ContentPlugin, InputSource};
use crate::plugins::PluginRegistry;
use crate::router::{ContentPathParser, ContentPathParserBuilder, ParsedContentPath, TokenClass};

const DEV_BUNDLE_REQUEST: &str = "dev-bundle-request";
const PROD_BUNDLE_REQUEST: &str = "prod-bundle-request";

#[allow(clippy::expect_used)] // constant request templates
static PARSER: Lazy<ContentPathParser> = Lazy::new(|| {
    ContentPathParserBuilder::new()
        .accepts("js/dev/<minifier-setting>/bundle.js")
        .as_form(DEV_BUNDLE_REQUEST)
        .and("js/prod/<minifier-setting>/bundle.js")
        .as_form(PROD_BUNDLE_REQUEST)
        .where_token("minifier-setting")
        .has_form(TokenClass::Name)
        .build()
        .expect("js request forms are valid")
});

/// Combines the output of every `text/javascript` plugin through a minifier.
///
/// Only the configured minifier setting is advertised in the valid paths,
/// but a request may name any setting a registered minifier handles.
#[derive(Debug, Clone)]
pub struct CompositeJsContentPlugin {
    minifier_setting: String,
}

impl Default for CompositeJsContentPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositeJsContentPlugin {
    /// Creates the plugin advertising the default minifier setting.
    pub fn new() -> Self {
        Self {
            minifier_setting: DEFAULT_MINIFIER_SETTING.to_string(),
        }
    }

    /// Advertises paths for `setting` instead.
    pub fn with_minifier_setting(mut self, setting: &str) -> Self {
        self.minifier_setting = setting.to_string();
        self
    }

    fn request_paths(&self, bundle_set: &BundleSet, form: &str) -> Result<Vec<String>> {
        if bundle_set.source_module_ids().is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![PARSER.create_request(form, &[self.minifier_setting.as_str()])?])
    }
}

/// Renders every path of every sibling plugin into its own input source.
fn sibling_inputs(
    bundle_set: &BundleSet,
    registry: &PluginRegistry,
    dev: bool,
) -> Result<Vec<InputSource>> {
    let mut inputs = Vec::new();
    for plugin in registry.content_plugins_in_group(JS_GROUP) {
        let paths = if dev {
            plugin.valid_dev_paths(bundle_set, &[])?
        } else {
            plugin.valid_prod_paths(bundle_set, &[])?
        };

        for path in paths {
            let parsed = plugin.path_parser().parse(&path)?;
            let mut buffer = Vec::new();
            plugin.write_content(&parsed, bundle_set, registry, &mut buffer)?;
            let content = String::from_utf8(buffer).map_err(|e| {
                BundlerError::content_processing_error(
                    format!("Content of '{}' is not valid UTF-8", path),
                    Some(Box::new(e)),
                )
            })?;
            inputs.push(InputSource::new(path, content));
        }
    }
    Ok(inputs)
}

impl ContentPlugin for CompositeJsContentPlugin {
    fn request_prefix(&self) -> &str {
        "js"
    }

    fn path_parser(&self) -> &ContentPathParser {
        &PARSER
    }

    fn valid_dev_paths(&self, bundle_set: &BundleSet, _locales: &[String]) -> Result<Vec<String>> {
        self.request_paths(bundle_set, DEV_BUNDLE_REQUEST)
    }

    fn valid_prod_paths(&self, bundle_set: &BundleSet, _locales: &[String]) -> Result<Vec<String>> {
        self.request_paths(bundle_set, PROD_BUNDLE_REQUEST)
    }

    fn write_content(
        &self,
        path: &ParsedContentPath,
        bundle_set: &BundleSet,
        registry: &PluginRegistry,
        out: &mut dyn Write,
    ) -> Result<()> {
        let dev = match path.form_name.as_str() {
            DEV_BUNDLE_REQUEST => true,
            PROD_BUNDLE_REQUEST => false,
            other => {
                return Err(BundlerError::content_processing_error(
                    format!("Unknown request form '{}'", other),
                    None,
                ))
            }
        };

        let setting = path.property("minifier-setting").unwrap_or_default();
        let minifier = registry.minifier(setting).ok_or_else(|| {
            BundlerError::content_processing_error(
                format!("No minifier handles the setting '{}'", setting),
                None,
            )
        })?;

        let inputs = sibling_inputs(bundle_set, registry, dev)?;
        debug!("Minifying {} inputs with '{}'", inputs.len(), setting);
        minifier.minify(setting, &inputs, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::test_support::AppFixture;

    fn bundle() -> BundleSet {
        AppFixture::new("new app.Main(); require('alias!logger');")
            .module("app/Main", "app.Main = function() { return require('app/util'); };")
            .module("app/util", "module.exports = 1;")
            .module("app/Logger", "module.exports = console;")
            .alias("logger", "app/Logger")
            .bundle_set()
    }

    fn render(registry: &PluginRegistry, bundle_set: &BundleSet, request: &str) -> Result<String> {
        let plugin = registry.content_plugin("js").unwrap();
        let path = plugin.path_parser().parse(request)?;
        let mut out = Vec::new();
        plugin.write_content(&path, bundle_set, registry, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn concatenated(registry: &PluginRegistry, bundle_set: &BundleSet, dev: bool) -> String {
        sibling_inputs(bundle_set, registry, dev)
            .unwrap()
            .into_iter()
            .map(|input| input.content)
            .collect()
    }

    #[test]
    fn test_combined_equals_sibling_concatenation() {
        let registry = PluginRegistry::with_defaults();
        let bundle_set = bundle();

        let dev = render(&registry, &bundle_set, "js/dev/combined/bundle.js").unwrap();
        assert_eq!(dev, concatenated(&registry, &bundle_set, true));
        assert!(dev.contains("define('app/util'"));
        assert!(dev.contains("define('alias!logger'"));
        assert!(dev.contains("app.Main = function()"));

        let prod = render(&registry, &bundle_set, "js/prod/combined/bundle.js").unwrap();
        assert_eq!(prod, concatenated(&registry, &bundle_set, false));
    }

    #[test]
    fn test_inputs_follow_registration_order() {
        let registry = PluginRegistry::with_defaults();
        let names: Vec<String> = sibling_inputs(&bundle(), &registry, false)
            .unwrap()
            .into_iter()
            .map(|input| input.name)
            .collect();
        assert_eq!(
            names,
            vec!["common-js/bundle.js", "aliasing/bundle.js", "namespaced-js/bundle.js"]
        );
    }

    #[test]
    fn test_paths_use_configured_setting() {
        let bundle_set = bundle();
        let plugin = CompositeJsContentPlugin::new().with_minifier_setting("whitespace");
        assert_eq!(
            plugin.valid_dev_paths(&bundle_set, &[]).unwrap(),
            vec!["js/dev/whitespace/bundle.js"]
        );
        assert_eq!(
            plugin.valid_prod_paths(&bundle_set, &[]).unwrap(),
            vec!["js/prod/whitespace/bundle.js"]
        );

        let empty = AppFixture::new("").bundle_set();
        assert!(plugin.valid_dev_paths(&empty, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_minifier_fails() {
        let registry = PluginRegistry::with_defaults();
        let err = render(&registry, &bundle(), "js/dev/uglify/bundle.js").unwrap_err();
        assert!(matches!(err, BundlerError::ContentProcessing { .. }));
    }

    #[test]
    fn test_dev_bundle_renders_with_dotted_module() {
        let registry = PluginRegistry::with_defaults();
        let bundle_set = AppFixture::new("require('app/A');")
            .module("app/A", "var $ = require('lib/jquery.min');\nmodule.exports = $;")
            .module("lib/jquery.min", "module.exports = {};")
            .bundle_set();

        let plugin = registry.content_plugin("js").unwrap();
        assert_eq!(
            plugin.valid_dev_paths(&bundle_set, &[]).unwrap(),
            vec!["js/dev/combined/bundle.js"]
        );
        let dev = render(&registry, &bundle_set, "js/dev/combined/bundle.js").unwrap();
        assert!(dev.contains("define('app/A'"));
        let prod = render(&registry, &bundle_set, "js/prod/combined/bundle.js").unwrap();
        assert!(prod.contains("define('lib/jquery.min'"));
    }
}
