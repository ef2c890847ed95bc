use std::io::Write;

use once_cell::sync::Lazy;

use crate::bundling::BundleSet;
use crate::core::error::{BundlerError, Result};
use crate::core::traits::ContentPlugin;
use crate::model::Asset;
use crate::plugins::PluginRegistry;
use crate::router::{ContentPathParser, ContentPathParserBuilder, ParsedContentPath};

const BUNDLE_REQUEST: &str = "bundle-request";

#[allow(clippy::expect_used)] // constant request templates
static PARSER: Lazy<ContentPathParser> = Lazy::new(|| {
    ContentPathParserBuilder::new()
        .accepts("css/bundle.css")
        .as_form(BUNDLE_REQUEST)
        .build()
        .expect("css request forms are valid")
});

/// Concatenates the stylesheets of a bundle's asset locations.
#[derive(Debug, Clone, Copy, Default)]
pub struct CssContentPlugin;

impl CssContentPlugin {
    /// Creates the plugin.
    pub fn new() -> Self {
        Self
    }
}

/// Stylesheets of every bundle location, locations in bundle order.
fn stylesheets(bundle_set: &BundleSet) -> impl Iterator<Item = &Asset> + '_ {
    let model = bundle_set.model();
    bundle_set
        .asset_locations()
        .flat_map(|location| location.assets().iter())
        .map(move |id| model.asset(*id))
        .filter(|asset| asset.has_extension("css"))
}

impl ContentPlugin for CssContentPlugin {
    fn request_prefix(&self) -> &str {
        "css"
    }

    fn path_parser(&self) -> &ContentPathParser {
        &PARSER
    }

    fn valid_dev_paths(&self, bundle_set: &BundleSet, _locales: &[String]) -> Result<Vec<String>> {
        if stylesheets(bundle_set).next().is_none() {
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

        for stylesheet in stylesheets(bundle_set) {
            let content = stylesheet.content()?;
            out.write_all(content.as_bytes())?;
            if !content.ends_with('\n') {
                out.write_all(b"\n")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssetKind;
    use crate::plugins::test_support::AppFixture;

    #[test]
    fn test_library_styles_come_first() {
        let bundle_set = AppFixture::new("require('app/A');")
            .module("app/A", "module.exports = 1;")
            .resource("app.css", AssetKind::Static, ".app {}")
            .library_resource("lib.css", AssetKind::Static, ".lib {}\n")
            .resource("logo.png", AssetKind::Static, "")
            .bundle_set();

        let plugin = CssContentPlugin::new();
        assert_eq!(
            plugin.valid_dev_paths(&bundle_set, &[]).unwrap(),
            vec!["css/bundle.css"]
        );

        let path = plugin.path_parser().parse("css/bundle.css").unwrap();
        let mut out = Vec::new();
        plugin
            .write_content(&path, &bundle_set, &PluginRegistry::new(), &mut out)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), ".lib {}\n.app {}\n");
    }

    #[test]
    fn test_no_stylesheets_no_paths() {
        let bundle_set = AppFixture::new("").bundle_set();
        assert!(CssContentPlugin::new()
            .valid_dev_paths(&bundle_set, &[])
            .unwrap()
            .is_empty());
    }
}
