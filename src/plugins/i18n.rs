//! Translation bundles.
//!
//! Translations live in `<language>.properties` and
//! `<language>_<COUNTRY>.properties` files anywhere in a bundle's asset
//! locations. A request for `i18n/en_GB.js` merges every `en.properties`
//! first and every `en_GB.properties` after it, locations in bundle order, so
//! country files and more specific containers win.

use std::io::Write;

use log::debug;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

use crate::bundling::BundleSet;
use crate::core::error::{BundlerError, Result};
use crate::core::traits::ContentPlugin;
use crate::plugins::PluginRegistry;
use crate::router::{ContentPathParser, ContentPathParserBuilder, ParsedContentPath, TokenClass};

const LOCALE_REQUEST: &str = "locale-request";

#[allow(clippy::expect_used)] // constant request templates
static PARSER: Lazy<ContentPathParser> = Lazy::new(|| {
    ContentPathParserBuilder::new()
        .accepts("i18n/<locale>.js")
        .as_form(LOCALE_REQUEST)
        .where_token("locale")
        .has_form(TokenClass::Name)
        .build()
        .expect("i18n request forms are valid")
});

/// Serves merged translations per locale.
#[derive(Debug, Clone, Copy, Default)]
pub struct I18nContentPlugin;

impl I18nContentPlugin {
    /// Creates the plugin.
    pub fn new() -> Self {
        Self
    }
}

impl ContentPlugin for I18nContentPlugin {
    fn request_prefix(&self) -> &str {
        "i18n"
    }

    fn path_parser(&self) -> &ContentPathParser {
        &PARSER
    }

    fn valid_dev_paths(&self, _bundle_set: &BundleSet, locales: &[String]) -> Result<Vec<String>> {
        locales
            .iter()
            .map(|locale| PARSER.create_request(LOCALE_REQUEST, &[locale.as_str()]))
            .collect()
    }

    fn write_content(
        &self,
        path: &ParsedContentPath,
        bundle_set: &BundleSet,
        _registry: &PluginRegistry,
        out: &mut dyn Write,
    ) -> Result<()> {
        let locale = match (path.form_name.as_str(), path.property("locale")) {
            (LOCALE_REQUEST, Some(locale)) => locale,
            _ => {
                return Err(BundlerError::content_processing_error(
                    format!("Unknown request form '{}'", path.form_name),
                    None,
                ))
            }
        };

        let translations = merged_translations(bundle_set, locale)?;
        let json = serde_json::to_string(&translations).map_err(|e| {
            BundlerError::content_processing_error(
                format!("Failed to serialise translations for '{}'", locale),
                Some(Box::new(e)),
            )
        })?;
        writeln!(out, "i18n.registerTranslations(\"{}\", {});", locale, json)?;
        Ok(())
    }
}

fn merged_translations(bundle_set: &BundleSet, locale: &str) -> Result<Map<String, Value>> {
    let language = locale.split('_').next().unwrap_or(locale);
    let mut file_names = vec![format!("{}.properties", language)];
    if language != locale {
        file_names.push(format!("{}.properties", locale));
    }

    let model = bundle_set.model();
    let mut translations = Map::new();
    for file_name in &file_names {
        for location in bundle_set.asset_locations() {
            for id in location.assets() {
                let asset = model.asset(*id);
                if asset.file_name() != file_name.as_str() {
                    continue;
                }
                debug!("Merging translations from '{}'", asset.asset_path());
                for (key, value) in parse_properties(&asset.content()?) {
                    _ = translations.insert(key, Value::String(value));
                }
            }
        }
    }
    Ok(translations)
}

/// Parses `key=value` and `key: value` lines; `#` and `!` start comments and
/// a trailing backslash continues a value on the next line.
pub fn parse_properties(text: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut logical = line.to_string();
        while logical.ends_with('\\') {
            _ = logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(next.trim_start()),
                None => break,
            }
        }

        let split = logical.find(|c: char| c == '=' || c == ':');
        let (key, value) = match split {
            Some(index) => (&logical[..index], &logical[index + 1..]),
            None => (logical.as_str(), ""),
        };
        entries.push((key.trim().to_string(), value.trim().to_string()));
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssetKind;
    use crate::plugins::test_support::AppFixture;

    #[test]
    fn test_parse_properties() {
        let entries = parse_properties(
            "# comment\n! other\napp.title = Hello\napp.name: World\nlong = a \\\n    b\nflag\n",
        );
        assert_eq!(
            entries,
            vec![
                ("app.title".to_string(), "Hello".to_string()),
                ("app.name".to_string(), "World".to_string()),
                ("long".to_string(), "a b".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn test_country_overrides_language() {
        let bundle_set = AppFixture::new("require('app/A');")
            .module("app/A", "module.exports = 1;")
            .resource("en_GB.properties", AssetKind::Static, "app.colour = colour\n")
            .resource("en.properties", AssetKind::Static, "app.colour = color\napp.title = Title\n")
            .library_resource("en.properties", AssetKind::Static, "lib.ok = OK\napp.title = Lib\n")
            .bundle_set();

        let plugin = I18nContentPlugin::new();
        let locales = vec!["en".to_string(), "en_GB".to_string()];
        assert_eq!(
            plugin.valid_dev_paths(&bundle_set, &locales).unwrap(),
            vec!["i18n/en.js", "i18n/en_GB.js"]
        );

        let path = plugin.path_parser().parse("i18n/en_GB.js").unwrap();
        let mut out = Vec::new();
        plugin
            .write_content(&path, &bundle_set, &PluginRegistry::new(), &mut out)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "i18n.registerTranslations(\"en_GB\", \
             {\"app.colour\":\"colour\",\"app.title\":\"Title\",\"lib.ok\":\"OK\"});\n"
        );
    }
}
