//! # Content Request Routing
//!
//! Request paths look like `<prefix>/<literal segments>/<placeholder>/...`.
//! The [`ContentRouter`] selects a plugin by the literal prefix segment and
//! hands the full path to that plugin's [`ContentPathParser`], which matches
//! it against a compiled character [`Trie`](trie::Trie) of request templates.

use std::collections::HashMap;

use log::debug;

use crate::core::error::{BundlerError, Result};
use crate::core::traits::ContentPlugin;
use crate::plugins::PluginRegistry;

/// Request templates and their compiled matcher.
pub mod parser;
/// Character trie with compressed literal runs.
pub mod trie;

pub use parser::{ContentPathParser, ContentPathParserBuilder, ParsedContentPath};
pub use trie::{NodeKind, PatternPart, TokenClass, Trie, TrieBuilder};

/// Maps request prefixes to the content plugins of a registry.
#[derive(Debug)]
pub struct ContentRouter {
    prefixes: HashMap<String, usize>,
}

impl ContentRouter {
    /// Indexes the content plugins of `registry` by request prefix.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when two plugins claim the same prefix or a
    /// prefix contains `/`.
    pub fn new(registry: &PluginRegistry) -> Result<Self> {
        let mut prefixes = HashMap::new();
        for (index, plugin) in registry.content_plugins().iter().enumerate() {
            let prefix = plugin.request_prefix();
            if prefix.is_empty() || prefix.contains('/') {
                return Err(BundlerError::config_error(
                    format!("Invalid request prefix '{}'", prefix),
                    None,
                ));
            }
            if prefixes.insert(prefix.to_string(), index).is_some() {
                return Err(BundlerError::config_error(
                    format!(
                        "Request prefix '{}' is claimed by more than one content plugin",
                        prefix
                    ),
                    None,
                ));
            }
        }
        Ok(Self { prefixes })
    }

    /// Resolves `path` to the plugin serving it and the parsed request.
    ///
    /// A leading `/` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `MalformedRequest` when no plugin owns the prefix or the
    /// plugin's parser rejects the path.
    pub fn route<'r>(
        &self,
        registry: &'r PluginRegistry,
        path: &str,
    ) -> Result<(&'r dyn ContentPlugin, ParsedContentPath)> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let prefix = path.split('/').next().unwrap_or_default();

        let plugin = self
            .prefixes
            .get(prefix)
            .and_then(|index| registry.content_plugins().get(*index))
            .ok_or_else(|| {
                BundlerError::malformed_request(
                    path,
                    format!("no content plugin handles the prefix '{}'", prefix),
                )
            })?;

        let parsed = plugin.path_parser().parse(path)?;
        debug!(
            "Routed '{}' to '{}' as form '{}'",
            path,
            plugin.request_prefix(),
            parsed.form_name
        );
        Ok((plugin.as_ref(), parsed))
    }

    /// Whether some plugin answers to `prefix`.
    pub fn handles(&self, prefix: &str) -> bool {
        self.prefixes.contains_key(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_strips_leading_slash() {
        let registry = PluginRegistry::with_defaults();
        let router = ContentRouter::new(&registry).unwrap();

        let (plugin, parsed) = router
            .route(&registry, "/js/dev/combined/bundle.js")
            .unwrap();
        assert_eq!(plugin.request_prefix(), "js");
        assert_eq!(parsed.property("minifier-setting"), Some("combined"));

        let (plugin, parsed) =
            router.route(&registry, "common-js/module/app/Main.js").unwrap();
        assert_eq!(plugin.request_prefix(), "common-js");
        assert_eq!(parsed.property("module"), Some("app/Main"));
    }

    #[test]
    fn test_unknown_prefix_is_malformed_request() {
        let registry = PluginRegistry::with_defaults();
        let router = ContentRouter::new(&registry).unwrap();

        assert!(!router.handles("xml"));
        assert!(matches!(
            router.route(&registry, "xml/bundle.xml").unwrap_err(),
            BundlerError::MalformedRequest { .. }
        ));
        assert!(matches!(
            router.route(&registry, "css/other.css").unwrap_err(),
            BundlerError::MalformedRequest { .. }
        ));
    }

    #[test]
    fn test_duplicate_prefix_is_rejected() {
        let mut registry = PluginRegistry::with_defaults();
        registry.add_content_plugin(Box::new(crate::plugins::css::CssContentPlugin::new()));
        assert!(ContentRouter::new(&registry).is_err());
    }
}
