//! # Core Traits Module
//!
//! This module defines the capability traits that every plugin of the
//! bundling engine implements. A plugin is registered once in a
//! [`PluginRegistry`](crate::plugins::PluginRegistry) and then invoked by
//! reference for every request it serves.
//!
//! ## Key Traits
//!
//! - [`ContentPlugin`]: Renders one content type from a bundle set
//! - [`MinifierPlugin`]: Post-processes the combined output of several plugins
//!
//! ## Design
//!
//! - Plugins hold no per-request state; everything a request needs arrives
//!   through its arguments.
//! - The registry is passed explicitly, so composite plugins can reach their
//!   siblings without any global lookup.
//! - Output goes to a borrowed writer; plugins never buffer a response
//!   themselves unless they need to post-process it.

use std::fmt;
use std::io::Write;

use crate::bundling::BundleSet;
use crate::core::error::Result;
use crate::plugins::PluginRegistry;
use crate::router::{ContentPathParser, ParsedContentPath};

/// Trait for plugins that render bundle content for one request prefix.
///
/// Implementations must be cheap to share between threads: the same plugin
/// instance serves concurrent builds of distinct bundlable nodes.
pub trait ContentPlugin: Send + Sync + fmt::Debug {
    /// The literal first path segment this plugin answers to.
    fn request_prefix(&self) -> &str;

    /// Classification group, e.g. `text/javascript`.
    ///
    /// Plugins sharing a group are merged by composite plugins.
    fn group(&self) -> Option<&str> {
        None
    }

    /// The parser owning this plugin's request forms.
    fn path_parser(&self) -> &ContentPathParser;

    /// Enumerates the request paths used while developing.
    ///
    /// # Arguments
    ///
    /// * `bundle_set` - The bundle set the paths are computed for
    /// * `locales` - The locales the application supports
    fn valid_dev_paths(
        &self,
        bundle_set: &BundleSet,
        locales: &[String],
    ) -> Result<Vec<String>>;

    /// Enumerates the request paths used by a production build.
    ///
    /// Defaults to the development paths.
    fn valid_prod_paths(
        &self,
        bundle_set: &BundleSet,
        locales: &[String],
    ) -> Result<Vec<String>> {
        self.valid_dev_paths(bundle_set, locales)
    }

    /// Writes exactly the bytes for one parsed request.
    ///
    /// # Arguments
    ///
    /// * `path` - A request already matched by [`path_parser`](Self::path_parser)
    /// * `bundle_set` - The bundle set of the requesting node
    /// * `registry` - The registry this plugin was invoked through
    /// * `out` - Destination of the rendered content
    fn write_content(
        &self,
        path: &ParsedContentPath,
        bundle_set: &BundleSet,
        registry: &PluginRegistry,
        out: &mut dyn Write,
    ) -> Result<()>;
}

/// One named chunk of content handed to a minifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSource {
    /// The request path that produced the content.
    pub name: String,
    /// The rendered content.
    pub content: String,
}

impl InputSource {
    /// Creates an input source.
    pub fn new<N: Into<String>, C: Into<String>>(name: N, content: C) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Trait for plugins that combine and shrink rendered content.
pub trait MinifierPlugin: Send + Sync + fmt::Debug {
    /// The minifier settings this plugin handles.
    fn setting_names(&self) -> &[&'static str];

    /// Writes the minified concatenation of `inputs`.
    ///
    /// # Arguments
    ///
    /// * `setting` - One of [`setting_names`](Self::setting_names)
    /// * `inputs` - The chunks to combine, in output order
    /// * `out` - Destination of the minified content
    fn minify(
        &self,
        setting: &str,
        inputs: &[InputSource],
        out: &mut dyn Write,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minifier_implementation() {
        #[derive(Debug)]
        struct UpperMinifier;

        impl MinifierPlugin for UpperMinifier {
            fn setting_names(&self) -> &[&'static str] {
                &["upper"]
            }

            fn minify(
                &self,
                _setting: &str,
                inputs: &[InputSource],
                out: &mut dyn Write,
            ) -> Result<()> {
                for input in inputs {
                    out.write_all(input.content.to_uppercase().as_bytes())?;
                }
                Ok(())
            }
        }

        let minifier = UpperMinifier;
        let mut out = Vec::new();
        minifier
            .minify(
                "upper",
                &[InputSource::new("a.js", "a;"), InputSource::new("b.js", "b;")],
                &mut out,
            )
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "A;B;");
        assert_eq!(minifier.setting_names(), &["upper"]);
    }
}
