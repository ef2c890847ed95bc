//! # Error Handling for BundleFlow
//!
//! This module defines the error taxonomy shared by every component of the
//! bundling engine. The `thiserror` crate is used to keep the variants
//! declarative and the messages consistent across the library.
//!
//! None of these errors are retried inside the crate: graph construction,
//! routing and content writing are all-or-nothing operations and surface the
//! first failure to their caller.

use std::path::PathBuf;
use thiserror::Error;

/// A unified result type for the BundleFlow library.
///
/// This type alias simplifies function signatures by defining a result type that always uses `BundlerError` as the error variant.
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Boxed error source carried by the wrapping variants.
pub type ErrorSource = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for BundleFlow, encompassing all potential error cases.
#[derive(Error, Debug)]
pub enum BundlerError {
    /// A request path did not match any request form of a content plugin.
    #[error("Malformed request '{path}': {message}.")]
    MalformedRequest {
        /// The request path that could not be matched.
        path: String,
        /// Detailed description of the mismatch.
        message: String,
    },

    /// A placeholder value violates the character class of its token.
    #[error("Malformed token '{token}': value '{value}' {message}.")]
    MalformedToken {
        /// The placeholder name.
        token: String,
        /// The rejected value.
        value: String,
        /// Detailed description of the violation.
        message: String,
    },

    /// Generic failure while constructing the dependency graph.
    #[error("Model operation error: {message}.")]
    ModelOperation {
        /// Detailed description of the failure.
        message: String,
        /// Optional source error providing additional context, if available.
        #[source]
        source: Option<ErrorSource>,
    },

    /// A require path referenced by an asset does not resolve to a source module.
    #[error("Require path '{require_path}' referenced from '{referrer}' could not be resolved.")]
    RequirePath {
        /// The unresolved require path.
        require_path: String,
        /// Asset path of the referring asset.
        referrer: String,
    },

    /// Two alias targets compete at the same precedence level.
    #[error("Alias '{alias}' for scenario '{scenario}' has multiple definitions in aliases file '{}', or the files it inherits from.", .file.display())]
    UnresolvableAlias {
        /// The alias name.
        alias: String,
        /// The scenario under which the alias was resolved.
        scenario: String,
        /// The file that introduced the conflicting definition.
        file: PathBuf,
    },

    /// An alias is defined but no container provides an implementation for it.
    #[error("Alias '{alias}' has no implementation class for scenario '{scenario}'.")]
    IncompleteAlias {
        /// The alias name.
        alias: String,
        /// The scenario under which the alias was resolved.
        scenario: String,
    },

    /// Source modules depend on each other in a cycle.
    #[error("Circular dependency detected: {chain}.")]
    CircularDependency {
        /// The module chain, dependency order, that closes the cycle.
        chain: String,
    },

    /// Error encountered while a content plugin rendered output.
    #[error("Content processing error: {message}.")]
    ContentProcessing {
        /// Detailed description of the content processing error.
        message: String,
        /// Optional source error providing additional context, if available.
        #[source]
        source: Option<ErrorSource>,
    },

    /// Error related to configuration initialisation or validation.
    #[error("Configuration error: {message}.")]
    ConfigError {
        /// Detailed description of the configuration error.
        message: String,
        /// Optional path of the configuration file that caused the error.
        path: Option<PathBuf>,
    },

    /// IO error encountered during file operations.
    #[error("File IO error at `{path:?}`: {source}")]
    IOError {
        /// Path associated with the IO error.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// General internal error.
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for BundlerError {
    /// Converts a standard IO error into a `BundlerError::IOError` with an empty path.
    fn from(source: std::io::Error) -> Self {
        BundlerError::IOError {
            path: PathBuf::new(),
            source,
        }
    }
}

impl BundlerError {
    /// Creates a `MalformedRequest` error for the given path.
    pub fn malformed_request<P: Into<String>, S: Into<String>>(
        path: P,
        message: S,
    ) -> Self {
        BundlerError::MalformedRequest {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a `MalformedToken` error for a rejected placeholder value.
    pub fn malformed_token<T, V, S>(token: T, value: V, message: S) -> Self
    where
        T: Into<String>,
        V: Into<String>,
        S: Into<String>,
    {
        BundlerError::MalformedToken {
            token: token.into(),
            value: value.into(),
            message: message.into(),
        }
    }

    /// Creates a `ModelOperation` error with a message and optional source.
    ///
    /// # Parameters
    /// - `message`: A description of the failure.
    /// - `source`: An optional source error providing additional context.
    pub fn model_operation<S: Into<String>>(
        message: S,
        source: Option<ErrorSource>,
    ) -> Self {
        BundlerError::ModelOperation {
            message: message.into(),
            source,
        }
    }

    /// Creates a `RequirePath` error.
    pub fn require_path<R: Into<String>, A: Into<String>>(
        require_path: R,
        referrer: A,
    ) -> Self {
        BundlerError::RequirePath {
            require_path: require_path.into(),
            referrer: referrer.into(),
        }
    }

    /// Creates a `ContentProcessing` error with a specific message and optional source.
    ///
    /// # Parameters
    /// - `message`: A description of the content processing error.
    /// - `source`: An optional source error providing additional context.
    ///
    /// # Returns
    /// - A `BundlerError::ContentProcessing` with the message and optional source.
    pub fn content_processing_error<S: Into<String>>(
        message: S,
        source: Option<ErrorSource>,
    ) -> Self {
        BundlerError::ContentProcessing {
            message: message.into(),
            source,
        }
    }

    /// Creates a `ConfigError` with a specific message.
    ///
    /// # Parameters
    /// - `message`: A description of the configuration error.
    /// - `path`: Optional path of the configuration file causing the error.
    pub fn config_error<S: Into<String>>(
        message: S,
        path: Option<PathBuf>,
    ) -> Self {
        BundlerError::ConfigError {
            message: message.into(),
            path,
        }
    }

    /// Wraps an IO error as an `IOError` variant with the specified path.
    pub fn io_error(path: PathBuf, source: std::io::Error) -> Self {
        BundlerError::IOError { path, source }
    }

    /// Creates a general internal error with a custom message.
    pub fn internal_error<S: Into<String>>(message: S) -> Self {
        BundlerError::InternalError(message.into())
    }

    /// Wraps any error raised while a plugin writes content.
    ///
    /// Errors that already are `ContentProcessing` errors are passed through
    /// unchanged so nested plugin invocations do not stack wrappers.
    pub fn into_content_processing(self, context: &str) -> Self {
        match self {
            BundlerError::ContentProcessing { .. } => self,
            other => BundlerError::ContentProcessing {
                message: context.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}
