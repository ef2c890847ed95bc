//! # Configuration Module
//!
//! Configuration management for the BundleFlow bundling engine. Settings are
//! read from a TOML file, then overridden from environment variables and
//! finally from programmatic overrides, and validated once at the end.
//!
//! ## Features
//!
//! - Multiple configuration sources (TOML, environment variables, code)
//! - Validation of the application directory, locales and minifier setting
//! - Development and production profiles selecting the request paths in use
//!
//! ## Example
//!
//! ```rust,no_run
//! use bundleflow::core::config::{ConfigBuilder, Profile};
//!
//! let config = ConfigBuilder::new()
//!     .with_file("bundleflow.toml")
//!     .with_env_prefix("BUNDLEFLOW_")
//!     .with_profile(Profile::Production)
//!     .build()
//!     .unwrap();
//!
//! let config_read = config.read();
//! assert_eq!(config_read.profile, Profile::Production);
//! ```
//!
//! ## File format
//!
//! ```toml
//! app_dir = "my-app"
//! profile = "development"
//!
//! [bundling]
//! bootstrap_library = "br-bootstrap"
//! default_aspect = "default"
//! watch = false
//!
//! [content]
//! locales = ["en", "en_GB"]
//! minifier = "combined"
//! ```

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use toml::Value as TomlValue;

use crate::core::error::{BundlerError, Result};
use crate::router::TokenClass;

/// Selects which request paths a build enumerates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Per-module request paths.
    #[default]
    Development,
    /// Bundled request paths.
    Production,
}

/// The complete configuration of a bundler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_app_dir")]
    /// The application directory.
    pub app_dir: PathBuf,

    #[serde(default)]
    /// The current profile.
    pub profile: Profile,

    #[serde(default)]
    /// Dependency graph settings.
    pub bundling: BundlingConfig,

    #[serde(default)]
    /// Content rendering settings.
    pub content: ContentConfig,

    #[serde(default)]
    /// Custom values for plugins outside this crate.
    pub custom: HashMap<String, TomlValue>,
}

/// Settings for building the model and bundle sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlingConfig {
    #[serde(default = "default_bootstrap_library")]
    /// The library whose modules precede every bundle.
    pub bootstrap_library: String,

    #[serde(default = "default_aspect")]
    /// The aspect whose resources workbenches see.
    pub default_aspect: String,

    #[serde(default)]
    /// Watch the application directory instead of re-reading files.
    pub watch: bool,
}

impl Default for BundlingConfig {
    fn default() -> Self {
        Self {
            bootstrap_library: default_bootstrap_library(),
            default_aspect: default_aspect(),
            watch: false,
        }
    }
}

/// Settings for content plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentConfig {
    #[serde(default = "default_locales")]
    /// The locales the application supports.
    pub locales: Vec<String>,

    #[serde(default = "default_minifier")]
    /// The minifier setting of composite JavaScript paths.
    pub minifier: String,

    #[serde(default)]
    /// Additional content options.
    pub options: HashMap<String, TomlValue>,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            locales: default_locales(),
            minifier: default_minifier(),
            options: HashMap::new(),
        }
    }
}

/// Builds a [`Config`] from a file, the environment and overrides.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<PathBuf>,
    env_prefix: Option<String>,
    profile: Option<Profile>,
    overrides: Vec<(String, TomlValue)>,
}

impl ConfigBuilder {
    /// Initialises a new `ConfigBuilder` instance with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads settings from the TOML file at `path`.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Reads overrides from environment variables starting with `prefix`.
    ///
    /// `BUNDLEFLOW_APP_DIR` sets `app_dir` and `BUNDLEFLOW_CONTENT_MINIFIER`
    /// sets `content.minifier` for the prefix `BUNDLEFLOW_`.
    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Sets the profile.
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Overrides one key, e.g. `bundling.watch` or `content.locales`.
    ///
    /// Overrides apply in the order they were added, after the environment.
    pub fn with_override<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<TomlValue>,
    {
        self.overrides.push((key.into(), value.into()));
        self
    }

    /// Loads, overrides and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` when the file cannot be read or parsed, a key is
    /// unknown or has an invalid value, or validation fails.
    pub fn build(self) -> Result<Arc<RwLock<Config>>> {
        let mut config = match &self.config_file {
            Some(path) => load_from_file(path)?,
            None => Config::default(),
        };

        if let Some(profile) = self.profile {
            config.profile = profile;
        }

        if let Some(prefix) = &self.env_prefix {
            apply_env_overrides(&mut config, prefix)?;
        }

        for (key, value) in &self.overrides {
            apply_config_value(&mut config, key, value)?;
        }
        validate_config(&config)?;

        Ok(Arc::new(RwLock::new(config)))
    }
}

impl Config {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_config(self)
    }

    /// Retrieves a custom configuration value by key, if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the value cannot be converted to `T`.
    pub fn get_custom<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.custom
            .get(key)
            .map(|v| {
                TomlValue::try_into(v.clone()).map_err(|e| {
                    BundlerError::config_error(format!("Invalid custom config value: {}", e), None)
                })
            })
            .transpose()
    }

    /// Sets a custom configuration value for the given key.
    pub fn set_custom<T: Serialize>(&mut self, key: &str, value: T) -> Result<()> {
        let value = TomlValue::try_from(value).map_err(|e| {
            BundlerError::config_error(format!("Invalid custom config value: {}", e), None)
        })?;
        _ = self.custom.insert(key.to_string(), value);
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_dir: default_app_dir(),
            profile: Profile::default(),
            bundling: BundlingConfig::default(),
            content: ContentConfig::default(),
            custom: HashMap::new(),
        }
    }
}

fn load_from_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| {
        BundlerError::config_error(
            format!("Failed to read config file: {}", e),
            Some(path.to_path_buf()),
        )
    })?;

    let mut config: Config = toml::from_str(&content).map_err(|e| {
        BundlerError::config_error(
            format!("Failed to parse config file: {}", e),
            Some(path.to_path_buf()),
        )
    })?;

    if config.app_dir.is_relative() {
        if let Some(parent) = path.parent() {
            config.app_dir = parent.join(&config.app_dir);
        }
    }
    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn apply_env_overrides(config: &mut Config, prefix: &str) -> Result<()> {
    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(prefix) {
            let config_key = env_key(stripped.trim_start_matches('_'));
            apply_config_value(config, &config_key, &TomlValue::String(value))?;
        }
    }
    Ok(())
}

/// `BUNDLING_WATCH` becomes `bundling.watch`; top-level keys stay as they are.
fn env_key(name: &str) -> String {
    let lower = name.to_lowercase();
    for section in ["bundling", "content", "custom"] {
        if let Some(key) = lower.strip_prefix(section).and_then(|rest| rest.strip_prefix('_')) {
            return format!("{}.{}", section, key);
        }
    }
    lower
}

fn value_string(value: &TomlValue) -> String {
    match value {
        TomlValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn parse_bool(key: &str, value: &TomlValue) -> Result<bool> {
    match value {
        TomlValue::Boolean(flag) => Ok(*flag),
        other => value_string(other).parse().map_err(|e| {
            BundlerError::config_error(
                format!("Invalid {} value '{}': {}", key, value_string(other), e),
                None,
            )
        }),
    }
}

fn parse_list(value: &TomlValue) -> Vec<String> {
    match value {
        TomlValue::Array(items) => items.iter().map(value_string).collect(),
        other => value_string(other)
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

fn apply_config_value(config: &mut Config, key: &str, value: &TomlValue) -> Result<()> {
    match key {
        "app_dir" => config.app_dir = PathBuf::from(value_string(value)),
        "profile" => {
            config.profile = match value_string(value).to_lowercase().as_str() {
                "development" | "dev" => Profile::Development,
                "production" | "prod" => Profile::Production,
                other => {
                    return Err(BundlerError::config_error(
                        format!("Unknown profile: {}", other),
                        None,
                    ))
                }
            };
        }
        "bundling.bootstrap_library" => config.bundling.bootstrap_library = value_string(value),
        "bundling.default_aspect" => config.bundling.default_aspect = value_string(value),
        "bundling.watch" => config.bundling.watch = parse_bool(key, value)?,
        "content.locales" => config.content.locales = parse_list(value),
        "content.minifier" => config.content.minifier = value_string(value),
        _ => match key.split_once('.') {
            Some(("content", option)) => {
                _ = config.content.options.insert(option.to_string(), value.clone());
            }
            Some(("custom", custom)) => {
                _ = config.custom.insert(custom.to_string(), value.clone());
            }
            _ => {
                return Err(BundlerError::config_error(
                    format!("Unknown configuration key: {}", key),
                    None,
                ));
            }
        },
    }
    Ok(())
}

fn validate_config(config: &Config) -> Result<()> {
    validate_path(&config.app_dir, "application")?;

    if config.content.locales.is_empty() {
        return Err(BundlerError::config_error("No locales specified", None));
    }
    if let Some(locale) = config
        .content
        .locales
        .iter()
        .find(|locale| !TokenClass::Name.is_valid(locale))
    {
        return Err(BundlerError::config_error(format!("Invalid locale: '{}'", locale), None));
    }
    if !TokenClass::Name.is_valid(&config.content.minifier) {
        return Err(BundlerError::config_error(
            format!("Invalid minifier setting: '{}'", config.content.minifier),
            None,
        ));
    }
    if config.bundling.default_aspect.is_empty() {
        return Err(BundlerError::config_error("No default aspect specified", None));
    }

    Ok(())
}

fn validate_path(path: &Path, name: &str) -> Result<()> {
    if !path.exists() {
        return Err(BundlerError::config_error(
            format!("{} directory does not exist: {}", name, path.display()),
            Some(path.to_path_buf()),
        ));
    }

    if !path.is_dir() {
        return Err(BundlerError::config_error(
            format!("{} path is not a directory: {}", name, path.display()),
            Some(path.to_path_buf()),
        ));
    }

    Ok(())
}

fn default_app_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_bootstrap_library() -> String {
    "br-bootstrap".to_string()
}

fn default_aspect() -> String {
    "default".to_string()
}

fn default_locales() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_minifier() -> String {
    crate::plugins::DEFAULT_MINIFIER_SETTING.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_profile() {
        assert_eq!(Profile::default(), Profile::Development);
        let config = Config::default();
        assert_eq!(config.bundling.bootstrap_library, "br-bootstrap");
        assert_eq!(config.content.minifier, "combined");
        assert_eq!(config.content.locales, vec!["en"]);
    }

    #[test]
    fn test_load_from_file_resolves_app_dir() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join("my-app")).unwrap();
        let config_file = temp_dir.path().join("bundleflow.toml");
        fs::write(
            &config_file,
            "app_dir = 'my-app'\nprofile = 'production'\n\n[content]\nlocales = ['en', 'de']\n",
        )
        .unwrap();

        let config = ConfigBuilder::new().with_file(&config_file).build().unwrap();
        let config = config.read();
        assert_eq!(config.app_dir, temp_dir.path().join("my-app"));
        assert_eq!(config.profile, Profile::Production);
        assert_eq!(config.content.locales, vec!["en", "de"]);
    }

    #[test]
    fn test_missing_app_dir_validation() {
        let config = Config {
            app_dir: PathBuf::from("missing_app"),
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&config),
            Err(BundlerError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_apply_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigBuilder::new()
            .with_override("app_dir", temp_dir.path().to_string_lossy().into_owned())
            .with_override("bundling.watch", true)
            .with_override("content.locales", "en, fr_FR")
            .with_override("custom.theme", "dark")
            .build()
            .unwrap();
        let config = config.read();
        assert!(config.bundling.watch);
        assert_eq!(config.content.locales, vec!["en", "fr_FR"]);
        assert_eq!(config.get_custom::<String>("theme").unwrap(), Some("dark".to_string()));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let unknown = ConfigBuilder::new().with_override("bundling.speed", "fast").build();
        assert!(matches!(unknown, Err(BundlerError::ConfigError { .. })));

        let locale = ConfigBuilder::new().with_override("content.locales", "en.GB").build();
        assert!(matches!(locale, Err(BundlerError::ConfigError { .. })));
    }

    #[test]
    fn test_env_overrides() {
        env::set_var("BFTEST_CONTENT_MINIFIER", "whitespace");
        env::set_var("BFTEST_BUNDLING_DEFAULT_ASPECT", "mobile");
        let mut config = Config::default();

        apply_env_overrides(&mut config, "BFTEST").unwrap();
        assert_eq!(config.content.minifier, "whitespace");
        assert_eq!(config.bundling.default_aspect, "mobile");
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("APP_DIR"), "app_dir");
        assert_eq!(env_key("BUNDLING_WATCH"), "bundling.watch");
        assert_eq!(env_key("CONTENT_LOCALES"), "content.locales");
    }
}
