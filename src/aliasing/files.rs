use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{BundlerError, Result};

/// An alias target chosen by an aliases file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasOverride {
    /// The alias name.
    pub name: String,
    /// Require path or class name of the implementation.
    pub class: String,
    /// The scenario the override applies to; `None` for the default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
}

impl AliasOverride {
    /// Creates a default-scenario override.
    pub fn new(name: &str, class: &str) -> Self {
        Self {
            name: name.to_string(),
            class: class.to_string(),
            scenario: None,
        }
    }
}

/// An alias declared by a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDefinition {
    /// The alias name.
    pub name: String,
    /// The default implementation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// The interface implementations must satisfy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Implementations per scenario.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scenarios: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct AliasesDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scenario: Option<String>,
    #[serde(default, rename = "alias")]
    aliases: Vec<AliasOverride>,
}

#[derive(Debug, Default, Deserialize)]
struct DefinitionsDocument {
    #[serde(default, rename = "alias")]
    aliases: Vec<AliasDefinition>,
}

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| BundlerError::io_error(path.to_path_buf(), e))
}

/// The `aliases.toml` of a container.
///
/// ```toml
/// scenario = "test"
///
/// [[alias]]
/// name = "logger"
/// class = "app/TestLogger"
/// ```
#[derive(Debug, Clone, Default)]
pub struct AliasesFile {
    path: PathBuf,
    scenario: Option<String>,
    overrides: Vec<AliasOverride>,
}

impl AliasesFile {
    /// An empty aliases file that only lives in memory.
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_document(path)?;
        Self::parse(path.to_path_buf(), &text)
    }

    /// Parses aliases text attributed to `path`.
    pub fn parse(path: PathBuf, text: &str) -> Result<Self> {
        let document: AliasesDocument = toml::from_str(text).map_err(|e| {
            BundlerError::config_error(format!("Invalid aliases file: {}", e), Some(path.clone()))
        })?;
        Ok(Self {
            path,
            scenario: document.scenario,
            overrides: document.aliases,
        })
    }

    /// Renders the file back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        let document = AliasesDocument {
            scenario: self.scenario.clone(),
            aliases: self.overrides.clone(),
        };
        toml::to_string(&document).map_err(|e| {
            BundlerError::content_processing_error(
                format!("Failed to serialise '{}'", self.path.display()),
                Some(Box::new(e)),
            )
        })
    }

    /// Where the file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The scenario selected by this file.
    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    /// Selects a scenario.
    pub fn set_scenario(&mut self, scenario: Option<String>) {
        self.scenario = scenario;
    }

    /// Every override in file order.
    pub fn overrides(&self) -> &[AliasOverride] {
        &self.overrides
    }

    /// Whether any override names `alias`.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.overrides.iter().any(|entry| entry.name == alias)
    }

    /// Appends an override.
    pub fn add_alias(&mut self, entry: AliasOverride) {
        self.overrides.push(entry);
    }
}

/// The `alias-definitions.toml` of a container.
///
/// ```toml
/// [[alias]]
/// name = "logger"
/// class = "lib/ConsoleLogger"
/// interface = "lib/Logger"
/// scenarios = { test = "lib/NullLogger" }
/// ```
#[derive(Debug, Clone, Default)]
pub struct AliasDefinitionsFile {
    path: PathBuf,
    definitions: Vec<AliasDefinition>,
}

impl AliasDefinitionsFile {
    /// Creates a definitions file from in-memory definitions.
    pub fn new(path: PathBuf, definitions: Vec<AliasDefinition>) -> Self {
        Self { path, definitions }
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_document(path)?;
        Self::parse(path.to_path_buf(), &text)
    }

    /// Parses definitions text attributed to `path`.
    pub fn parse(path: PathBuf, text: &str) -> Result<Self> {
        let document: DefinitionsDocument = toml::from_str(text).map_err(|e| {
            BundlerError::config_error(
                format!("Invalid alias definitions file: {}", e),
                Some(path.clone()),
            )
        })?;
        Ok(Self {
            path,
            definitions: document.aliases,
        })
    }

    /// Where the file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every definition in file order.
    pub fn definitions(&self) -> &[AliasDefinition] {
        &self.definitions
    }
}
