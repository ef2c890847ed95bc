//! # Alias Resolution
//!
//! An alias is an indirection `require('alias!<name>')` resolved to an
//! implementation per scenario. Aliases files choose implementations,
//! definitions files declare aliases with defaults. Both are attached to
//! containers, and containers are ranked by [`ContainerKind::precedence`]:
//! overrides are looked up level by level first, most specific level
//! first, and only when no level overrides an alias are the definition
//! defaults consulted the same way. Candidates at the winning level must
//! agree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::core::error::{BundlerError, Result};
use crate::model::{ContainerId, ContainerKind};

/// Parsing and rendering of alias files.
pub mod files;

pub use files::{AliasDefinition, AliasDefinitionsFile, AliasOverride, AliasesFile};

const DEFAULT_SCENARIO: &str = "default";

/// The containers a node resolves aliases through, grouped by precedence.
#[derive(Debug, Clone)]
pub struct AliasScope {
    levels: Vec<Vec<ContainerId>>,
    node_container: ContainerId,
    node_aliases_path: PathBuf,
    scenario: Option<String>,
}

impl AliasScope {
    /// Groups `containers` by precedence, keeping their order within a level.
    ///
    /// # Arguments
    ///
    /// * `containers` - The node's scope, most specific first
    /// * `node_container` - The container owning the node's aliases file
    /// * `node_aliases_path` - Where that aliases file lives or would live
    /// * `scenario` - The scenario selected by that aliases file
    pub fn new(
        containers: &[(ContainerId, ContainerKind)],
        node_container: ContainerId,
        node_aliases_path: PathBuf,
        scenario: Option<String>,
    ) -> Self {
        let mut grouped: BTreeMap<u8, Vec<ContainerId>> = BTreeMap::new();
        for (id, kind) in containers {
            grouped.entry(kind.precedence()).or_default().push(*id);
        }
        Self {
            levels: grouped.into_values().collect(),
            node_container,
            node_aliases_path,
            scenario,
        }
    }

    /// The active scenario, if any.
    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    /// The scenario name used in messages.
    pub fn scenario_name(&self) -> &str {
        self.scenario.as_deref().unwrap_or(DEFAULT_SCENARIO)
    }

    /// The precedence levels, most specific first.
    pub fn levels(&self) -> &[Vec<ContainerId>] {
        &self.levels
    }
}

/// Every alias file of a model, keyed by owning container.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    aliases_files: BTreeMap<ContainerId, AliasesFile>,
    definition_files: BTreeMap<ContainerId, AliasDefinitionsFile>,
}

impl AliasRegistry {
    /// Attaches an aliases file, replacing any previous one.
    pub fn add_aliases_file(&mut self, container: ContainerId, file: AliasesFile) {
        _ = self.aliases_files.insert(container, file);
    }

    /// Attaches a definitions file, replacing any previous one.
    pub fn add_definitions_file(
        &mut self,
        container: ContainerId,
        file: AliasDefinitionsFile,
    ) {
        _ = self.definition_files.insert(container, file);
    }

    /// The aliases file of a container.
    pub fn aliases_file(&self, container: ContainerId) -> Option<&AliasesFile> {
        self.aliases_files.get(&container)
    }

    /// The definitions file of a container.
    pub fn definitions_file(&self, container: ContainerId) -> Option<&AliasDefinitionsFile> {
        self.definition_files.get(&container)
    }

    /// Resolves `name` for the node owning `scope`.
    ///
    /// Returns `Ok(None)` when no container in scope knows the alias.
    ///
    /// # Errors
    ///
    /// * `UnresolvableAlias` - two different targets at the winning level
    /// * `IncompleteAlias` - the alias is defined but nothing implements it
    pub fn resolve(&self, scope: &AliasScope, name: &str) -> Result<Option<String>> {
        let scenario = scope.scenario();
        let target = match first_agreed(scope, name, |level| {
            self.override_candidates(level, name, scenario)
        })? {
            Some(target) => Some(target),
            None => first_agreed(scope, name, |level| {
                self.definition_candidates(level, name, scenario)
            })?,
        };
        if let Some(target) = target {
            debug!("Alias '{}' resolved to '{}'", name, target);
            return Ok(Some(target.to_string()));
        }

        if self.is_defined(scope, name) {
            return Err(BundlerError::IncompleteAlias {
                alias: name.to_string(),
                scenario: scope.scenario_name().to_string(),
            });
        }
        Ok(None)
    }

    /// Every alias name defined or overridden in scope, sorted.
    pub fn known_aliases(&self, scope: &AliasScope) -> Vec<String> {
        let mut names: Vec<String> = scope
            .levels
            .iter()
            .flatten()
            .flat_map(|container| {
                let overrides = self
                    .aliases_files
                    .get(container)
                    .into_iter()
                    .flat_map(|file| file.overrides().iter().map(|entry| entry.name.clone()));
                let definitions = self
                    .definition_files
                    .get(container)
                    .into_iter()
                    .flat_map(|file| file.definitions().iter().map(|entry| entry.name.clone()));
                overrides.chain(definitions).collect::<Vec<_>>()
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Adds a default override, pointing at the declared interface, for every
    /// alias in scope that has an interface but resolves to nothing.
    ///
    /// Aliases already named by the node's own aliases file are left alone.
    /// Returns the completed alias names.
    ///
    /// # Errors
    ///
    /// Returns `UnresolvableAlias` when definitions at one level disagree on
    /// the interface of an alias, and any resolution error other than
    /// `IncompleteAlias`.
    pub fn fix_incomplete_aliases(&mut self, scope: &AliasScope) -> Result<Vec<String>> {
        let mut completions: Vec<(String, String)> = Vec::new();

        for level in &scope.levels {
            let mut interfaces: Vec<(&str, &str, &Path)> = Vec::new();
            for container in level {
                let Some(file) = self.definition_files.get(container) else {
                    continue;
                };
                for definition in file.definitions() {
                    let Some(interface) = definition.interface.as_deref() else {
                        continue;
                    };
                    match interfaces.iter().find(|(name, _, _)| *name == definition.name) {
                        Some((_, existing, _)) if *existing != interface => {
                            return Err(BundlerError::UnresolvableAlias {
                                alias: definition.name.clone(),
                                scenario: scope.scenario_name().to_string(),
                                file: file.path().to_path_buf(),
                            });
                        }
                        Some(_) => {}
                        None => interfaces.push((definition.name.as_str(), interface, file.path())),
                    }
                }
            }

            for (name, interface, _) in interfaces {
                if completions.iter().any(|(done, _)| done == name) {
                    continue;
                }
                let overridden = self
                    .aliases_files
                    .get(&scope.node_container)
                    .map_or(false, |file| file.has_alias(name));
                if overridden {
                    continue;
                }
                match self.resolve(scope, name) {
                    Err(BundlerError::IncompleteAlias { .. }) => {
                        completions.push((name.to_string(), interface.to_string()));
                    }
                    Err(err) => return Err(err),
                    Ok(_) => {}
                }
            }
        }

        if completions.is_empty() {
            return Ok(Vec::new());
        }

        let file = self
            .aliases_files
            .entry(scope.node_container)
            .or_insert_with(|| AliasesFile::new(scope.node_aliases_path.clone()));
        for (name, interface) in &completions {
            info!("Completing alias '{}' with its interface '{}'", name, interface);
            file.add_alias(AliasOverride::new(name, interface));
        }
        Ok(completions.into_iter().map(|(name, _)| name).collect())
    }

    fn is_defined(&self, scope: &AliasScope, name: &str) -> bool {
        scope.levels.iter().flatten().any(|container| {
            self.definition_files
                .get(container)
                .map_or(false, |file| {
                    file.definitions().iter().any(|definition| definition.name == name)
                })
        })
    }

    fn override_candidates<'a>(
        &'a self,
        level: &[ContainerId],
        name: &str,
        scenario: Option<&str>,
    ) -> Vec<(&'a str, &'a Path)> {
        let mut scenario_candidates = Vec::new();
        let mut default_candidates = Vec::new();

        for file in level.iter().filter_map(|container| self.aliases_files.get(container)) {
            for entry in file.overrides().iter().filter(|entry| entry.name == name) {
                match entry.scenario.as_deref() {
                    None => default_candidates.push((entry.class.as_str(), file.path())),
                    Some(wanted) if Some(wanted) == scenario => {
                        scenario_candidates.push((entry.class.as_str(), file.path()));
                    }
                    Some(_) => {}
                }
            }
        }
        scenario_or_default(scenario_candidates, default_candidates)
    }

    fn definition_candidates<'a>(
        &'a self,
        level: &[ContainerId],
        name: &str,
        scenario: Option<&str>,
    ) -> Vec<(&'a str, &'a Path)> {
        let mut scenario_candidates = Vec::new();
        let mut default_candidates = Vec::new();

        for file in level.iter().filter_map(|container| self.definition_files.get(container)) {
            for definition in file.definitions().iter().filter(|definition| definition.name == name) {
                if let Some(class) = scenario.and_then(|scenario| definition.scenarios.get(scenario)) {
                    scenario_candidates.push((class.as_str(), file.path()));
                }
                if let Some(class) = definition.class.as_deref() {
                    default_candidates.push((class, file.path()));
                }
            }
        }
        scenario_or_default(scenario_candidates, default_candidates)
    }
}

/// Scenario-specific candidates when there are any, the defaults otherwise.
fn scenario_or_default<'a>(
    scenario: Vec<(&'a str, &'a Path)>,
    default: Vec<(&'a str, &'a Path)>,
) -> Vec<(&'a str, &'a Path)> {
    if scenario.is_empty() {
        default
    } else {
        scenario
    }
}

/// Walks the levels of `scope`, returning the target of the first level with
/// candidates.
fn first_agreed<'a>(
    scope: &AliasScope,
    name: &str,
    candidates: impl Fn(&[ContainerId]) -> Vec<(&'a str, &'a Path)>,
) -> Result<Option<&'a str>> {
    for level in &scope.levels {
        let found = candidates(level);
        let Some((target, _)) = found.first() else {
            continue;
        };
        if let Some((_, file)) = found.iter().find(|(other, _)| other != target) {
            return Err(BundlerError::UnresolvableAlias {
                alias: name.to_string(),
                scenario: scope.scenario_name().to_string(),
                file: file.to_path_buf(),
            });
        }
        return Ok(Some(*target));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP: ContainerId = ContainerId(0);
    const LIB: ContainerId = ContainerId(1);
    const BLADE_A: ContainerId = ContainerId(2);
    const BLADE_B: ContainerId = ContainerId(3);
    const ASPECT: ContainerId = ContainerId(4);

    fn scope(scenario: Option<&str>) -> AliasScope {
        AliasScope::new(
            &[
                (ASPECT, ContainerKind::Aspect),
                (BLADE_B, ContainerKind::Blade),
                (BLADE_A, ContainerKind::Blade),
                (APP, ContainerKind::App),
                (LIB, ContainerKind::Library),
            ],
            ASPECT,
            PathBuf::from("default-aspect/aliases.toml"),
            scenario.map(str::to_string),
        )
    }

    fn definition(name: &str, class: Option<&str>, interface: Option<&str>) -> AliasDefinition {
        AliasDefinition {
            name: name.to_string(),
            class: class.map(str::to_string),
            interface: interface.map(str::to_string),
            scenarios: BTreeMap::new(),
        }
    }

    fn definitions(path: &str, entries: Vec<AliasDefinition>) -> AliasDefinitionsFile {
        AliasDefinitionsFile::new(PathBuf::from(path), entries)
    }

    #[test]
    fn test_most_specific_level_wins() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            LIB,
            definitions("libs/lib/alias-definitions.toml", vec![definition("logger", Some("lib/Console"), None)]),
        );
        let mut app_file = AliasesFile::new(PathBuf::from("aliases.toml"));
        app_file.add_alias(AliasOverride::new("logger", "app/FileLogger"));
        registry.add_aliases_file(APP, app_file);

        assert_eq!(
            registry.resolve(&scope(None), "logger").unwrap().as_deref(),
            Some("app/FileLogger")
        );
        assert_eq!(registry.resolve(&scope(None), "unknown").unwrap(), None);
    }

    #[test]
    fn test_override_beats_definition_in_same_container() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            LIB,
            definitions("libs/lib/alias-definitions.toml", vec![definition("logger", Some("lib/Console"), None)]),
        );
        let mut lib_file = AliasesFile::new(PathBuf::from("libs/lib/aliases.toml"));
        lib_file.add_alias(AliasOverride::new("logger", "lib/File"));
        registry.add_aliases_file(LIB, lib_file);

        assert_eq!(
            registry.resolve(&scope(None), "logger").unwrap().as_deref(),
            Some("lib/File")
        );
    }

    #[test]
    fn test_override_at_any_level_beats_definitions() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            ASPECT,
            definitions("default-aspect/alias-definitions.toml", vec![definition("logger", Some("app/Console"), None)]),
        );
        let mut lib_file = AliasesFile::new(PathBuf::from("libs/lib/aliases.toml"));
        lib_file.add_alias(AliasOverride::new("logger", "lib/File"));
        registry.add_aliases_file(LIB, lib_file);

        assert_eq!(
            registry.resolve(&scope(None), "logger").unwrap().as_deref(),
            Some("lib/File")
        );
    }

    #[test]
    fn test_default_override_beats_scenario_definition() {
        let mut registry = AliasRegistry::default();
        let mut logger = definition("logger", Some("lib/Console"), None);
        _ = logger
            .scenarios
            .insert("test".to_string(), "lib/Null".to_string());
        registry.add_definitions_file(LIB, definitions("lib.toml", vec![logger]));
        let mut app_file = AliasesFile::new(PathBuf::from("aliases.toml"));
        app_file.add_alias(AliasOverride::new("logger", "app/Logger"));
        registry.add_aliases_file(APP, app_file);

        assert_eq!(
            registry.resolve(&scope(Some("test")), "logger").unwrap().as_deref(),
            Some("app/Logger")
        );
    }

    #[test]
    fn test_sibling_conflict_is_unresolvable() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            BLADE_A,
            definitions("a/alias-definitions.toml", vec![definition("Logger", Some("FileLogger"), None)]),
        );
        registry.add_definitions_file(
            BLADE_B,
            definitions("b/alias-definitions.toml", vec![definition("Logger", Some("ConsoleLogger"), None)]),
        );

        match registry.resolve(&scope(None), "Logger").unwrap_err() {
            BundlerError::UnresolvableAlias { alias, scenario, file } => {
                assert_eq!(alias, "Logger");
                assert_eq!(scenario, "default");
                assert_eq!(file, PathBuf::from("a/alias-definitions.toml"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scenario_candidates_take_priority() {
        let mut registry = AliasRegistry::default();
        let mut logger = definition("logger", Some("lib/Console"), None);
        _ = logger
            .scenarios
            .insert("test".to_string(), "lib/Null".to_string());
        registry.add_definitions_file(LIB, definitions("lib.toml", vec![logger]));

        assert_eq!(
            registry.resolve(&scope(Some("test")), "logger").unwrap().as_deref(),
            Some("lib/Null")
        );
        assert_eq!(
            registry.resolve(&scope(Some("other")), "logger").unwrap().as_deref(),
            Some("lib/Console")
        );
    }

    #[test]
    fn test_defined_without_target_is_incomplete() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            LIB,
            definitions("lib.toml", vec![definition("clock", None, Some("lib/Clock"))]),
        );
        assert!(matches!(
            registry.resolve(&scope(None), "clock").unwrap_err(),
            BundlerError::IncompleteAlias { .. }
        ));
    }

    #[test]
    fn test_fix_incomplete_aliases_adds_interface_override() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            LIB,
            definitions(
                "lib.toml",
                vec![
                    definition("clock", None, Some("lib/Clock")),
                    definition("logger", Some("lib/Console"), Some("lib/Logger")),
                ],
            ),
        );

        let scope = scope(None);
        let completed = registry.fix_incomplete_aliases(&scope).unwrap();
        assert_eq!(completed, vec!["clock".to_string()]);
        assert_eq!(
            registry.resolve(&scope, "clock").unwrap().as_deref(),
            Some("lib/Clock")
        );
        let file = registry.aliases_file(ASPECT).unwrap();
        assert_eq!(file.path(), Path::new("default-aspect/aliases.toml"));
        assert!(registry.fix_incomplete_aliases(&scope).unwrap().is_empty());
    }

    #[test]
    fn test_fix_incomplete_aliases_respects_explicit_override() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            LIB,
            definitions("lib.toml", vec![definition("clock", None, Some("lib/Clock"))]),
        );
        let mut own = AliasesFile::new(PathBuf::from("aliases.toml"));
        own.add_alias(AliasOverride {
            name: "clock".to_string(),
            class: "app/FakeClock".to_string(),
            scenario: Some("test".to_string()),
        });
        registry.add_aliases_file(ASPECT, own);

        assert!(registry.fix_incomplete_aliases(&scope(None)).unwrap().is_empty());
        assert_eq!(registry.aliases_file(ASPECT).unwrap().overrides().len(), 1);
    }

    #[test]
    fn test_fix_incomplete_aliases_rejects_interface_conflict() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            BLADE_A,
            definitions("a.toml", vec![definition("clock", None, Some("a/Clock"))]),
        );
        registry.add_definitions_file(
            BLADE_B,
            definitions("b.toml", vec![definition("clock", None, Some("b/Clock"))]),
        );

        assert!(matches!(
            registry.fix_incomplete_aliases(&scope(None)).unwrap_err(),
            BundlerError::UnresolvableAlias { .. }
        ));
    }

    #[test]
    fn test_known_aliases_are_sorted_and_unique() {
        let mut registry = AliasRegistry::default();
        registry.add_definitions_file(
            LIB,
            definitions("lib.toml", vec![definition("b", Some("x"), None), definition("a", Some("y"), None)]),
        );
        let mut app_file = AliasesFile::new(PathBuf::from("aliases.toml"));
        app_file.add_alias(AliasOverride::new("b", "z"));
        registry.add_aliases_file(APP, app_file);

        assert_eq!(registry.known_aliases(&scope(None)), vec!["a", "b"]);
    }
}
