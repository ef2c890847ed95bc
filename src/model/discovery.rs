//! Builds a [`Model`] from an application directory.
//!
//! ```text
//! <app>/aliases.toml
//! <app>/libs/<lib>/{src,resources}
//! <app>/<name>-bladeset/{src,resources}
//! <app>/<name>-bladeset/blades/<blade>/{src,resources}
//! <app>/<name>-bladeset/blades/<blade>/workbench/index.html
//! <app>/<name>-aspect/index.html
//! <app>/<name>-aspect/{src,resources}
//! ```
//!
//! Every container may carry an `aliases.toml` and an
//! `alias-definitions.toml` next to its `src` directory.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use walkdir::WalkDir;

use super::{
    AssetId, AssetKind, BundlableKind, ContainerId, ContainerKind, LocationId, Model,
    ModelBuilder, SourceModuleInfo,
};
use crate::aliasing::{AliasDefinitionsFile, AliasesFile};
use crate::core::error::{BundlerError, Result};
use crate::memoization::FileModificationRegistry;

/// File name of a container's alias overrides.
pub const ALIASES_FILE: &str = "aliases.toml";
/// File name of a container's alias definitions.
pub const ALIAS_DEFINITIONS_FILE: &str = "alias-definitions.toml";

const LIBS_DIR: &str = "libs";
const BLADES_DIR: &str = "blades";
const WORKBENCH_DIR: &str = "workbench";
const SRC_DIR: &str = "src";
const RESOURCES_DIR: &str = "resources";
const ROOT_LOCATION: &str = "root";
const INDEX_FILE: &str = "index.html";
const BLADESET_SUFFIX: &str = "-bladeset";
const ASPECT_SUFFIX: &str = "-aspect";

/// Options controlling discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Name of the library whose modules precede every bundle.
    pub bootstrap_library: String,
    /// Name of the aspect whose resources workbenches see.
    pub default_aspect: String,
    /// Register every directory for change notifications instead of
    /// re-reading files on every access.
    pub watch: bool,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            bootstrap_library: "br-bootstrap".to_string(),
            default_aspect: "default".to_string(),
            watch: false,
        }
    }
}

struct Blade {
    id: ContainerId,
    name: String,
    dir: PathBuf,
}

/// Scans the application at `root`.
///
/// # Errors
///
/// Returns `ConfigError` when `root` is not a directory or an alias file is
/// invalid, `IOError` when a file cannot be read and `ModelOperation` when a
/// directory cannot be scanned or two modules share a require path.
pub fn discover(root: &Path, options: &DiscoveryOptions) -> Result<Model> {
    if !root.is_dir() {
        return Err(BundlerError::config_error(
            format!("Application directory '{}' does not exist", root.display()),
            Some(root.to_path_buf()),
        ));
    }

    let registry = if options.watch {
        FileModificationRegistry::watching(root)?
    } else {
        FileModificationRegistry::pessimistic()
    };
    let mut builder = ModelBuilder::new(root)
        .with_file_registry(Arc::new(registry))
        .with_bootstrap_library(&options.bootstrap_library)
        .with_default_aspect(&options.default_aspect);

    let app_name = root
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app".to_string());
    let app = add_container(&mut builder, &app_name, ContainerKind::App, root)?;

    let mut common_scope = Vec::new();
    for (name, dir) in subdirectories(&root.join(LIBS_DIR))? {
        common_scope.push(add_container(&mut builder, &name, ContainerKind::Library, &dir)?);
    }
    common_scope.push(app);

    let mut bladesets = Vec::new();
    let mut aspects = Vec::new();
    for (dir_name, dir) in subdirectories(root)? {
        if let Some(name) = dir_name.strip_suffix(BLADESET_SUFFIX) {
            let bladeset = add_container(&mut builder, name, ContainerKind::Bladeset, &dir)?;
            let mut blades = Vec::new();
            for (blade_name, blade_dir) in subdirectories(&dir.join(BLADES_DIR))? {
                let id = add_container(&mut builder, &blade_name, ContainerKind::Blade, &blade_dir)?;
                blades.push(Blade {
                    id,
                    name: blade_name,
                    dir: blade_dir,
                });
            }
            bladesets.push((bladeset, blades));
        } else if let Some(name) = dir_name.strip_suffix(ASPECT_SUFFIX) {
            let aspect = add_container(&mut builder, name, ContainerKind::Aspect, &dir)?;
            let seeds = add_root_location(&mut builder, aspect, &dir);
            aspects.push((name.to_string(), aspect, seeds));
        }
    }

    let mut aspect_scope = common_scope.clone();
    for (bladeset, blades) in &bladesets {
        aspect_scope.push(*bladeset);
        aspect_scope.extend(blades.iter().map(|blade| blade.id));
    }
    for (name, aspect, seeds) in aspects {
        let mut scope = aspect_scope.clone();
        scope.push(aspect);
        _ = builder.add_node(&name, BundlableKind::Aspect, aspect, seeds, scope);
    }

    for (bladeset, blades) in &bladesets {
        for blade in blades {
            let dir = blade.dir.join(WORKBENCH_DIR);
            if !dir.is_dir() {
                continue;
            }
            let workbench = add_container(&mut builder, &blade.name, ContainerKind::Workbench, &dir)?;
            let seeds = add_root_location(&mut builder, workbench, &dir);
            let mut scope = common_scope.clone();
            scope.extend([*bladeset, blade.id, workbench]);
            _ = builder.add_node(&blade.name, BundlableKind::Workbench, workbench, seeds, scope);
        }
    }

    info!("Discovered application '{}' at {}", app_name, root.display());
    builder.build()
}

/// Immediate subdirectories of `dir` sorted by name; empty when `dir` is
/// missing.
fn subdirectories(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| BundlerError::io_error(dir.to_path_buf(), e))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BundlerError::io_error(dir.to_path_buf(), e))?;
        let path = entry.path();
        if path.is_dir() {
            found.push((entry.file_name().to_string_lossy().into_owned(), path));
        }
    }
    found.sort();
    Ok(found)
}

fn add_container(
    builder: &mut ModelBuilder,
    name: &str,
    kind: ContainerKind,
    dir: &Path,
) -> Result<ContainerId> {
    let container = builder.add_container(name, kind, dir);
    let src = add_location(builder, container, SRC_DIR, &dir.join(SRC_DIR))?;
    let resources = add_location(builder, container, RESOURCES_DIR, &dir.join(RESOURCES_DIR))?;
    if let (Some(src), Some(resources)) = (src, resources) {
        builder.location_depends_on(src, resources);
    }

    let aliases = dir.join(ALIASES_FILE);
    if aliases.is_file() {
        builder.set_aliases_file(container, AliasesFile::load(&aliases)?);
    }
    let definitions = dir.join(ALIAS_DEFINITIONS_FILE);
    if definitions.is_file() {
        builder.set_alias_definitions(container, AliasDefinitionsFile::load(&definitions)?);
    }

    debug!("Added {:?} container '{}'", kind, name);
    Ok(container)
}

fn add_root_location(builder: &mut ModelBuilder, container: ContainerId, dir: &Path) -> Vec<AssetId> {
    let index = dir.join(INDEX_FILE);
    if !index.is_file() {
        return Vec::new();
    }
    let location = builder.add_location(container, ROOT_LOCATION, dir);
    vec![builder.add_file_asset(location, index, AssetKind::Linked)]
}

fn add_location(
    builder: &mut ModelBuilder,
    container: ContainerId,
    name: &str,
    dir: &Path,
) -> Result<Option<LocationId>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let location = builder.add_location(container, name, dir);
    let module_root = (name == SRC_DIR).then_some(dir);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            BundlerError::model_operation(
                format!("Failed to scan '{}'", dir.display()),
                Some(Box::new(e)),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        let kind = asset_kind(&path, module_root)?;
        _ = builder.add_file_asset(location, path, kind);
    }
    Ok(Some(location))
}

/// `.js` files below a `src` directory are source modules, `.html` and
/// `.xml` files are linked and everything else is static.
fn asset_kind(path: &Path, module_root: Option<&Path>) -> Result<AssetKind> {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match (extension.as_str(), module_root) {
        ("js", Some(module_root)) => {
            let relative = path.strip_prefix(module_root).unwrap_or(path).with_extension("");
            let require_path = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let text = fs::read_to_string(path).map_err(|e| BundlerError::io_error(path.to_path_buf(), e))?;
            Ok(AssetKind::SourceModule(SourceModuleInfo::detect(&require_path, &text)))
        }
        ("html" | "xml", _) => Ok(AssetKind::Linked),
        _ => Ok(AssetKind::Static),
    }
}
