//! # Asset Model
//!
//! The model is the long-lived, shared description of an application:
//! containers own asset locations, locations own assets, and bundlable nodes
//! name the entry points a bundle set can be built for. Everything except the
//! alias registry is immutable once [`ModelBuilder::build`] returns, so a
//! single `Arc<Model>` serves concurrent builds.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::aliasing::{AliasDefinitionsFile, AliasRegistry, AliasScope, AliasesFile};
use crate::core::error::{BundlerError, Result};
use crate::memoization::{FileInfo, FileModificationRegistry, MemoizedValue};
use crate::router::trie::{Trie, TrieBuilder};

/// Extraction of dependency references from asset text.
pub mod dependencies;
/// Builds a model from an application directory.
pub mod discovery;

pub use dependencies::DependencyRef;

macro_rules! model_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Position of the item in its model table.
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

model_id!(
    /// Identifies an [`Asset`] within its model.
    AssetId
);
model_id!(
    /// Identifies an [`AssetLocation`] within its model.
    LocationId
);
model_id!(
    /// Identifies an [`AssetContainer`] within its model.
    ContainerId
);
model_id!(
    /// Identifies a [`BundlableNode`] within its model.
    NodeId
);

/// Kind of an asset container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// The application itself.
    App,
    /// A shared library under `libs/`.
    Library,
    /// A group of blades.
    Bladeset,
    /// A feature inside a bladeset.
    Blade,
    /// A deployable aspect of the application.
    Aspect,
    /// A development harness for one blade.
    Workbench,
}

impl ContainerKind {
    /// Alias precedence level; `0` is the most specific.
    pub fn precedence(self) -> u8 {
        match self {
            ContainerKind::Aspect | ContainerKind::Workbench => 0,
            ContainerKind::Blade => 1,
            ContainerKind::Bladeset => 2,
            ContainerKind::App => 3,
            ContainerKind::Library => 4,
        }
    }
}

/// A named owner of asset locations.
#[derive(Debug)]
pub struct AssetContainer {
    id: ContainerId,
    name: String,
    kind: ContainerKind,
    dir: PathBuf,
    locations: Vec<LocationId>,
}

impl AssetContainer {
    /// The container id.
    pub fn id(&self) -> ContainerId {
        self.id
    }

    /// The container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The container kind.
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// The container directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Locations owned by the container, in discovery order.
    pub fn locations(&self) -> &[LocationId] {
        &self.locations
    }
}

/// A grouping of assets such as a `src` or `resources` folder.
#[derive(Debug)]
pub struct AssetLocation {
    id: LocationId,
    name: String,
    container: ContainerId,
    dir: PathBuf,
    assets: Vec<AssetId>,
    dependent_locations: Vec<LocationId>,
}

impl AssetLocation {
    /// The location id.
    pub fn id(&self) -> LocationId {
        self.id
    }

    /// The location name, e.g. `src`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning container.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// The location directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every asset of the location.
    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    /// Locations pulled in whenever this one is.
    pub fn dependent_locations(&self) -> &[LocationId] {
        &self.dependent_locations
    }
}

/// Module data of a source-module asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceModuleInfo {
    /// The unique require path.
    pub require_path: String,
    /// Dotted class name derived from the require path.
    pub class_name: String,
    /// `true` for CommonJS modules, `false` for namespaced ones.
    pub encapsulated: bool,
}

impl SourceModuleInfo {
    /// Derives the module data from a require path and the module text.
    pub fn detect(require_path: &str, text: &str) -> Self {
        Self {
            require_path: require_path.to_string(),
            class_name: require_path.replace('/', "."),
            encapsulated: dependencies::is_common_js(text),
        }
    }
}

/// What an asset is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    /// A JavaScript module with a require path.
    SourceModule(SourceModuleInfo),
    /// A non-module asset with outgoing edges, e.g. an HTML template.
    Linked,
    /// An asset without outgoing edges, e.g. a stylesheet.
    Static,
}

/// Where the text of an asset comes from.
#[derive(Debug)]
pub enum AssetSource {
    /// A file on disk.
    File(FileInfo),
    /// Text held in memory.
    Inline(String),
}

/// One unit of the application.
#[derive(Debug)]
pub struct Asset {
    id: AssetId,
    asset_path: String,
    location: LocationId,
    kind: AssetKind,
    source: AssetSource,
    dependency_refs: MemoizedValue<Vec<DependencyRef>>,
}

impl Asset {
    /// The asset id.
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Path relative to the application root, `/`-separated.
    pub fn asset_path(&self) -> &str {
        &self.asset_path
    }

    /// File name part of the asset path.
    pub fn file_name(&self) -> &str {
        self.asset_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.asset_path)
    }

    /// The owning location.
    pub fn location(&self) -> LocationId {
        self.location
    }

    /// The asset kind.
    pub fn kind(&self) -> &AssetKind {
        &self.kind
    }

    /// Module data when the asset is a source module.
    pub fn source_module(&self) -> Option<&SourceModuleInfo> {
        match &self.kind {
            AssetKind::SourceModule(info) => Some(info),
            _ => None,
        }
    }

    /// The require path of a source module.
    pub fn require_path(&self) -> Option<&str> {
        self.source_module().map(|info| info.require_path.as_str())
    }

    /// Whether the asset has outgoing edges.
    pub fn is_linked(&self) -> bool {
        !matches!(self.kind, AssetKind::Static)
    }

    /// Whether the asset path ends with `.<extension>`.
    pub fn has_extension(&self, extension: &str) -> bool {
        self.asset_path
            .rsplit_once('.')
            .map_or(false, |(_, ext)| ext.eq_ignore_ascii_case(extension))
    }

    /// The file backing the asset, if any.
    pub fn file_path(&self) -> Option<&Path> {
        match &self.source {
            AssetSource::File(info) => Some(info.path()),
            AssetSource::Inline(_) => None,
        }
    }

    /// Reads the asset text.
    ///
    /// # Errors
    ///
    /// Returns `ModelOperation` when the backing file cannot be read.
    pub fn content(&self) -> Result<String> {
        match &self.source {
            AssetSource::Inline(text) => Ok(text.clone()),
            AssetSource::File(info) => fs::read_to_string(info.path()).map_err(|e| {
                BundlerError::model_operation(
                    format!("Failed to read asset '{}'", self.asset_path),
                    Some(Box::new(e)),
                )
            }),
        }
    }
}

/// Kind of a bundlable node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundlableKind {
    /// A deployable aspect.
    Aspect,
    /// A blade workbench.
    Workbench,
}

/// An entry point a bundle set can be built for.
#[derive(Debug)]
pub struct BundlableNode {
    id: NodeId,
    name: String,
    kind: BundlableKind,
    container: ContainerId,
    seeds: Vec<AssetId>,
    scope: Vec<ContainerId>,
}

impl BundlableNode {
    /// The node id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The node name, e.g. `default` for the default aspect.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node kind.
    pub fn kind(&self) -> BundlableKind {
        self.kind
    }

    /// The container of the node.
    pub fn container(&self) -> ContainerId {
        self.container
    }

    /// The seed assets the dependency walk starts from.
    pub fn seeds(&self) -> &[AssetId] {
        &self.seeds
    }

    /// Containers visible to the node, least specific first.
    pub fn scope(&self) -> &[ContainerId] {
        &self.scope
    }
}

/// The application model shared by every build.
#[derive(Debug)]
pub struct Model {
    root: PathBuf,
    containers: Vec<AssetContainer>,
    locations: Vec<AssetLocation>,
    assets: Vec<Asset>,
    nodes: Vec<BundlableNode>,
    require_paths: BTreeMap<String, AssetId>,
    class_names: HashMap<String, AssetId>,
    class_index: Trie<AssetId>,
    aliases: RwLock<AliasRegistry>,
    bootstrap_library: Option<ContainerId>,
    default_aspect: Option<ContainerId>,
    file_registry: Arc<FileModificationRegistry>,
}

impl Model {
    /// The application root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Looks up a container.
    pub fn container(&self, id: ContainerId) -> &AssetContainer {
        &self.containers[id.0]
    }

    /// Every container.
    pub fn containers(&self) -> &[AssetContainer] {
        &self.containers
    }

    /// Looks up a location.
    pub fn location(&self, id: LocationId) -> &AssetLocation {
        &self.locations[id.0]
    }

    /// Looks up an asset.
    pub fn asset(&self, id: AssetId) -> &Asset {
        &self.assets[id.0]
    }

    /// Every asset.
    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// Looks up a bundlable node.
    pub fn node(&self, id: NodeId) -> &BundlableNode {
        &self.nodes[id.0]
    }

    /// Every bundlable node.
    pub fn nodes(&self) -> &[BundlableNode] {
        &self.nodes
    }

    /// Finds a node by kind and name.
    pub fn find_node(&self, kind: BundlableKind, name: &str) -> Option<&BundlableNode> {
        self.nodes
            .iter()
            .find(|node| node.kind == kind && node.name == name)
    }

    /// The container of an asset.
    pub fn container_of(&self, asset: AssetId) -> ContainerId {
        self.location(self.asset(asset).location).container
    }

    /// The source module with the given require path.
    pub fn source_module(&self, require_path: &str) -> Option<AssetId> {
        self.require_paths.get(require_path).copied()
    }

    /// Resolves a require path or a dotted class name to a source module.
    pub fn module_for_reference(&self, reference: &str) -> Option<AssetId> {
        self.source_module(reference)
            .or_else(|| self.class_names.get(reference).copied())
    }

    /// Source modules whose require path starts with `prefix`, in path order.
    pub fn modules_with_require_prefix(&self, prefix: &str) -> Vec<AssetId> {
        self.require_paths
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(_, id)| *id)
            .collect()
    }

    /// The trie of every source-module class name.
    pub fn class_index(&self) -> &Trie<AssetId> {
        &self.class_index
    }

    /// Seed assets of a location: its linked, non-module assets.
    pub fn seed_assets(&self, location: LocationId) -> impl Iterator<Item = AssetId> + '_ {
        self.location(location)
            .assets
            .iter()
            .copied()
            .filter(|id| matches!(self.asset(*id).kind, AssetKind::Linked))
    }

    /// Source modules of a container, in discovery order.
    pub fn container_source_modules(&self, container: ContainerId) -> Vec<AssetId> {
        self.container(container)
            .locations
            .iter()
            .flat_map(|location| self.location(*location).assets.iter().copied())
            .filter(|id| self.asset(*id).source_module().is_some())
            .collect()
    }

    /// The dependency references of an asset, cached until its files change.
    pub fn dependencies(&self, asset: AssetId) -> Result<Vec<DependencyRef>> {
        let asset = self.asset(asset);
        asset
            .dependency_refs
            .value(|| dependencies::extract(self, asset))
    }

    /// The library walked before every non-empty bundle.
    pub fn bootstrap_library(&self) -> Option<ContainerId> {
        self.bootstrap_library
    }

    /// The aspect whose resources every workbench sees.
    pub fn default_aspect(&self) -> Option<ContainerId> {
        self.default_aspect
    }

    /// The registry producing file generation counters.
    pub fn file_registry(&self) -> &Arc<FileModificationRegistry> {
        &self.file_registry
    }

    /// The alias files of the application.
    pub fn aliases(&self) -> &RwLock<AliasRegistry> {
        &self.aliases
    }

    /// The alias scope of a node.
    pub fn alias_scope(&self, node: NodeId) -> AliasScope {
        let node = self.node(node);
        let container = self.container(node.container);
        let scenario = self
            .aliases
            .read()
            .aliases_file(node.container)
            .and_then(|file| file.scenario().map(str::to_string));
        let scope: Vec<(ContainerId, ContainerKind)> = node
            .scope
            .iter()
            .rev()
            .map(|id| (*id, self.container(*id).kind))
            .collect();
        AliasScope::new(
            &scope,
            node.container,
            container.dir.join(discovery::ALIASES_FILE),
            scenario,
        )
    }
}

/// Assembles a [`Model`] programmatically or from discovery.
#[derive(Debug)]
pub struct ModelBuilder {
    root: PathBuf,
    containers: Vec<AssetContainer>,
    locations: Vec<AssetLocation>,
    assets: Vec<Asset>,
    nodes: Vec<BundlableNode>,
    aliases: AliasRegistry,
    file_registry: Arc<FileModificationRegistry>,
    bootstrap_library: String,
    default_aspect: String,
}

impl ModelBuilder {
    /// Creates a builder for an application rooted at `root`.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            containers: Vec::new(),
            locations: Vec::new(),
            assets: Vec::new(),
            nodes: Vec::new(),
            aliases: AliasRegistry::default(),
            file_registry: Arc::new(FileModificationRegistry::pessimistic()),
            bootstrap_library: "br-bootstrap".to_string(),
            default_aspect: "default".to_string(),
        }
    }

    /// Uses `registry` to guard file-backed assets.
    pub fn with_file_registry(mut self, registry: Arc<FileModificationRegistry>) -> Self {
        self.file_registry = registry;
        self
    }

    /// Names the bootstrap library.
    pub fn with_bootstrap_library(mut self, name: &str) -> Self {
        self.bootstrap_library = name.to_string();
        self
    }

    /// Names the default aspect.
    pub fn with_default_aspect(mut self, name: &str) -> Self {
        self.default_aspect = name.to_string();
        self
    }

    /// The application root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Adds a container.
    pub fn add_container<P: Into<PathBuf>>(
        &mut self,
        name: &str,
        kind: ContainerKind,
        dir: P,
    ) -> ContainerId {
        let id = ContainerId(self.containers.len());
        self.containers.push(AssetContainer {
            id,
            name: name.to_string(),
            kind,
            dir: dir.into(),
            locations: Vec::new(),
        });
        id
    }

    /// Adds a location to `container`.
    pub fn add_location<P: Into<PathBuf>>(
        &mut self,
        container: ContainerId,
        name: &str,
        dir: P,
    ) -> LocationId {
        let id = LocationId(self.locations.len());
        self.locations.push(AssetLocation {
            id,
            name: name.to_string(),
            container,
            dir: dir.into(),
            assets: Vec::new(),
            dependent_locations: Vec::new(),
        });
        self.containers[container.0].locations.push(id);
        id
    }

    /// Makes `location` pull in `dependency` whenever it is used.
    pub fn location_depends_on(&mut self, location: LocationId, dependency: LocationId) {
        let dependents = &mut self.locations[location.0].dependent_locations;
        if !dependents.contains(&dependency) {
            dependents.push(dependency);
        }
    }

    /// Adds an asset backed by the file at `path`.
    pub fn add_file_asset(
        &mut self,
        location: LocationId,
        path: PathBuf,
        kind: AssetKind,
    ) -> AssetId {
        let asset_path = self.asset_path_for(&path);
        let info = self.file_registry.info_for(&path);
        let dependency_refs = MemoizedValue::new(info.clone());
        self.push_asset(
            location,
            asset_path,
            kind,
            AssetSource::File(FileInfo::new(path, info)),
            dependency_refs,
        )
    }

    /// Adds an asset held in memory.
    pub fn add_inline_asset(
        &mut self,
        location: LocationId,
        file_name: &str,
        kind: AssetKind,
        text: &str,
    ) -> AssetId {
        let path = self.locations[location.0].dir.join(file_name);
        let asset_path = self.asset_path_for(&path);
        let info = self.file_registry.info_for(&path);
        self.push_asset(
            location,
            asset_path,
            kind,
            AssetSource::Inline(text.to_string()),
            MemoizedValue::new(info),
        )
    }

    /// Adds an in-memory source module whose file name follows its require path.
    pub fn add_source_module(
        &mut self,
        location: LocationId,
        require_path: &str,
        text: &str,
    ) -> AssetId {
        let kind = AssetKind::SourceModule(SourceModuleInfo::detect(require_path, text));
        self.add_inline_asset(location, &format!("{}.js", require_path), kind, text)
    }

    /// Adds a bundlable node.
    pub fn add_node(
        &mut self,
        name: &str,
        kind: BundlableKind,
        container: ContainerId,
        seeds: Vec<AssetId>,
        scope: Vec<ContainerId>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(BundlableNode {
            id,
            name: name.to_string(),
            kind,
            container,
            seeds,
            scope,
        });
        id
    }

    /// Attaches an aliases file to a container.
    pub fn set_aliases_file(&mut self, container: ContainerId, file: AliasesFile) {
        self.aliases.add_aliases_file(container, file);
    }

    /// Attaches an alias definitions file to a container.
    pub fn set_alias_definitions(
        &mut self,
        container: ContainerId,
        file: AliasDefinitionsFile,
    ) {
        self.aliases.add_definitions_file(container, file);
    }

    /// Indexes require paths and class names and freezes the model.
    ///
    /// # Errors
    ///
    /// Returns `ModelOperation` when two source modules share a require path.
    pub fn build(self) -> Result<Model> {
        let mut require_paths = BTreeMap::new();
        let mut class_names = HashMap::new();
        let mut class_index = TrieBuilder::new();

        for asset in &self.assets {
            let Some(info) = asset.source_module() else {
                continue;
            };
            if let Some(existing) = require_paths.insert(info.require_path.clone(), asset.id) {
                return Err(BundlerError::model_operation(
                    format!(
                        "Require path '{}' is provided by both '{}' and '{}'",
                        info.require_path,
                        self.assets[existing.0].asset_path,
                        asset.asset_path
                    ),
                    None,
                ));
            }
            if class_index.insert_literal(&info.class_name, asset.id).is_ok() {
                _ = class_names.insert(info.class_name.clone(), asset.id);
            } else {
                warn!("Class name '{}' is ambiguous", info.class_name);
            }
        }

        let find_container = |name: &str, kind: ContainerKind| {
            self.containers
                .iter()
                .find(|container| container.kind == kind && container.name == name)
                .map(|container| container.id)
        };
        let bootstrap_library = find_container(&self.bootstrap_library, ContainerKind::Library);
        let default_aspect = find_container(&self.default_aspect, ContainerKind::Aspect);
        if bootstrap_library.is_none() {
            debug!("No bootstrap library named '{}'", self.bootstrap_library);
        }

        debug!(
            "Model built with {} containers, {} locations, {} assets and {} nodes",
            self.containers.len(),
            self.locations.len(),
            self.assets.len(),
            self.nodes.len()
        );

        Ok(Model {
            root: self.root,
            containers: self.containers,
            locations: self.locations,
            assets: self.assets,
            nodes: self.nodes,
            require_paths,
            class_names,
            class_index: class_index.build(),
            aliases: RwLock::new(self.aliases),
            bootstrap_library,
            default_aspect,
            file_registry: self.file_registry,
        })
    }

    fn asset_path_for(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn push_asset(
        &mut self,
        location: LocationId,
        asset_path: String,
        kind: AssetKind,
        source: AssetSource,
        dependency_refs: MemoizedValue<Vec<DependencyRef>>,
    ) -> AssetId {
        let id = AssetId(self.assets.len());
        self.assets.push(Asset {
            id,
            asset_path,
            location,
            kind,
            source,
            dependency_refs,
        });
        self.locations[location.0].assets.push(id);
        id
    }
}
