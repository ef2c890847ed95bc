//! # Bundle Sets
//!
//! A [`BundleSet`] is the immutable result of walking the dependency graph of
//! one bundlable node: its source modules in dependency order, every asset
//! reached, the asset locations in precedence order and the aliases the
//! bundle uses. Content plugins render output exclusively from a bundle set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::model::{Asset, AssetId, AssetLocation, BundlableNode, LocationId, Model, NodeId};

/// Walks the dependency graph of a node.
pub mod builder;
/// Topological module ordering and location regrouping.
pub mod order;
/// Text reports of the dependency graph.
pub mod report;

pub use builder::BundleSetBuilder;

/// Why one asset depends on another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// A `require()` call.
    Require,
    /// A class name mentioned in namespaced code or markup.
    Static,
    /// A `require('alias!<name>')` call.
    Alias(String),
    /// A seed pulled in with an asset location.
    Resource,
}

/// Edges recorded while building a bundle set, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    edges: HashMap<AssetId, Vec<(AssetId, EdgeKind)>>,
}

impl DependencyGraph {
    /// Records an edge unless the same target is already recorded.
    pub fn add_edge(&mut self, from: AssetId, to: AssetId, kind: EdgeKind) {
        let edges = self.edges.entry(from).or_default();
        if !edges.iter().any(|(target, _)| *target == to) {
            edges.push((to, kind));
        }
    }

    /// Outgoing edges of `asset`.
    pub fn dependencies(&self, asset: AssetId) -> &[(AssetId, EdgeKind)] {
        self.edges.get(&asset).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The kind of the edge `from -> to`, if recorded.
    pub fn edge(&self, from: AssetId, to: AssetId) -> Option<&EdgeKind> {
        self.dependencies(from)
            .iter()
            .find(|(target, _)| *target == to)
            .map(|(_, kind)| kind)
    }
}

/// The dependency closure of one bundlable node.
#[derive(Debug)]
pub struct BundleSet {
    model: Arc<Model>,
    node: NodeId,
    seeds: Vec<AssetId>,
    source_modules: Vec<AssetId>,
    assets: Vec<AssetId>,
    locations: Vec<LocationId>,
    aliases: BTreeMap<String, AssetId>,
    scenario: Option<String>,
    graph: DependencyGraph,
}

impl BundleSet {
    /// The model the bundle set was built from.
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// The originating node.
    pub fn node(&self) -> &BundlableNode {
        self.model.node(self.node)
    }

    /// The seeds the walk started from.
    pub fn seeds(&self) -> &[AssetId] {
        &self.seeds
    }

    /// Source module ids, dependencies first.
    pub fn source_module_ids(&self) -> &[AssetId] {
        &self.source_modules
    }

    /// Source modules, dependencies first.
    pub fn source_modules(&self) -> impl Iterator<Item = &Asset> + '_ {
        self.source_modules.iter().map(|id| self.model.asset(*id))
    }

    /// Every asset reached, in discovery order.
    pub fn assets(&self) -> impl Iterator<Item = &Asset> + '_ {
        self.assets.iter().map(|id| self.model.asset(*id))
    }

    /// Asset locations, least specific container first.
    pub fn asset_locations(&self) -> impl Iterator<Item = &AssetLocation> + '_ {
        self.locations.iter().map(|id| self.model.location(*id))
    }

    /// Asset location ids, least specific container first.
    pub fn asset_location_ids(&self) -> &[LocationId] {
        &self.locations
    }

    /// Assets of the bundle whose require path starts with `prefix`.
    pub fn assets_with_require_prefix(&self, prefix: &str) -> Vec<&Asset> {
        self.source_modules()
            .filter(|asset| asset.require_path().map_or(false, |path| path.starts_with(prefix)))
            .collect()
    }

    /// The module of the bundle with the given require path.
    pub fn source_module(&self, require_path: &str) -> Option<&Asset> {
        self.source_modules()
            .find(|asset| asset.require_path() == Some(require_path))
    }

    /// Aliases used by the bundle, with the module each resolved to.
    pub fn aliases(&self) -> &BTreeMap<String, AssetId> {
        &self.aliases
    }

    /// The scenario the aliases were resolved under.
    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    /// Edges recorded during the walk.
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Module dependencies of `module` that are part of the bundle.
    pub fn module_dependencies(&self, module: AssetId) -> Vec<AssetId> {
        self.graph
            .dependencies(module)
            .iter()
            .map(|(target, _)| *target)
            .filter(|target| self.model.asset(*target).source_module().is_some())
            .collect()
    }
}
