use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info};

use super::order::{order_asset_locations, sort_source_modules};
use super::{BundleSet, DependencyGraph, EdgeKind};
use crate::aliasing::AliasScope;
use crate::core::error::{BundlerError, Result};
use crate::model::{
    Asset, AssetId, BundlableKind, DependencyRef, LocationId, Model, NodeId,
};

const RESOURCES_LOCATION: &str = "resources";

/// Builds the [`BundleSet`] of one bundlable node.
///
/// ```no_run
/// use std::sync::Arc;
/// use bundleflow::bundling::BundleSetBuilder;
/// use bundleflow::model::{discovery, BundlableKind};
///
/// let model = Arc::new(discovery::discover("my-app".as_ref(), &Default::default())?);
/// let node = model.find_node(BundlableKind::Aspect, "default").unwrap().id();
/// let bundle_set = BundleSetBuilder::new(model, node).build()?;
/// for module in bundle_set.source_modules() {
///     println!("{}", module.asset_path());
/// }
/// # Ok::<(), bundleflow::BundlerError>(())
/// ```
#[derive(Debug)]
pub struct BundleSetBuilder {
    model: Arc<Model>,
    node: NodeId,
    seeds: Option<Vec<AssetId>>,
}

impl BundleSetBuilder {
    /// Creates a builder for `node`, seeded with the node's own seeds.
    pub fn new(model: Arc<Model>, node: NodeId) -> Self {
        Self {
            model,
            node,
            seeds: None,
        }
    }

    /// Starts the walk from `seeds` instead of the node's seeds.
    pub fn with_seeds(mut self, seeds: Vec<AssetId>) -> Self {
        self.seeds = Some(seeds);
        self
    }

    /// Walks the graph and freezes the result.
    ///
    /// # Errors
    ///
    /// * `RequirePath` - a require path or alias does not resolve
    /// * `ModelOperation` - an asset could not be read
    /// * `UnresolvableAlias` / `IncompleteAlias` - alias resolution failed
    /// * `CircularDependency` - source modules depend on each other in a cycle
    pub fn build(self) -> Result<BundleSet> {
        let model = Arc::clone(&self.model);
        let node = model.node(self.node);
        let seeds = self.seeds.unwrap_or_else(|| node.seeds().to_vec());
        let scope = model.alias_scope(node.id());
        let scenario = scope.scenario().map(str::to_string);

        let mut walk = Walk::new(&model, scope);

        if node.kind() == BundlableKind::Workbench {
            if let Some(aspect) = model.default_aspect() {
                for location in model.container(aspect).locations() {
                    if model.location(*location).name() == RESOURCES_LOCATION {
                        walk.add_unscoped_location(*location);
                    }
                }
            }
        }

        for seed in &seeds {
            walk.add_asset(*seed)?;
            walk.add_location(model.asset(*seed).location(), Some(*seed))?;
        }

        let mut roots = Vec::new();
        if !walk.source_modules.is_empty() {
            if let Some(library) = model.bootstrap_library() {
                let bootstrap = model.container_source_modules(library);
                debug!(
                    "Adding {} bootstrap modules from '{}'",
                    bootstrap.len(),
                    model.container(library).name()
                );
                for location in model.container(library).locations() {
                    walk.add_unscoped_location(*location);
                }
                for module in &bootstrap {
                    walk.add_asset(*module)?;
                }
                roots = bootstrap;
            }
        }
        roots.extend(walk.source_modules.iter().copied());

        let source_modules = sort_source_modules(&model, &walk.module_edges, &roots)?;
        let locations = order_asset_locations(&model, &walk.locations, node.scope());

        info!(
            "Built bundle set for '{}' with {} modules, {} assets and {} locations",
            node.name(),
            source_modules.len(),
            walk.assets.len(),
            locations.len()
        );

        Ok(BundleSet {
            model: Arc::clone(&self.model),
            node: self.node,
            seeds,
            source_modules,
            assets: walk.assets,
            locations,
            aliases: walk.aliases,
            scenario,
            graph: walk.graph,
        })
    }
}

struct Walk<'m> {
    model: &'m Model,
    scope: AliasScope,
    visited_assets: HashSet<AssetId>,
    visited_locations: HashSet<LocationId>,
    assets: Vec<AssetId>,
    source_modules: Vec<AssetId>,
    locations: Vec<LocationId>,
    aliases: BTreeMap<String, AssetId>,
    graph: DependencyGraph,
    module_edges: HashMap<AssetId, Vec<AssetId>>,
}

impl<'m> Walk<'m> {
    fn new(model: &'m Model, scope: AliasScope) -> Self {
        Self {
            model,
            scope,
            visited_assets: HashSet::new(),
            visited_locations: HashSet::new(),
            assets: Vec::new(),
            source_modules: Vec::new(),
            locations: Vec::new(),
            aliases: BTreeMap::new(),
            graph: DependencyGraph::default(),
            module_edges: HashMap::new(),
        }
    }

    fn add_asset(&mut self, id: AssetId) -> Result<()> {
        if !self.visited_assets.insert(id) {
            return Ok(());
        }
        let model = self.model;
        let asset = model.asset(id);
        self.assets.push(id);
        if asset.source_module().is_some() {
            self.source_modules.push(id);
        }
        if !asset.is_linked() {
            return Ok(());
        }

        let dependencies = self.resolve_dependencies(asset)?;
        for (target, kind, orders) in &dependencies {
            self.graph.add_edge(id, *target, kind.clone());
            if *orders
                && asset.source_module().is_some()
                && model.asset(*target).source_module().is_some()
            {
                self.module_edges.entry(id).or_default().push(*target);
            }
        }

        self.add_location(asset.location(), Some(id))?;
        for (target, _, _) in dependencies {
            self.add_asset(target)?;
            self.add_location(model.asset(target).location(), Some(target))?;
        }
        Ok(())
    }

    fn add_location(&mut self, location: LocationId, from: Option<AssetId>) -> Result<()> {
        if !self.visited_locations.insert(location) {
            return Ok(());
        }
        let model = self.model;
        self.locations.push(location);

        let seeds: Vec<AssetId> = model.seed_assets(location).collect();
        for seed in seeds {
            if let Some(from) = from {
                if from != seed {
                    self.graph.add_edge(from, seed, EdgeKind::Resource);
                }
            }
            self.add_asset(seed)?;
        }
        for dependent in model.location(location).dependent_locations() {
            self.add_location(*dependent, from)?;
        }
        Ok(())
    }

    fn add_unscoped_location(&mut self, location: LocationId) {
        if self.visited_locations.insert(location) {
            self.locations.push(location);
        }
    }

    /// Resolves the references of `asset` to edges, each flagged with whether
    /// it constrains module order. Class uses inside function bodies do not.
    fn resolve_dependencies(&mut self, asset: &Asset) -> Result<Vec<(AssetId, EdgeKind, bool)>> {
        let model = self.model;
        let mut resolved = Vec::new();

        for reference in model.dependencies(asset.id())? {
            match reference {
                DependencyRef::Require(path) => {
                    let target = model
                        .source_module(&path)
                        .ok_or_else(|| BundlerError::require_path(path, asset.asset_path()))?;
                    resolved.push((target, EdgeKind::Require, true));
                }
                DependencyRef::Alias(name) => {
                    let unknown =
                        || BundlerError::require_path(format!("alias!{}", name), asset.asset_path());
                    let class = model
                        .aliases()
                        .read()
                        .resolve(&self.scope, &name)?
                        .ok_or_else(unknown)?;
                    let target = model
                        .module_for_reference(&class)
                        .ok_or_else(|| BundlerError::require_path(class.as_str(), asset.asset_path()))?;
                    _ = self.aliases.insert(name.clone(), target);
                    resolved.push((target, EdgeKind::Alias(name), true));
                }
                DependencyRef::Class(target) => resolved.push((target, EdgeKind::Static, false)),
                DependencyRef::DefineClass(target) => {
                    resolved.push((target, EdgeKind::Static, true))
                }
            }
        }
        Ok(resolved)
    }
}
