//! Ordering of source modules and asset locations.
//!
//! Modules are ordered with a depth-first topological sort using
//! three-colour marking:
//!
//! 1. **white**: not reached yet
//! 2. **grey**: on the current DFS path
//! 3. **black**: emitted, with every dependency before it
//!
//! Reaching a grey module closes a cycle and fails the build.

use std::collections::{HashMap, HashSet};

use crate::core::error::{BundlerError, Result};
use crate::model::{AssetId, ContainerId, LocationId, Model};

struct SortContext<'a> {
    model: &'a Model,
    edges: &'a HashMap<AssetId, Vec<AssetId>>,
    visited: HashSet<AssetId>,
    path: Vec<AssetId>,
    result: Vec<AssetId>,
}

/// Orders `modules` so every module follows its dependencies.
///
/// The roots are visited in the order given, so the closure of the first
/// roots precedes everything else; independent modules keep that order.
///
/// # Arguments
///
/// * `model` - Used to name modules in cycle errors
/// * `edges` - Module dependency lists
/// * `roots` - Modules in visiting order, bootstrap modules first
///
/// # Errors
///
/// Returns `CircularDependency` naming the require paths of the cycle.
pub fn sort_source_modules(
    model: &Model,
    edges: &HashMap<AssetId, Vec<AssetId>>,
    roots: &[AssetId],
) -> Result<Vec<AssetId>> {
    let mut ctx = SortContext {
        model,
        edges,
        visited: HashSet::new(),
        path: Vec::new(),
        result: Vec::with_capacity(roots.len()),
    };

    for root in roots {
        if !ctx.visited.contains(root) {
            visit(&mut ctx, *root)?;
        }
    }
    Ok(ctx.result)
}

fn visit(ctx: &mut SortContext<'_>, module: AssetId) -> Result<()> {
    if let Some(start) = ctx.path.iter().position(|on_path| *on_path == module) {
        let chain = ctx.path[start..]
            .iter()
            .chain(std::iter::once(&module))
            .map(|id| module_name(ctx.model, *id))
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(BundlerError::CircularDependency { chain });
    }
    if ctx.visited.contains(&module) {
        return Ok(());
    }

    ctx.path.push(module);
    if let Some(dependencies) = ctx.edges.get(&module) {
        for dependency in dependencies {
            visit(ctx, *dependency)?;
        }
    }
    _ = ctx.path.pop();

    _ = ctx.visited.insert(module);
    ctx.result.push(module);
    Ok(())
}

fn module_name(model: &Model, id: AssetId) -> String {
    let asset = model.asset(id);
    asset
        .require_path()
        .unwrap_or_else(|| asset.asset_path())
        .to_string()
}

/// Regroups locations by container following `scope`.
///
/// For each container of the scope, least specific first, its locations are
/// moved to the end of the list in their current relative order. Locations of
/// containers outside the scope therefore stay in front.
pub fn order_asset_locations(
    model: &Model,
    locations: &[LocationId],
    scope: &[ContainerId],
) -> Vec<LocationId> {
    let mut ordered = locations.to_vec();
    for container in scope {
        let (moved, kept): (Vec<LocationId>, Vec<LocationId>) = ordered
            .into_iter()
            .partition(|location| model.location(*location).container() == *container);
        ordered = kept;
        ordered.extend(moved);
    }
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerKind, ModelBuilder};

    fn modules(count: usize) -> (Model, Vec<AssetId>) {
        let mut builder = ModelBuilder::new("/app");
        let lib = builder.add_container("lib", ContainerKind::Library, "/app/libs/lib");
        let src = builder.add_location(lib, "src", "/app/libs/lib/src");
        let ids = (0..count)
            .map(|i| builder.add_source_module(src, &format!("m{}", i), ""))
            .collect();
        (builder.build().unwrap(), ids)
    }

    #[test]
    fn test_dependencies_come_first() {
        let (model, ids) = modules(3);
        let mut edges = HashMap::new();
        _ = edges.insert(ids[0], vec![ids[1]]);
        _ = edges.insert(ids[1], vec![ids[2]]);

        let sorted = sort_source_modules(&model, &edges, &[ids[0], ids[1], ids[2]]).unwrap();
        assert_eq!(sorted, vec![ids[2], ids[1], ids[0]]);
    }

    #[test]
    fn test_roots_order_breaks_ties() {
        let (model, ids) = modules(3);
        let edges = HashMap::new();
        let sorted = sort_source_modules(&model, &edges, &[ids[2], ids[0], ids[1]]).unwrap();
        assert_eq!(sorted, vec![ids[2], ids[0], ids[1]]);
    }

    #[test]
    fn test_cycle_is_reported_with_chain() {
        let (model, ids) = modules(3);
        let mut edges = HashMap::new();
        _ = edges.insert(ids[0], vec![ids[1]]);
        _ = edges.insert(ids[1], vec![ids[2]]);
        _ = edges.insert(ids[2], vec![ids[1]]);

        match sort_source_modules(&model, &edges, &[ids[0]]).unwrap_err() {
            BundlerError::CircularDependency { chain } => {
                assert_eq!(chain, "m1 -> m2 -> m1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_locations_follow_scope() {
        let mut builder = ModelBuilder::new("/app");
        let lib = builder.add_container("lib", ContainerKind::Library, "/app/libs/lib");
        let aspect = builder.add_container("default", ContainerKind::Aspect, "/app/default-aspect");
        let other = builder.add_container("x", ContainerKind::Aspect, "/app/x-aspect");
        let aspect_src = builder.add_location(aspect, "src", "/app/default-aspect/src");
        let lib_src = builder.add_location(lib, "src", "/app/libs/lib/src");
        let other_res = builder.add_location(other, "resources", "/app/x-aspect/resources");
        let lib_res = builder.add_location(lib, "resources", "/app/libs/lib/resources");
        let model = builder.build().unwrap();

        let ordered = order_asset_locations(
            &model,
            &[aspect_src, lib_src, other_res, lib_res],
            &[lib, aspect],
        );
        assert_eq!(ordered, vec![other_res, lib_src, lib_res, aspect_src]);
    }
}
