//! Text reports of the dependency graph of a bundle set.
//!
//! ```text
//! Aspect 'default' dependencies found:
//!     +--- 'default-aspect/index.html' (seed file)
//!     |    \--- 'default-aspect/src/app/App.js'
//!     |    |    \--- 'default-aspect/resources/view.html' (implicit resource)
//! ```
//!
//! Reports complete incomplete aliases first, and render alias and require
//! failures as the report text instead of failing.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;

use super::{BundleSet, BundleSetBuilder, EdgeKind};
use crate::core::error::{BundlerError, Result};
use crate::model::{AssetId, BundlableKind, Model, NodeId};

const INDENT: &str = "    ";
const MANY_FOOTER: &str = "\n    (*) - subsequent instances not shown (use -A or --all to show)";
const OMITTED_FOOTER: &str = "\n    (*) - dependencies omitted (listed previously)";

/// Reports the dependency tree of a node starting from its seeds.
///
/// # Errors
///
/// Only errors other than alias, require-path and cycle failures are
/// returned; those are rendered as the report.
pub fn node_report(model: &Arc<Model>, node: NodeId, show_all: bool) -> Result<String> {
    let bundlable = model.node(node);
    let header = match bundlable.kind() {
        BundlableKind::Aspect => format!("Aspect '{}' dependencies found:\n", bundlable.name()),
        BundlableKind::Workbench => "Workbench dependencies found:\n".to_string(),
    };

    if let Err(err) = fix_incomplete_aliases(model, node) {
        return render_failure(err);
    }
    let bundle_set = match BundleSetBuilder::new(Arc::clone(model), node).build() {
        Ok(bundle_set) => bundle_set,
        Err(err) => return render_failure(err),
    };

    let roots = bundle_set.seeds().to_vec();
    Ok(header + &ReportBuilder::new(&bundle_set, roots, show_all).render())
}

/// Reports the dependency tree of the module an alias resolves to.
pub fn alias_report(
    model: &Arc<Model>,
    node: NodeId,
    alias: &str,
    show_all: bool,
) -> Result<String> {
    if let Err(err) = fix_incomplete_aliases(model, node) {
        return render_failure(err);
    }

    let scope = model.alias_scope(node);
    let resolved = model.aliases().read().resolve(&scope, alias);
    let module = match resolved {
        Ok(Some(class)) => match model.module_for_reference(&class) {
            Some(module) => module,
            None => return Ok(BundlerError::require_path(class, format!("alias!{}", alias)).to_string()),
        },
        Ok(None) => {
            let referrer = model.container(model.node(node).container()).name().to_string();
            return Ok(BundlerError::require_path(format!("alias!{}", alias), referrer).to_string());
        }
        Err(err) => return render_failure(err),
    };

    let bundle_set = match BundleSetBuilder::new(Arc::clone(model), node)
        .with_seeds(vec![module])
        .build()
    {
        Ok(bundle_set) => bundle_set,
        Err(err) => return render_failure(err),
    };

    let header = format!("Alias '{}' dependencies found:\n", alias);
    Ok(header + &ReportBuilder::new(&bundle_set, vec![module], show_all).render())
}

fn fix_incomplete_aliases(model: &Model, node: NodeId) -> Result<Vec<String>> {
    let scope = model.alias_scope(node);
    model.aliases().write().fix_incomplete_aliases(&scope)
}

fn render_failure(err: BundlerError) -> Result<String> {
    match err {
        BundlerError::RequirePath { .. }
        | BundlerError::UnresolvableAlias { .. }
        | BundlerError::IncompleteAlias { .. }
        | BundlerError::CircularDependency { .. } => Ok(err.to_string()),
        other => Err(other),
    }
}

struct ReportBuilder<'a> {
    bundle_set: &'a BundleSet,
    roots: Vec<AssetId>,
    show_all: bool,
    many: HashSet<AssetId>,
    has_omitted: bool,
    out: String,
}

impl<'a> ReportBuilder<'a> {
    fn new(bundle_set: &'a BundleSet, roots: Vec<AssetId>, show_all: bool) -> Self {
        let mut builder = Self {
            bundle_set,
            roots,
            show_all,
            many: HashSet::new(),
            has_omitted: false,
            out: String::new(),
        };
        let mut processed = HashSet::new();
        let mut many = HashSet::new();
        for root in builder.roots.clone() {
            builder.collect_many(root, &mut processed, &mut many);
        }
        builder.many = many;
        builder
    }

    fn render(mut self) -> String {
        let mut processed = HashSet::new();
        for root in self.roots.clone() {
            self.add_dependency(root, None, &mut processed, 1);
        }

        if !self.show_all && !self.many.is_empty() {
            self.out.push_str(MANY_FOOTER);
        } else if self.show_all && self.has_omitted {
            self.out.push_str(OMITTED_FOOTER);
        }
        self.out
    }

    fn dependencies(&self, asset: AssetId) -> Vec<AssetId> {
        let model = self.bundle_set.model();
        self.bundle_set
            .dependency_graph()
            .dependencies(asset)
            .iter()
            .map(|(target, _)| *target)
            .filter(|target| model.asset(*target).is_linked())
            .collect()
    }

    fn collect_many(
        &self,
        asset: AssetId,
        processed: &mut HashSet<AssetId>,
        many: &mut HashSet<AssetId>,
    ) {
        if processed.insert(asset) {
            for dependency in self.dependencies(asset) {
                self.collect_many(dependency, processed, many);
            }
        } else {
            _ = many.insert(asset);
        }
    }

    fn add_dependency(
        &mut self,
        asset: AssetId,
        referrer: Option<AssetId>,
        processed: &mut HashSet<AssetId>,
        level: usize,
    ) {
        let seen = processed.contains(&asset);
        if self.show_all || !seen {
            self.append(asset, referrer, level, seen);
        }

        let dependencies = self.dependencies(asset);
        if processed.insert(asset) {
            for dependency in dependencies {
                self.add_dependency(dependency, Some(asset), processed, level + 1);
            }
        } else if !dependencies.is_empty() {
            self.has_omitted = true;
        }
    }

    fn append(&mut self, asset: AssetId, referrer: Option<AssetId>, level: usize, seen: bool) {
        self.out.push_str(INDENT);
        if level == 1 {
            self.out.push_str("+--- ");
        } else {
            for _ in 1..level {
                self.out.push_str("|    ");
            }
            self.out.push_str("\\--- ");
        }

        let path = self.bundle_set.model().asset(asset).asset_path();
        _ = write!(self.out, "'{}'", path);

        let edge = referrer.and_then(|from| self.bundle_set.dependency_graph().edge(from, asset));
        if self.bundle_set.seeds().contains(&asset) {
            self.out.push_str(" (seed file)");
        } else {
            match edge {
                Some(EdgeKind::Static) => self.out.push_str(" (static dep.)"),
                Some(EdgeKind::Resource) => self.out.push_str(" (implicit resource)"),
                Some(EdgeKind::Alias(_)) => self.out.push_str(" (alias dep.)"),
                Some(EdgeKind::Require) | None => {}
            }
        }

        if (self.show_all && seen) || (!self.show_all && self.many.contains(&asset)) {
            self.out.push_str(" (*)");
        }
        self.out.push('\n');
    }
}
