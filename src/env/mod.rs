// src/env/mod.rs

//! Build environment composition.
//!
//! For a node about to build, the composer gathers the dependencies whose
//! installations must be visible: its direct dependencies of every kind,
//! plus the transitive closure over link/run edges (build-only edges do not
//! propagate, a build tool's own build tools are irrelevant here). It folds
//! their exported environment contributions in dependency-then-dependent
//! order. Later contributions win for `Set` keys and land in front for
//! `Prepend` keys. Given a deterministic solve, composition is deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::registry::ExportMode;
use crate::solve::{ConcreteNode, DependencyGraph};

/// Composed environment for one build, variable name to value.
pub type BuildEnv = BTreeMap<String, String>;

/// Install-prefix layout: every package installs under
/// `<root>/<name>-<version>`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn prefix(&self, node: &ConcreteNode) -> PathBuf {
        self.root.join(node.label())
    }
}

/// Compute the build-time environment for `name`.
///
/// Panics are avoided by construction: the graph is finalized, so every
/// referenced node exists.
pub fn compose(graph: &DependencyGraph, name: &str, layout: &Layout) -> BuildEnv {
    let included = relevant_dependencies(graph, name);

    let mut env = BuildEnv::new();
    // topo_iter yields dependencies before dependents, which is exactly the
    // fold order the override semantics need.
    for node in graph.topo_iter() {
        if !included.contains(node.name.as_str()) {
            continue;
        }
        let prefix = layout.prefix(node);
        let prefix_str = prefix.to_string_lossy();
        for (key, export) in &node.exports {
            let value = export.value.replace("{prefix}", &prefix_str);
            match export.mode {
                ExportMode::Set => {
                    env.insert(key.clone(), value);
                }
                ExportMode::Prepend => match env.get_mut(key) {
                    Some(existing) => {
                        *existing = format!("{value}:{existing}");
                    }
                    None => {
                        env.insert(key.clone(), value);
                    }
                },
            }
        }
    }

    trace!(package = %name, vars = env.len(), "composed build environment");
    env
}

/// Direct dependencies of every kind, expanded through link/run edges.
fn relevant_dependencies<'a>(graph: &'a DependencyGraph, name: &str) -> BTreeSet<&'a str> {
    use crate::registry::DepKind;

    let mut included: BTreeSet<&str> = BTreeSet::new();
    let mut frontier: Vec<&str> = Vec::new();

    if let Some(node) = graph.node(name) {
        for edge in &node.edges {
            if included.insert(edge.target.as_str()) {
                frontier.push(edge.target.as_str());
            }
        }
    }

    while let Some(current) = frontier.pop() {
        let Some(node) = graph.node(current) else { continue };
        for edge in &node.edges {
            let transitive =
                edge.has_kind(DepKind::Link) || edge.has_kind(DepKind::Run);
            if transitive && included.insert(edge.target.as_str()) {
                frontier.push(edge.target.as_str());
            }
        }
    }

    included
}
