// src/solve/graph.rs

//! The concretized dependency graph.
//!
//! Built exactly once per solve via [`GraphBuilder`]; after `finalize()` the
//! graph is immutable and shared read-only by the scheduler, executor and
//! environment composer. Nodes are keyed by package name: one node per name
//! is the uniqueness invariant.

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::SolveError;
use crate::registry::{DepKind, EnvExport, StageCommands};
use crate::spec::{VariantValue, Version};

/// A typed edge from a node to one of its dependencies.
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    pub target: String,
    /// Edge kinds, sorted and deduplicated.
    pub kinds: Vec<DepKind>,
}

impl DependencyEdge {
    pub fn has_kind(&self, kind: DepKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// One fully concretized package.
#[derive(Debug, Clone)]
pub struct ConcreteNode {
    pub name: String,
    pub version: Version,
    /// Total assignment over the recipe's variant domain.
    pub variants: BTreeMap<String, VariantValue>,
    pub build_system: String,
    pub parallel: bool,
    pub exports: BTreeMap<String, EnvExport>,
    pub commands: StageCommands,
    /// Outgoing dependency edges, ordered by target name.
    pub edges: Vec<DependencyEdge>,
}

impl ConcreteNode {
    /// Names of dependencies reachable over edges carrying `kind`.
    pub fn deps_of_kind(&self, kind: DepKind) -> impl Iterator<Item = &str> {
        self.edges
            .iter()
            .filter(move |e| e.has_kind(kind))
            .map(|e| e.target.as_str())
    }

    /// `name-version` label used for install prefixes and report lines.
    pub fn label(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl std::fmt::Display for ConcreteNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.version)?;
        for (name, value) in &self.variants {
            match value {
                VariantValue::Bool(true) => write!(f, " +{name}")?,
                VariantValue::Bool(false) => write!(f, " ~{name}")?,
                other => write!(f, " {name}={other}")?,
            }
        }
        Ok(())
    }
}

/// Mutable accumulator the solver writes into; [`finalize`](Self::finalize)
/// validates and seals the result.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: BTreeMap<String, ConcreteNode>,
    root: String,
}

impl GraphBuilder {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            root: root.into(),
        }
    }

    pub fn add_node(&mut self, node: ConcreteNode) {
        self.nodes.insert(node.name.clone(), node);
    }

    /// Validate structural invariants and freeze the graph.
    ///
    /// Checks: the root exists, every edge targets a present node (no
    /// dangling references), and the edge relation is acyclic.
    pub fn finalize(self) -> Result<DependencyGraph, SolveError> {
        if !self.nodes.contains_key(&self.root) {
            return Err(SolveError::CyclicDependency(format!(
                "root '{}' missing from solved graph",
                self.root
            )));
        }

        for node in self.nodes.values() {
            for edge in &node.edges {
                if !self.nodes.contains_key(&edge.target) {
                    return Err(SolveError::InvalidRecipe {
                        package: node.name.clone(),
                        reason: format!("edge to unsolved package '{}'", edge.target),
                    });
                }
            }
        }

        // Edge direction for the check: dependency -> dependent.
        let mut check: DiGraphMap<&str, ()> = DiGraphMap::new();
        for node in self.nodes.values() {
            check.add_node(node.name.as_str());
            for edge in &node.edges {
                check.add_edge(edge.target.as_str(), node.name.as_str(), ());
            }
        }
        if let Err(cycle) = toposort(&check, None) {
            return Err(SolveError::CyclicDependency(format!(
                "cycle through package '{}'",
                cycle.node_id()
            )));
        }

        let mut consumers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for node in self.nodes.values() {
            for edge in &node.edges {
                consumers
                    .entry(edge.target.clone())
                    .or_default()
                    .push(node.name.clone());
            }
        }
        for list in consumers.values_mut() {
            list.sort();
            list.dedup();
        }

        Ok(DependencyGraph {
            nodes: self.nodes,
            root: self.root,
            consumers,
        })
    }
}

/// The finalized, read-only concretized DAG.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, ConcreteNode>,
    root: String,
    consumers: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn root(&self) -> &ConcreteNode {
        &self.nodes[&self.root]
    }

    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn node(&self, name: &str) -> Option<&ConcreteNode> {
        self.nodes.get(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &ConcreteNode> {
        self.nodes.values()
    }

    /// Direct dependents of a node, in name order.
    pub fn consumers_of(&self, name: &str) -> &[String] {
        self.consumers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Topological iteration: every node appears after all of its
    /// dependencies, ties broken by package name. The iterator is finite and
    /// each call restarts from the beginning.
    pub fn topo_iter(&self) -> impl Iterator<Item = &ConcreteNode> {
        self.topo_order().into_iter().map(|name| &self.nodes[name])
    }

    /// Deterministic Kahn ordering over the node set.
    fn topo_order(&self) -> Vec<&String> {
        let mut indegree: BTreeMap<&String, usize> = self
            .nodes
            .iter()
            .map(|(name, node)| (name, node.edges.len()))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        // BTreeMap iteration keeps the ready set in name order.
        while order.len() < self.nodes.len() {
            let next = indegree
                .iter()
                .find(|(_, degree)| **degree == 0)
                .map(|(name, _)| *name);
            // finalize() guarantees acyclicity, so a zero-indegree node
            // always exists here.
            let Some(name) = next else { break };
            indegree.remove(name);
            order.push(name);
            for consumer in self.consumers_of(name) {
                if let Some(degree) = indegree.get_mut(consumer) {
                    *degree -= 1;
                }
            }
        }
        order
    }
}
