// src/solve/solver.rs

//! The concretizer: conflict-driven backtracking search that turns one
//! requested [`PackageSpec`] plus a recipe registry into a fully concrete
//! [`DependencyGraph`].
//!
//! Search structure:
//! - a decision assigns either a version or a variant value to one package;
//! - decisions are made root-first, then in BFS discovery order over the
//!   growing partial graph; within a package, version before variants,
//!   variants in declaration order;
//! - candidates are tried highest-version-first / declared-default-first,
//!   so the first complete assignment found is the preferred one;
//! - after every decision, dependency rules whose guards became decidable
//!   are applied, adding edges and constraints (and discovering new
//!   packages);
//! - an empty candidate set raises a conflict carrying the implicated
//!   constraint set; the search retries the most recent decision whose
//!   package is implicated and backjumps past the ones that are not.
//!
//! The search is deterministic: ties are broken by package name and
//! declaration order everywhere, so an unchanged registry and spec always
//! concretize identically.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, trace};

use crate::errors::SolveError;
use crate::registry::{DepKind, RecipeProvider};
use crate::solve::graph::{ConcreteNode, DependencyEdge, DependencyGraph, GraphBuilder};
use crate::spec::{AssignmentView, PackageSpec, VariantValue, Version};

/// Requester label for constraints taken from the root request itself.
const ROOT_REQUESTER: &str = "<root spec>";

/// One version constraint with the package that imposed it.
#[derive(Debug, Clone)]
struct VersionRequirement {
    requester: String,
    constraint: crate::spec::VersionConstraint,
}

/// One variant constraint with the package that imposed it.
#[derive(Debug, Clone)]
struct VariantRequirement {
    requester: String,
    variant: String,
    value: VariantValue,
}

/// Partial assignment for one package during the search.
#[derive(Debug, Clone)]
struct PartialNode {
    name: String,
    versions: Vec<VersionRequirement>,
    variant_reqs: Vec<VariantRequirement>,
    version: Option<Version>,
    assigned: BTreeMap<String, VariantValue>,
}

impl PartialNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            versions: Vec::new(),
            variant_reqs: Vec::new(),
            version: None,
            assigned: BTreeMap::new(),
        }
    }

    /// Render the constraint store for conflict reports.
    fn rendered_constraints(&self) -> Vec<String> {
        let mut out = Vec::new();
        for req in &self.versions {
            out.push(format!(
                "{} requires {}@{}",
                req.requester, self.name, req.constraint
            ));
        }
        for req in &self.variant_reqs {
            out.push(format!(
                "{} requires {} {}={}",
                req.requester, self.name, req.variant, req.value
            ));
        }
        out
    }

    /// Every package implicated in this node's constraint store.
    fn involved_packages(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        out.insert(self.name.clone());
        for req in &self.versions {
            out.insert(req.requester.clone());
        }
        for req in &self.variant_reqs {
            out.insert(req.requester.clone());
        }
        out
    }

    /// Stable fingerprint of the constraint store, used for learned-failure
    /// pruning.
    fn constraint_fingerprint(&self) -> String {
        self.rendered_constraints().join("|")
    }
}

impl AssignmentView for PartialNode {
    fn variant_value(&self, name: &str) -> Option<&VariantValue> {
        self.assigned.get(name)
    }

    fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }
}

/// Whole-search state; cloned at each decision point so backtracking is a
/// return.
#[derive(Debug, Clone, Default)]
struct SolveState {
    nodes: BTreeMap<String, PartialNode>,
    /// BFS discovery order; drives decision ordering.
    order: Vec<String>,
    /// source package -> (target, kinds) for every applied rule.
    edges: BTreeMap<String, Vec<(String, Vec<DepKind>)>>,
    /// (owner package, rule index) pairs already applied.
    applied: BTreeSet<(String, usize)>,
}

impl SolveState {
    /// Conflict report for `package` under the current partial assignment.
    ///
    /// `involves` holds every package whose decisions could change the
    /// outcome: the package itself, each constraint requester, and all of
    /// their ancestors in the edge relation, since an ancestor's variant decision
    /// controls whether a requester (or the package) exists at all, so
    /// backjumping past ancestors would lose solutions.
    fn conflict_for(&self, package: &str) -> Conflict {
        let node = &self.nodes[package];
        let mut involves = node.involved_packages();
        let seeds: Vec<String> = involves.iter().cloned().collect();
        for seed in seeds {
            if !self.nodes.contains_key(&seed) {
                // Requester labels like "<root spec>" are not packages.
                continue;
            }
            for ancestor in self.nodes.keys() {
                if ancestor != &seed && self.reaches(ancestor, &seed) {
                    involves.insert(ancestor.clone());
                }
            }
        }
        Conflict {
            package: package.to_string(),
            constraints: node.rendered_constraints(),
            involves,
        }
    }

    /// True if `to` is reachable from `from` over applied edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        let mut stack = vec![from];
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        while let Some(name) = stack.pop() {
            if name == to {
                return true;
            }
            if !seen.insert(name) {
                continue;
            }
            if let Some(targets) = self.edges.get(name) {
                stack.extend(targets.iter().map(|(t, _)| t.as_str()));
            }
        }
        false
    }
}

/// Internal conflict raised when a node's candidate set empties.
#[derive(Debug, Clone)]
struct Conflict {
    package: String,
    constraints: Vec<String>,
    involves: BTreeSet<String>,
}

/// Search-level failure: conflicts drive backtracking, fatal errors abort.
enum SearchFailure {
    Conflict(Conflict),
    Fatal(SolveError),
}

/// The next unassigned decision slot, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Decision {
    Version(String),
    Variant(String, String),
}

/// The concretizer. Stateless apart from the injected registry; each
/// [`solve`](Self::solve) call is independent.
pub struct Solver<'a> {
    registry: &'a dyn RecipeProvider,
}

impl<'a> Solver<'a> {
    pub fn new(registry: &'a dyn RecipeProvider) -> Self {
        Self { registry }
    }

    /// Find the preferred concretization of `root`, or prove none exists.
    pub fn solve(&self, root: &PackageSpec) -> Result<DependencyGraph, SolveError> {
        debug!(spec = %root, "starting solve");

        let mut overrides: BTreeMap<&str, &PackageSpec> = BTreeMap::new();
        for dep in &root.overrides {
            overrides.insert(dep.name.as_str(), dep);
        }

        let mut state = SolveState::default();
        self.discover(&mut state, &root.name, &overrides)?;
        {
            let node = state
                .nodes
                .get_mut(&root.name)
                .unwrap_or_else(|| unreachable!("root node was just discovered"));
            add_spec_constraints(node, root, ROOT_REQUESTER);
        }

        let mut learned: HashSet<String> = HashSet::new();
        let solved = self
            .search(state, &overrides, &mut learned, 0)
            .map_err(|failure| match failure {
                SearchFailure::Fatal(err) => err,
                SearchFailure::Conflict(conflict) => SolveError::Unsatisfiable {
                    package: conflict.package,
                    constraints: conflict.constraints,
                },
            })?;

        let graph = self.build_graph(&root.name, solved)?;
        debug!(nodes = graph.len(), "solve complete");
        Ok(graph)
    }

    /// One level of the backtracking search.
    fn search(
        &self,
        mut state: SolveState,
        overrides: &BTreeMap<&str, &PackageSpec>,
        learned: &mut HashSet<String>,
        depth: usize,
    ) -> Result<SolveState, SearchFailure> {
        self.propagate(&mut state, overrides)?;

        let Some(decision) = self.next_decision(&state)? else {
            return Ok(state);
        };

        match decision {
            Decision::Version(package) => {
                self.try_candidates(
                    state,
                    overrides,
                    learned,
                    depth,
                    &package,
                    |solver, state| solver.version_candidates(state, &package),
                    |state, value| {
                        let version: Version = value;
                        trace!(package = %package, version = %version, depth, "deciding version");
                        if let Some(node) = state.nodes.get_mut(&package) {
                            node.version = Some(version);
                        }
                    },
                )
            }
            Decision::Variant(package, variant) => {
                self.try_candidates(
                    state,
                    overrides,
                    learned,
                    depth,
                    &package,
                    |solver, state| solver.variant_candidates(state, &package, &variant),
                    |state, value| {
                        trace!(package = %package, variant = %variant, value = %value, depth, "deciding variant");
                        if let Some(node) = state.nodes.get_mut(&package) {
                            node.assigned.insert(variant.clone(), value);
                        }
                    },
                )
            }
        }
    }

    /// Candidate loop shared by version and variant decisions.
    ///
    /// Implements the conflict-driven part: when a candidate's subtree fails
    /// with a conflict that does not implicate `package`, trying siblings
    /// cannot help, so the conflict propagates upward immediately (backjump).
    fn try_candidates<V, FC, FA>(
        &self,
        state: SolveState,
        overrides: &BTreeMap<&str, &PackageSpec>,
        learned: &mut HashSet<String>,
        depth: usize,
        package: &str,
        candidates_fn: FC,
        assign_fn: FA,
    ) -> Result<SolveState, SearchFailure>
    where
        V: std::fmt::Display + Clone,
        FC: Fn(&Self, &SolveState) -> Result<Vec<V>, SearchFailure>,
        FA: Fn(&mut SolveState, V),
    {
        let candidates = candidates_fn(self, &state)?;
        let fingerprint = state.nodes[package].constraint_fingerprint();

        if candidates.is_empty() {
            return Err(SearchFailure::Conflict(state.conflict_for(package)));
        }

        let mut last_conflict: Option<Conflict> = None;
        for candidate in candidates {
            let signature = format!("{package}#{candidate}#{fingerprint}");
            if learned.contains(&signature) {
                trace!(package, candidate = %candidate, "skipping learned failure");
                continue;
            }

            let mut child = state.clone();
            assign_fn(&mut child, candidate.clone());

            match self.search(child, overrides, learned, depth + 1) {
                Ok(solved) => return Ok(solved),
                Err(SearchFailure::Fatal(err)) => return Err(SearchFailure::Fatal(err)),
                Err(SearchFailure::Conflict(conflict)) => {
                    if !conflict.involves.contains(package) {
                        // This decision cannot change the outcome; backjump.
                        trace!(
                            package,
                            conflicted = %conflict.package,
                            "backjumping past uninvolved decision"
                        );
                        return Err(SearchFailure::Conflict(conflict));
                    }
                    // Local failure: remember the combination and try the
                    // next candidate. Only conflicts depending on nothing but
                    // this package's own constraint store (which the
                    // signature captures) are safe to learn globally.
                    if conflict
                        .involves
                        .iter()
                        .all(|p| p.as_str() == package || p == ROOT_REQUESTER)
                    {
                        learned.insert(signature);
                    }
                    last_conflict = Some(conflict);
                }
            }
        }

        Err(SearchFailure::Conflict(
            last_conflict.unwrap_or_else(|| state.conflict_for(package)),
        ))
    }

    /// Apply every decidable dependency rule until fixpoint, then check the
    /// partial assignment for consistency.
    fn propagate(
        &self,
        state: &mut SolveState,
        overrides: &BTreeMap<&str, &PackageSpec>,
    ) -> Result<(), SearchFailure> {
        loop {
            let mut changed = false;

            // Iterate in discovery order so newly found packages queue up
            // behind their discoverers (breadth-first growth).
            let mut index = 0;
            while index < state.order.len() {
                let owner = state.order[index].clone();
                index += 1;

                let recipe = self
                    .registry
                    .lookup(&owner)
                    .map_err(SearchFailure::Fatal)?;

                for (rule_index, rule) in recipe.dependencies.iter().enumerate() {
                    let key = (owner.clone(), rule_index);
                    if state.applied.contains(&key) {
                        continue;
                    }
                    let guard = {
                        let node = &state.nodes[&owner];
                        rule.when.eval(node)
                    };
                    match guard {
                        None | Some(false) => continue,
                        Some(true) => {}
                    }

                    let target = rule.spec.name.clone();
                    trace!(owner = %owner, target = %target, "dependency rule fires");

                    if !state.nodes.contains_key(&target) {
                        self.discover(state, &target, overrides)
                            .map_err(SearchFailure::Fatal)?;
                    }

                    // Closing this edge must not create a path back to the
                    // owner.
                    if state.reaches(&target, &owner) {
                        return Err(SearchFailure::Fatal(SolveError::CyclicDependency(
                            format!("'{owner}' -> '{target}' closes a dependency cycle"),
                        )));
                    }

                    let entry = state.edges.entry(owner.clone()).or_default();
                    match entry.iter_mut().find(|(t, _)| *t == target) {
                        Some((_, kinds)) => {
                            for kind in &rule.kinds {
                                if !kinds.contains(kind) {
                                    kinds.push(*kind);
                                }
                            }
                            kinds.sort();
                        }
                        None => entry.push((target.clone(), rule.kinds.clone())),
                    }

                    if let Some(node) = state.nodes.get_mut(&target) {
                        add_spec_constraints(node, &rule.spec, &owner);
                    }
                    state.applied.insert(key);
                    changed = true;
                }
            }

            self.check_consistency(state)?;

            if !changed {
                return Ok(());
            }
        }
    }

    /// Verify every node's assignment against its accumulated constraints.
    fn check_consistency(&self, state: &SolveState) -> Result<(), SearchFailure> {
        for node in state.nodes.values() {
            let recipe = self
                .registry
                .lookup(&node.name)
                .map_err(SearchFailure::Fatal)?;

            // Unknown variant references are a spec error, not a dead end.
            for req in &node.variant_reqs {
                if recipe.variant(&req.variant).is_none() {
                    return Err(SearchFailure::Fatal(SolveError::UnknownVariant {
                        package: node.name.clone(),
                        variant: req.variant.clone(),
                    }));
                }
            }

            let conflict =
                |node: &PartialNode| SearchFailure::Conflict(state.conflict_for(&node.name));

            match &node.version {
                Some(version) => {
                    if node
                        .versions
                        .iter()
                        .any(|req| !req.constraint.allows(version))
                    {
                        return Err(conflict(node));
                    }
                }
                None => {
                    // Early dead-end detection: some declared version must
                    // still satisfy the store.
                    let feasible = recipe.versions.iter().any(|v| {
                        node.versions.iter().all(|req| req.constraint.allows(v))
                    });
                    if !feasible {
                        return Err(conflict(node));
                    }
                }
            }

            for req in &node.variant_reqs {
                if let Some(assigned) = node.assigned.get(&req.variant) {
                    if !req.value.satisfied_by(assigned) {
                        return Err(conflict(node));
                    }
                }
            }
        }
        Ok(())
    }

    /// First unassigned decision slot in canonical order, if any.
    fn next_decision(&self, state: &SolveState) -> Result<Option<Decision>, SearchFailure> {
        for name in &state.order {
            let node = &state.nodes[name];
            if node.version.is_none() {
                return Ok(Some(Decision::Version(name.clone())));
            }
            let recipe = self.registry.lookup(name).map_err(SearchFailure::Fatal)?;
            for variant in &recipe.variants {
                if !node.assigned.contains_key(&variant.name) {
                    return Ok(Some(Decision::Variant(
                        name.clone(),
                        variant.name.clone(),
                    )));
                }
            }
        }
        Ok(None)
    }

    /// Declared versions satisfying the constraint store, highest first.
    fn version_candidates(
        &self,
        state: &SolveState,
        package: &str,
    ) -> Result<Vec<Version>, SearchFailure> {
        let recipe = self
            .registry
            .lookup(package)
            .map_err(SearchFailure::Fatal)?;
        let node = &state.nodes[package];
        Ok(recipe
            .versions_desc()
            .into_iter()
            .filter(|&v| node.versions.iter().all(|req| req.constraint.allows(v)))
            .cloned()
            .collect())
    }

    /// Legal values for one variant: default-first preference order filtered
    /// by the constraint store.
    fn variant_candidates(
        &self,
        state: &SolveState,
        package: &str,
        variant: &str,
    ) -> Result<Vec<VariantValue>, SearchFailure> {
        let recipe = self
            .registry
            .lookup(package)
            .map_err(SearchFailure::Fatal)?;
        let Some(definition) = recipe.variant(variant) else {
            return Err(SearchFailure::Fatal(SolveError::UnknownVariant {
                package: package.to_string(),
                variant: variant.to_string(),
            }));
        };
        let node = &state.nodes[package];
        Ok(definition
            .candidates()
            .into_iter()
            .filter(|candidate| {
                node.variant_reqs
                    .iter()
                    .filter(|req| req.variant == variant)
                    .all(|req| req.value.satisfied_by(candidate))
            })
            .collect())
    }

    /// Add a new package to the partial graph, applying any root override
    /// constraints for it.
    fn discover(
        &self,
        state: &mut SolveState,
        name: &str,
        overrides: &BTreeMap<&str, &PackageSpec>,
    ) -> Result<(), SolveError> {
        // Fail here, before any decision, if the recipe does not exist.
        self.registry.lookup(name)?;

        let mut node = PartialNode::new(name);
        if let Some(spec) = overrides.get(name) {
            add_spec_constraints(&mut node, spec, ROOT_REQUESTER);
        }
        trace!(package = %name, position = state.order.len(), "discovered package");
        state.nodes.insert(name.to_string(), node);
        state.order.push(name.to_string());
        Ok(())
    }

    /// Turn the completed search state into the immutable graph.
    fn build_graph(
        &self,
        root: &str,
        state: SolveState,
    ) -> Result<DependencyGraph, SolveError> {
        let mut builder = GraphBuilder::new(root);

        for (name, node) in &state.nodes {
            let recipe = self.registry.lookup(name)?;
            let version = node.version.clone().ok_or_else(|| {
                SolveError::InvalidRecipe {
                    package: name.clone(),
                    reason: "search finished with unassigned version".to_string(),
                }
            })?;

            let mut edges: Vec<DependencyEdge> = state
                .edges
                .get(name)
                .map(|targets| {
                    targets
                        .iter()
                        .map(|(target, kinds)| DependencyEdge {
                            target: target.clone(),
                            kinds: kinds.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            edges.sort_by(|a, b| a.target.cmp(&b.target));

            builder.add_node(ConcreteNode {
                name: name.clone(),
                version,
                variants: node.assigned.clone(),
                build_system: recipe.build_system.clone(),
                parallel: recipe.parallel,
                exports: recipe.exports.clone(),
                commands: recipe.commands.clone(),
                edges,
            });
        }

        builder.finalize()
    }
}

/// Fold the constraint parts of `spec` into a node's constraint store.
fn add_spec_constraints(node: &mut PartialNode, spec: &PackageSpec, requester: &str) {
    if !spec.version.is_any() {
        node.versions.push(VersionRequirement {
            requester: requester.to_string(),
            constraint: spec.version.clone(),
        });
    }
    for (variant, value) in &spec.variants {
        node.variant_reqs.push(VariantRequirement {
            requester: requester.to_string(),
            variant: variant.clone(),
            value: value.clone(),
        });
    }
}
