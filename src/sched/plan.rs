// src/sched/plan.rs

//! Pure build-plan state machine.
//!
//! [`BuildPlan`] owns the per-node state of one run over a finalized
//! [`DependencyGraph`]. It has no channels, no Tokio types, and performs no
//! IO, so the scheduling semantics are unit-testable in isolation; the async
//! shell in [`runtime`](crate::sched::runtime) drives it.
//!
//! Per-node state machine:
//!
//! ```text
//! Pending -> Ready -> Running -> Succeeded
//!       \                   \-> Failed
//!        \-> Skipped  (an upstream failure, or never dispatched)
//! ```
//!
//! A node is Ready once every build/link dependency has Succeeded (run-type
//! edges do not gate dispatch). A Failed node marks every transitive
//! dependent Skipped. A node whose recipe declares `parallel = false` takes
//! an exclusive slot: it only starts while nothing else runs, and nothing
//! else starts until it finishes.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::registry::DepKind;
use crate::solve::DependencyGraph;

/// Runtime state of one node in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl BuildState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildState::Succeeded | BuildState::Failed | BuildState::Skipped
        )
    }
}

impl std::fmt::Display for BuildState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildState::Pending => "pending",
            BuildState::Ready => "ready",
            BuildState::Running => "running",
            BuildState::Succeeded => "succeeded",
            BuildState::Failed => "failed",
            BuildState::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// Terminal status of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Knobs that influence dispatch behaviour.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Upper bound on concurrently Running nodes. Clamped to at least 1.
    pub max_jobs: usize,
    /// Stop dispatching new nodes after the first failure instead of letting
    /// independent branches finish.
    pub fail_fast: bool,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            max_jobs: 1,
            fail_fast: false,
        }
    }
}

/// Mutable scheduling state for one run.
pub struct BuildPlan {
    graph: Arc<DependencyGraph>,
    states: BTreeMap<String, BuildState>,
    options: PlanOptions,
    running: usize,
    /// True while a `parallel = false` node is Running.
    exclusive_active: bool,
    cancelled: bool,
    any_failed: bool,
}

impl BuildPlan {
    pub fn new(graph: Arc<DependencyGraph>, options: PlanOptions) -> Self {
        let mut states: BTreeMap<String, BuildState> = graph
            .nodes()
            .map(|n| (n.name.clone(), BuildState::Pending))
            .collect();

        // Nodes with no gating dependencies start Ready.
        for node in graph.nodes() {
            if gating_deps(&graph, &node.name).is_empty() {
                states.insert(node.name.clone(), BuildState::Ready);
            }
        }

        let max_jobs = options.max_jobs.max(1);
        Self {
            graph,
            states,
            options: PlanOptions {
                max_jobs,
                ..options
            },
            running: 0,
            exclusive_active: false,
            cancelled: false,
            any_failed: false,
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn state_of(&self, name: &str) -> Option<BuildState> {
        self.states.get(name).copied()
    }

    /// Per-node states in name order (for reporting).
    pub fn states(&self) -> impl Iterator<Item = (&str, BuildState)> {
        self.states.iter().map(|(name, state)| (name.as_str(), *state))
    }

    /// Stop dispatching new work. Already-Running nodes are left to finish
    /// (or be killed by the IO shell); Succeeded nodes are never rolled back.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            debug!("build plan cancelled; no new nodes will start");
            self.cancelled = true;
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Select the next nodes to start and mark them Running.
    ///
    /// Work-conserving up to `max_jobs`, name-order deterministic, and
    /// honours the exclusive slot: a non-parallel node starts only when
    /// nothing else runs, and while it runs nothing else starts.
    pub fn take_dispatchable(&mut self) -> Vec<String> {
        if self.cancelled || self.exclusive_active {
            return Vec::new();
        }
        if self.options.fail_fast && self.any_failed {
            return Vec::new();
        }

        let ready: Vec<String> = self
            .states
            .iter()
            .filter(|(_, state)| **state == BuildState::Ready)
            .map(|(name, _)| name.clone())
            .collect();

        let mut dispatched = Vec::new();
        for name in ready {
            if self.running >= self.options.max_jobs {
                break;
            }
            let parallel = self
                .graph
                .node(&name)
                .map(|n| n.parallel)
                .unwrap_or(true);

            if !parallel {
                // Exclusive node: needs an otherwise empty machine.
                if self.running > 0 {
                    continue;
                }
                self.exclusive_active = true;
                self.mark_running(&name);
                dispatched.push(name);
                break;
            }

            self.mark_running(&name);
            dispatched.push(name);
        }
        dispatched
    }

    /// Record an executor outcome and update downstream states.
    pub fn record_outcome(&mut self, name: &str, success: bool) {
        match self.states.get(name) {
            Some(BuildState::Running) => {}
            other => {
                warn!(package = %name, state = ?other, "outcome for node that is not Running; ignoring");
                return;
            }
        }

        self.running = self.running.saturating_sub(1);
        let parallel = self.graph.node(name).map(|n| n.parallel).unwrap_or(true);
        if !parallel {
            self.exclusive_active = false;
        }

        if success {
            self.states.insert(name.to_string(), BuildState::Succeeded);
            debug!(package = %name, "node succeeded");
            self.promote_dependents(name);
        } else {
            self.states.insert(name.to_string(), BuildState::Failed);
            self.any_failed = true;
            warn!(package = %name, "node failed; skipping transitive dependents");
            self.skip_dependents(name);
        }
    }

    /// True when no node is Running and no further dispatch can happen.
    pub fn is_complete(&self) -> bool {
        if self.running > 0 {
            return false;
        }
        if self.cancelled || (self.options.fail_fast && self.any_failed) {
            return true;
        }
        self.states
            .values()
            .all(|state| !matches!(state, BuildState::Pending | BuildState::Ready))
    }

    /// Convert any node that never got to run into Skipped.
    ///
    /// Called by the shell once the run winds down (cancellation or
    /// fail-fast leave Pending/Ready nodes behind).
    pub fn skip_remaining(&mut self) {
        for state in self.states.values_mut() {
            if matches!(state, BuildState::Pending | BuildState::Ready) {
                *state = BuildState::Skipped;
            }
        }
    }

    /// Overall terminal status, valid once [`is_complete`](Self::is_complete).
    pub fn overall_status(&self) -> RunStatus {
        if self.cancelled {
            return RunStatus::Cancelled;
        }
        let root_ok = self
            .state_of(self.graph.root_name())
            .is_some_and(|s| s == BuildState::Succeeded);
        if root_ok && !self.any_failed {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        }
    }

    fn mark_running(&mut self, name: &str) {
        debug!(package = %name, "dispatching node");
        self.states.insert(name.to_string(), BuildState::Running);
        self.running += 1;
    }

    /// Move Pending consumers whose gating deps all Succeeded to Ready.
    fn promote_dependents(&mut self, name: &str) {
        for consumer in self.graph.consumers_of(name).to_vec() {
            if self.states.get(&consumer) != Some(&BuildState::Pending) {
                continue;
            }
            let satisfied = gating_deps(&self.graph, &consumer)
                .iter()
                .all(|dep| self.states.get(dep) == Some(&BuildState::Succeeded));
            if satisfied {
                debug!(package = %consumer, "dependencies satisfied; node is ready");
                self.states.insert(consumer, BuildState::Ready);
            }
        }
    }

    /// Mark every transitive dependent (over edges of any kind) Skipped,
    /// unless it already reached a terminal or Running state.
    fn skip_dependents(&mut self, name: &str) {
        let mut stack: Vec<String> = self.graph.consumers_of(name).to_vec();
        while let Some(current) = stack.pop() {
            match self.states.get(&current) {
                Some(BuildState::Pending) | Some(BuildState::Ready) => {
                    debug!(package = %current, "skipped due to upstream failure");
                    self.states.insert(current.clone(), BuildState::Skipped);
                    stack.extend(self.graph.consumers_of(&current).to_vec());
                }
                _ => {}
            }
        }
    }
}

/// Dependency names that gate dispatch of `name`: build and link edges.
fn gating_deps(graph: &DependencyGraph, name: &str) -> Vec<String> {
    let Some(node) = graph.node(name) else {
        return Vec::new();
    };
    let mut deps: Vec<String> = node
        .edges
        .iter()
        .filter(|e| e.has_kind(DepKind::Build) || e.has_kind(DepKind::Link))
        .map(|e| e.target.clone())
        .collect();
    deps.sort();
    deps.dedup();
    deps
}
