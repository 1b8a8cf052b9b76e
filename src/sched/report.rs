// src/sched/report.rs

//! End-of-run summary.
//!
//! The runtime folds the final plan states plus the per-node execution
//! records into a [`BuildReport`]; the binary prints its `Display` form and
//! derives the process exit code from [`BuildReport::status`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::sched::plan::{BuildPlan, BuildState, RunStatus};

/// What the executor measured for one node that actually ran.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub duration: Duration,
    pub log: Option<PathBuf>,
}

/// Final state of one node, in dependency order.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub name: String,
    pub label: String,
    pub state: BuildState,
    pub duration: Option<Duration>,
    pub log: Option<PathBuf>,
}

/// Terminal summary of a whole run: one entry per graph node plus the
/// overall status.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub status: RunStatus,
    pub entries: Vec<ReportEntry>,
}

impl BuildReport {
    /// Assemble the report from a wound-down plan.
    ///
    /// Entries come out in dependency order so a reader scans the report the
    /// same way the run proceeded.
    pub fn from_plan(plan: &BuildPlan, records: &BTreeMap<String, NodeRecord>) -> Self {
        let mut entries = Vec::with_capacity(plan.graph().len());
        for node in plan.graph().topo_iter() {
            let state = plan
                .state_of(&node.name)
                .unwrap_or(BuildState::Skipped);
            let record = records.get(&node.name);
            entries.push(ReportEntry {
                name: node.name.clone(),
                label: node.label(),
                state,
                duration: record.map(|r| r.duration),
                log: record.and_then(|r| r.log.clone()),
            });
        }
        Self {
            status: plan.overall_status(),
            entries,
        }
    }

    pub fn entry(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "build {} ({} packages)", self.status, self.entries.len())?;
        let width = self
            .entries
            .iter()
            .map(|e| e.label.len())
            .max()
            .unwrap_or(0);
        for entry in &self.entries {
            write!(f, "  {:<width$}  {:<9}", entry.label, entry.state.to_string())?;
            if let Some(duration) = entry.duration {
                write!(f, "  {:>7.1}s", duration.as_secs_f64())?;
            }
            if let Some(log) = &entry.log {
                write!(f, "  {}", log.display())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
