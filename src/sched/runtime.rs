// src/sched/runtime.rs

//! Async shell around [`BuildPlan`].
//!
//! The runtime owns the event loop for one run: it hands dispatchable nodes
//! to a [`DriverBackend`], consumes completion events from a single mpsc
//! stream, and feeds them back into the pure plan until every node reached a
//! terminal state. Cancellation arrives on the same stream (a Ctrl-C handler
//! or a test sends [`BuildEvent::CancelRequested`]); nothing new starts and
//! the backend is asked to terminate in-flight builds best-effort, with each
//! of them still reporting a completion event.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::exec::DriverBackend;
use crate::sched::plan::{BuildPlan, PlanOptions};
use crate::sched::report::{BuildReport, NodeRecord};
use crate::solve::DependencyGraph;

/// Events sent into the runtime by backends and signal handlers.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    TaskCompleted {
        package: String,
        success: bool,
        duration: Duration,
        log: Option<PathBuf>,
    },
    CancelRequested,
}

/// Event-loop driver for one build run.
pub struct Runtime {
    plan: BuildPlan,
    graph: Arc<DependencyGraph>,
    backend: Arc<dyn DriverBackend>,
    events_rx: mpsc::Receiver<BuildEvent>,
    records: BTreeMap<String, NodeRecord>,
}

impl Runtime {
    pub fn new(
        graph: Arc<DependencyGraph>,
        options: PlanOptions,
        backend: Arc<dyn DriverBackend>,
        events_rx: mpsc::Receiver<BuildEvent>,
    ) -> Self {
        Self {
            plan: BuildPlan::new(graph.clone(), options),
            graph,
            backend,
            events_rx,
            records: BTreeMap::new(),
        }
    }

    /// Run the plan to completion and return the final report.
    pub async fn run(mut self) -> Result<BuildReport> {
        info!(packages = self.graph.len(), root = %self.graph.root_name(), "build runtime started");
        self.dispatch_ready();

        while !self.plan.is_complete() {
            let Some(event) = self.events_rx.recv().await else {
                bail!("event channel closed before the build completed");
            };
            debug!(?event, "runtime received event");

            match event {
                BuildEvent::TaskCompleted {
                    package,
                    success,
                    duration,
                    log,
                } => {
                    self.records
                        .insert(package.clone(), NodeRecord { duration, log });
                    self.plan.record_outcome(&package, success);
                }
                BuildEvent::CancelRequested => {
                    warn!("cancellation requested; terminating in-flight builds");
                    self.plan.cancel();
                    self.backend.cancel_in_flight();
                }
            }

            self.dispatch_ready();
        }

        self.plan.skip_remaining();
        let report = BuildReport::from_plan(&self.plan, &self.records);
        info!(status = %report.status, "build runtime finished");
        Ok(report)
    }

    fn dispatch_ready(&mut self) {
        for package in self.plan.take_dispatchable() {
            self.backend.dispatch(self.graph.clone(), package);
        }
    }
}
