// src/sched/mod.rs

//! Build scheduling.
//!
//! Split into a pure core and an IO shell:
//! - [`plan`] is the synchronous state machine (readiness, slots, skips,
//!   cancellation) with no async or process types in it.
//! - [`runtime`] drives the plan from an mpsc event stream and a
//!   [`DriverBackend`](crate::exec::DriverBackend).
//! - [`report`] renders the terminal summary.

pub mod plan;
pub mod report;
pub mod runtime;

pub use plan::{BuildPlan, BuildState, PlanOptions, RunStatus};
pub use report::{BuildReport, NodeRecord, ReportEntry};
pub use runtime::{BuildEvent, Runtime};
