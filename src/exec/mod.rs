// src/exec/mod.rs

//! Build execution layer.
//!
//! - [`driver`] maps build-system families to stage commands and runs them
//!   under `sh -c`.
//! - [`executor`] builds one node end to end (scratch dir, composed
//!   environment, staged commands, log capture).
//! - [`backend`] is the dispatch seam the scheduler runtime drives; the
//!   production implementation spawns one Tokio task per node.

pub mod backend;
pub mod driver;
pub mod executor;

pub use backend::{DriverBackend, ProcessBackend};
pub use driver::{BuildSystemDriver, DriverRegistry, ShellDriver, StageContext};
pub use executor::BuildExecutor;
