// src/exec/executor.rs

//! Runs one node end to end: scratch dir, composed environment, stages.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info};

use crate::env::{self, Layout};
use crate::errors::{BuildError, BuildStage};
use crate::exec::driver::{DriverRegistry, StageContext};
use crate::solve::DependencyGraph;

/// Builds single nodes against a shared install layout.
///
/// One executor is shared by every in-flight build; it holds no per-node
/// state.
pub struct BuildExecutor {
    drivers: DriverRegistry,
    layout: Layout,
    log_dir: PathBuf,
}

impl BuildExecutor {
    pub fn new(drivers: DriverRegistry, layout: Layout, log_dir: PathBuf) -> Self {
        Self {
            drivers,
            layout,
            log_dir,
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Build one node: configure, build, install, in that order.
    ///
    /// The node gets a fresh scratch directory that is removed when this
    /// function returns, success or failure. On success the install prefix
    /// and the log file outlive the call; on failure the half-populated
    /// prefix is removed and only the log remains. Returns the log path so
    /// the caller can reference it in the report.
    pub async fn build_node(
        &self,
        graph: Arc<DependencyGraph>,
        name: &str,
    ) -> Result<PathBuf, BuildError> {
        let node = graph.node(name).ok_or_else(|| {
            BuildError::Io(std::io::Error::other(format!(
                "package '{name}' missing from solved graph"
            )))
        })?;

        let driver = self.drivers.lookup(&node.build_system)?;
        let build_env = env::compose(&graph, name, &self.layout);
        let prefix = self.layout.prefix(node);

        std::fs::create_dir_all(&self.log_dir)?;
        std::fs::create_dir_all(&prefix)?;
        let log = self.log_dir.join(format!("{}.log", node.label()));

        // Scratch space; dropped (and deleted) on every exit path.
        let build_dir = TempDir::with_prefix(format!("pkgplan-{}-", node.name))?;
        info!(
            package = %node.name,
            build_system = %node.build_system,
            build_dir = %build_dir.path().display(),
            "starting build"
        );

        for stage in [BuildStage::Configure, BuildStage::Build, BuildStage::Install] {
            let ctx = StageContext {
                node,
                build_dir: build_dir.path(),
                prefix: &prefix,
                env: &build_env,
                log: &log,
            };
            if let Err(err) = driver.run_stage(stage, ctx).await {
                // A half-populated prefix must not look installed.
                let _ = std::fs::remove_dir_all(&prefix);
                return Err(err);
            }
        }

        debug!(package = %node.name, log = %log.display(), "build finished");
        Ok(log)
    }
}
