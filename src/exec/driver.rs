// src/exec/driver.rs

//! Build-system drivers.
//!
//! A [`BuildSystemDriver`] knows how to run the configure/build/install
//! stages for one build-system family. Each driver resolves a shell command
//! per stage (recipe override first, family default second) and runs it
//! through a shared `sh -c` stage runner that captures combined
//! stdout/stderr into the node's log file.
//!
//! The `{prefix}` placeholder in stage commands expands to the node's
//! install prefix.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use crate::env::BuildEnv;
use crate::errors::{BuildError, BuildStage};
use crate::solve::ConcreteNode;

/// Everything a driver needs to run one stage of one node.
pub struct StageContext<'a> {
    pub node: &'a ConcreteNode,
    /// Scratch directory the stage runs in.
    pub build_dir: &'a Path,
    /// Install prefix the node's artifacts land in.
    pub prefix: &'a Path,
    /// Composed environment from the node's dependency closure.
    pub env: &'a BuildEnv,
    /// Combined stdout/stderr log for the whole node.
    pub log: &'a Path,
}

/// One build-system family (autotools, cmake, ...).
pub trait BuildSystemDriver: Send + Sync {
    /// Identifier recipes select the driver by.
    fn id(&self) -> &str;

    /// Run one stage to completion. A stage with no command for this family
    /// resolves immediately.
    fn run_stage<'a>(
        &'a self,
        stage: BuildStage,
        ctx: StageContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BuildError>> + Send + 'a>>;
}

impl std::fmt::Debug for dyn BuildSystemDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildSystemDriver")
            .field("id", &self.id())
            .finish()
    }
}

/// Stage-command templates for one family.
///
/// All the stock drivers share this shape; they differ only in their default
/// commands. Recipe-level `commands.*` overrides always win.
pub struct ShellDriver {
    id: &'static str,
    configure: Option<&'static str>,
    build: Option<&'static str>,
    install: Option<&'static str>,
}

impl ShellDriver {
    fn stage_command(&self, node: &ConcreteNode, stage: BuildStage) -> Option<String> {
        let (override_cmd, default_cmd) = match stage {
            BuildStage::Configure => (&node.commands.configure, self.configure),
            BuildStage::Build => (&node.commands.build, self.build),
            BuildStage::Install => (&node.commands.install, self.install),
        };
        override_cmd
            .clone()
            .or_else(|| default_cmd.map(str::to_string))
    }
}

impl BuildSystemDriver for ShellDriver {
    fn id(&self) -> &str {
        self.id
    }

    fn run_stage<'a>(
        &'a self,
        stage: BuildStage,
        ctx: StageContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<(), BuildError>> + Send + 'a>> {
        Box::pin(async move {
            let Some(template) = self.stage_command(ctx.node, stage) else {
                debug!(package = %ctx.node.name, %stage, "no command for stage; skipping");
                return Ok(());
            };
            let command = template.replace("{prefix}", &ctx.prefix.to_string_lossy());
            run_shell_stage(stage, &command, &ctx).await
        })
    }
}

/// Run one stage command under `sh -c` with the composed environment.
///
/// stdout and stderr are appended to the node log so a failing stage leaves
/// a complete transcript behind. A non-zero exit maps to
/// [`BuildError::Driver`] carrying the stage, exit code and log path.
async fn run_shell_stage(
    stage: BuildStage,
    command: &str,
    ctx: &StageContext<'_>,
) -> Result<(), BuildError> {
    info!(package = %ctx.node.name, %stage, cmd = %command, "running stage");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(ctx.log)?;
    let stderr_file = log_file.try_clone()?;

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(command)
        .current_dir(ctx.build_dir)
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::from(stderr_file))
        .kill_on_drop(true);
    for (key, value) in ctx.env {
        cmd.env(key, value);
    }

    let status = cmd.status().await?;
    if status.success() {
        debug!(package = %ctx.node.name, %stage, "stage finished");
        Ok(())
    } else {
        Err(BuildError::Driver {
            stage,
            exit_code: status.code().unwrap_or(-1),
            log: ctx.log.to_path_buf(),
        })
    }
}

/// Lookup table from build-system id to driver.
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn BuildSystemDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: BTreeMap::new(),
        }
    }

    /// Registry with the stock shell-based families registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ShellDriver {
            id: "script",
            configure: None,
            build: None,
            install: None,
        }));
        registry.register(Arc::new(ShellDriver {
            id: "autotools",
            configure: Some("./configure --prefix={prefix}"),
            build: Some("make"),
            install: Some("make install"),
        }));
        registry.register(Arc::new(ShellDriver {
            id: "cmake",
            configure: Some("cmake -S . -B . -DCMAKE_INSTALL_PREFIX={prefix}"),
            build: Some("cmake --build ."),
            install: Some("cmake --install ."),
        }));
        registry.register(Arc::new(ShellDriver {
            id: "makefile",
            configure: None,
            build: Some("make"),
            install: Some("make install PREFIX={prefix}"),
        }));
        registry
    }

    pub fn register(&mut self, driver: Arc<dyn BuildSystemDriver>) {
        self.drivers.insert(driver.id().to_string(), driver);
    }

    pub fn lookup(&self, id: &str) -> Result<Arc<dyn BuildSystemDriver>, BuildError> {
        self.drivers
            .get(id)
            .cloned()
            .ok_or_else(|| BuildError::UnknownBuildSystem(id.to_string()))
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StageCommands;
    use crate::spec::Version;

    fn node_with_commands(build_system: &str, commands: StageCommands) -> ConcreteNode {
        ConcreteNode {
            name: "pkg".to_string(),
            version: "1.0".parse::<Version>().unwrap(),
            variants: BTreeMap::new(),
            build_system: build_system.to_string(),
            parallel: true,
            exports: BTreeMap::new(),
            commands,
            edges: Vec::new(),
        }
    }

    #[test]
    fn recipe_commands_override_family_defaults() {
        let registry = DriverRegistry::with_defaults();
        assert!(registry.lookup("autotools").is_ok());

        let driver = ShellDriver {
            id: "autotools",
            configure: Some("./configure --prefix={prefix}"),
            build: Some("make"),
            install: Some("make install"),
        };
        let node = node_with_commands(
            "autotools",
            StageCommands {
                configure: None,
                build: Some("make -C src".to_string()),
                install: None,
            },
        );
        assert_eq!(
            driver.stage_command(&node, BuildStage::Build).as_deref(),
            Some("make -C src")
        );
        assert_eq!(
            driver.stage_command(&node, BuildStage::Install).as_deref(),
            Some("make install")
        );
    }

    #[test]
    fn script_family_has_no_default_commands() {
        let driver = ShellDriver {
            id: "script",
            configure: None,
            build: None,
            install: None,
        };
        let node = node_with_commands("script", StageCommands::default());
        assert_eq!(driver.stage_command(&node, BuildStage::Configure), None);
        assert_eq!(driver.stage_command(&node, BuildStage::Build), None);
        assert_eq!(driver.stage_command(&node, BuildStage::Install), None);
    }

    #[test]
    fn unknown_build_system_is_reported() {
        let registry = DriverRegistry::with_defaults();
        let err = registry.lookup("bazel").unwrap_err();
        assert!(matches!(err, BuildError::UnknownBuildSystem(id) if id == "bazel"));
    }
}
