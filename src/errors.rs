// src/errors.rs

//! Crate-wide error types.
//!
//! Two families, matching the two phases of a run:
//! - [`SolveError`]: raised while parsing specs or concretizing; always
//!   surfaced before any build starts and never retryable.
//! - [`BuildError`]: raised per node while executing builds; a driver failure
//!   marks the node `Failed` and skips its dependents, it does not abort the
//!   whole process.

use std::path::PathBuf;

use thiserror::Error;

/// Build stage in which a driver failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Configure,
    Build,
    Install,
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildStage::Configure => write!(f, "configure"),
            BuildStage::Build => write!(f, "build"),
            BuildStage::Install => write!(f, "install"),
        }
    }
}

/// Errors raised while parsing a spec or concretizing it against a registry.
#[derive(Error, Debug)]
pub enum SolveError {
    #[error("malformed spec: {0}")]
    MalformedSpec(String),

    #[error("package '{package}' declares no variant '{variant}'")]
    UnknownVariant { package: String, variant: String },

    #[error("no recipe found for package '{0}'")]
    RecipeNotFound(String),

    #[error("unsatisfiable constraints on '{package}': {}", constraints.join("; "))]
    Unsatisfiable {
        package: String,
        /// Conflicting constraint set, each entry tagged with its requester.
        constraints: Vec<String>,
    },

    #[error("dependency cycle: {0}")]
    CyclicDependency(String),

    #[error("invalid recipe '{package}': {reason}")]
    InvalidRecipe { package: String, reason: String },
}

/// Errors raised while executing the build plan.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("driver failed at {stage} with exit code {exit_code} (log: {})", log.display())]
    Driver {
        stage: BuildStage,
        exit_code: i32,
        log: PathBuf,
    },

    #[error("no driver registered for build system '{0}'")]
    UnknownBuildSystem(String),

    #[error("build cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// Log file reference, when the failure produced one.
    pub fn log_ref(&self) -> Option<&PathBuf> {
        match self {
            BuildError::Driver { log, .. } => Some(log),
            _ => None,
        }
    }
}
