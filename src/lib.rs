// src/lib.rs

pub mod cli;
pub mod env;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod registry;
pub mod sched;
pub mod solve;
pub mod spec;

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::CliArgs;
use crate::env::Layout;
use crate::exec::{BuildExecutor, DriverRegistry, ProcessBackend};
use crate::registry::TomlRegistry;
use crate::sched::{BuildEvent, PlanOptions, RunStatus, Runtime};
use crate::solve::{DependencyGraph, Solver};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - recipe registry loading
/// - spec parsing and concretization
/// - executor / backend / runtime
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let registry = TomlRegistry::load_dir(&args.recipes)?;
    let root_spec = spec::parse_spec(&args.spec)?;

    let solver = Solver::new(&registry);
    let graph = Arc::new(solver.solve(&root_spec)?);
    info!(packages = graph.len(), root = %graph.root_name(), "spec concretized");

    if args.dry_run {
        print_dry_run(&graph);
        return Ok(());
    }

    let jobs = args.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    });

    let layout = Layout::new(&args.install_root);
    let log_dir = args.install_root.join("log");
    let executor = Arc::new(BuildExecutor::new(
        DriverRegistry::with_defaults(),
        layout,
        log_dir,
    ));

    let (events_tx, events_rx) = mpsc::channel::<BuildEvent>(64);
    let backend = Arc::new(ProcessBackend::new(executor, events_tx.clone()));

    // Ctrl-C stops dispatching and terminates in-flight builds best-effort.
    {
        let tx = events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(BuildEvent::CancelRequested).await;
        });
    }

    let options = PlanOptions {
        max_jobs: jobs,
        fail_fast: args.fail_fast,
    };
    let runtime = Runtime::new(graph, options, backend, events_rx);
    let report = runtime.run().await?;

    print!("{report}");
    match report.status {
        RunStatus::Succeeded => Ok(()),
        RunStatus::Failed => bail!("build failed"),
        RunStatus::Cancelled => bail!("build cancelled"),
    }
}

/// Dry-run output: the concretized graph in dependency order, with the
/// typed edges of each package.
fn print_dry_run(graph: &DependencyGraph) {
    println!(
        "concretized {} packages (root: {})",
        graph.len(),
        graph.root_name()
    );
    for node in graph.topo_iter() {
        println!("  {node}");
        for edge in &node.edges {
            let kinds: Vec<&str> = edge.kinds.iter().map(|k| k.as_str()).collect();
            println!("      -> {} [{}]", edge.target, kinds.join(","));
        }
    }
}
