// tests/executor_stages.rs

//! End-to-end executor tests running real `sh` processes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use pkgplan::env::Layout;
use pkgplan::errors::{BuildError, BuildStage};
use pkgplan::exec::{BuildExecutor, DriverBackend, DriverRegistry, ProcessBackend};
use pkgplan::sched::{BuildEvent, BuildState, PlanOptions, RunStatus, Runtime};
use pkgplan::solve::Solver;
use pkgplan::spec::parse_spec;
use pkgplan_test_utils::builders::{RecipeBuilder, RegistryBuilder};
use pkgplan_test_utils::{init_tracing, with_timeout};

fn executor_in(root: &std::path::Path) -> BuildExecutor {
    BuildExecutor::new(
        DriverRegistry::with_defaults(),
        Layout::new(root.join("install")),
        root.join("log"),
    )
}

#[tokio::test]
async fn stages_run_in_order_and_write_the_log() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("hello")
                .versions(&["1.0"])
                .configure_cmd("echo configuring")
                .build_cmd("echo building")
                .install_cmd("echo installed > {prefix}/out.txt"),
        )
        .build();
    let graph = Arc::new(
        Solver::new(&registry)
            .solve(&parse_spec("hello").unwrap())
            .unwrap(),
    );

    let root = tempfile::tempdir().unwrap();
    let executor = executor_in(root.path());

    let log = with_timeout(executor.build_node(graph, "hello"))
        .await
        .unwrap();

    let transcript = std::fs::read_to_string(&log).unwrap();
    let configure_at = transcript.find("configuring").unwrap();
    let build_at = transcript.find("building").unwrap();
    assert!(configure_at < build_at, "stages out of order: {transcript}");

    let installed = root.path().join("install/hello-1.0/out.txt");
    assert_eq!(std::fs::read_to_string(installed).unwrap().trim(), "installed");
}

#[tokio::test]
async fn dependency_exports_reach_the_build_environment() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("app")
                .versions(&["1.0"])
                .depends_on("base")
                .install_cmd("echo \"$GREETING\" > {prefix}/greeting.txt"),
        )
        .with(
            RecipeBuilder::new("base")
                .versions(&["1.0"])
                .export("GREETING", "hello from base"),
        )
        .build();
    let graph = Arc::new(
        Solver::new(&registry)
            .solve(&parse_spec("app").unwrap())
            .unwrap(),
    );

    let root = tempfile::tempdir().unwrap();
    let executor = executor_in(root.path());

    with_timeout(executor.build_node(graph, "app")).await.unwrap();

    let greeting = root.path().join("install/app-1.0/greeting.txt");
    assert_eq!(
        std::fs::read_to_string(greeting).unwrap().trim(),
        "hello from base"
    );
}

#[tokio::test]
async fn failing_stage_reports_stage_and_exit_code() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(
            RecipeBuilder::new("broken")
                .versions(&["1.0"])
                .build_cmd("echo about to fail; exit 3"),
        )
        .build();
    let graph = Arc::new(
        Solver::new(&registry)
            .solve(&parse_spec("broken").unwrap())
            .unwrap(),
    );

    let root = tempfile::tempdir().unwrap();
    let executor = executor_in(root.path());

    let err = with_timeout(executor.build_node(graph, "broken"))
        .await
        .unwrap_err();

    match err {
        BuildError::Driver {
            stage,
            exit_code,
            log,
        } => {
            assert_eq!(stage, BuildStage::Build);
            assert_eq!(exit_code, 3);
            // The log survives the failure and holds the stage output.
            let transcript = std::fs::read_to_string(log).unwrap();
            assert!(transcript.contains("about to fail"), "{transcript}");
        }
        other => panic!("expected Driver error, got: {other}"),
    }

    // The half-populated prefix is removed, so the failed package does not
    // look installed.
    assert!(!root.path().join("install/broken-1.0").exists());
}

#[tokio::test]
async fn cancellation_terminates_an_in_flight_build() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(RecipeBuilder::new("slow").versions(&["1.0"]).build_cmd("sleep 30"))
        .build();
    let graph = Arc::new(
        Solver::new(&registry)
            .solve(&parse_spec("slow").unwrap())
            .unwrap(),
    );

    let root = tempfile::tempdir().unwrap();
    let executor = Arc::new(executor_in(root.path()));

    let (events_tx, events_rx) = mpsc::channel(16);
    let backend = Arc::new(ProcessBackend::new(executor, events_tx.clone()));
    let runtime = Runtime::new(
        graph,
        PlanOptions {
            max_jobs: 1,
            fail_fast: false,
        },
        backend as Arc<dyn DriverBackend>,
        events_rx,
    );

    let started = Instant::now();
    let handle = tokio::spawn(runtime.run());

    // Let the sleep actually start, then pull the plug.
    tokio::time::sleep(Duration::from_millis(300)).await;
    events_tx.send(BuildEvent::CancelRequested).await.unwrap();

    let report = with_timeout(handle).await.unwrap().unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(report.entry("slow").unwrap().state, BuildState::Failed);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "cancellation did not terminate the build: took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn unknown_build_system_fails_before_running_anything() {
    init_tracing();
    let registry = RegistryBuilder::new()
        .with(RecipeBuilder::new("weird").versions(&["1.0"]).build_system("bazel"))
        .build();
    let graph = Arc::new(
        Solver::new(&registry)
            .solve(&parse_spec("weird").unwrap())
            .unwrap(),
    );

    let root = tempfile::tempdir().unwrap();
    let executor = executor_in(root.path());

    let err = with_timeout(executor.build_node(graph, "weird"))
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::UnknownBuildSystem(ref id) if id == "bazel"));
}
