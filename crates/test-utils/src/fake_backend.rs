use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use pkgplan::exec::DriverBackend;
use pkgplan::sched::BuildEvent;
use pkgplan::solve::DependencyGraph;

/// A fake backend that:
/// - records which packages were dispatched, in order
/// - completes each package with a scripted outcome (default: success)
///
/// In `manual` mode nothing completes on its own; the test drives
/// completions through [`FakeBackend::complete`], which makes concurrency
/// and cancellation scenarios deterministic.
pub struct FakeBackend {
    events_tx: mpsc::Sender<BuildEvent>,
    dispatched: Mutex<Vec<String>>,
    failures: Mutex<BTreeSet<String>>,
    cancel_requests: Mutex<usize>,
    manual: bool,
}

impl FakeBackend {
    /// Backend that completes every dispatched package immediately.
    pub fn new(events_tx: mpsc::Sender<BuildEvent>) -> Arc<Self> {
        Arc::new(Self {
            events_tx,
            dispatched: Mutex::new(Vec::new()),
            failures: Mutex::new(BTreeSet::new()),
            cancel_requests: Mutex::new(0),
            manual: false,
        })
    }

    /// Backend that only records dispatches; the test completes them.
    pub fn manual(events_tx: mpsc::Sender<BuildEvent>) -> Arc<Self> {
        Arc::new(Self {
            events_tx,
            dispatched: Mutex::new(Vec::new()),
            failures: Mutex::new(BTreeSet::new()),
            cancel_requests: Mutex::new(0),
            manual: true,
        })
    }

    /// How many times the runtime asked for in-flight termination.
    pub fn cancel_requests(&self) -> usize {
        *self.cancel_requests.lock().unwrap()
    }

    /// Script a failure outcome for `package` (auto mode only).
    pub fn fail_on(&self, package: &str) {
        self.failures.lock().unwrap().insert(package.to_string());
    }

    /// Dispatch order observed so far.
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }

    /// Complete a previously dispatched package (manual mode).
    pub async fn complete(&self, package: &str, success: bool) {
        self.events_tx
            .send(BuildEvent::TaskCompleted {
                package: package.to_string(),
                success,
                duration: Duration::ZERO,
                log: None,
            })
            .await
            .expect("runtime dropped its event receiver");
    }
}

impl DriverBackend for FakeBackend {
    fn dispatch(&self, _graph: Arc<DependencyGraph>, package: String) {
        self.dispatched.lock().unwrap().push(package.clone());
        if self.manual {
            return;
        }

        let success = !self.failures.lock().unwrap().contains(&package);
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let _ = events_tx
                .send(BuildEvent::TaskCompleted {
                    package,
                    success,
                    duration: Duration::ZERO,
                    log: None,
                })
                .await;
        });
    }

    /// The fake never kills anything; it only records the request. Tests in
    /// manual mode decide how each in-flight package ends.
    fn cancel_in_flight(&self) {
        *self.cancel_requests.lock().unwrap() += 1;
    }
}
