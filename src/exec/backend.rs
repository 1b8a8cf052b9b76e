// src/exec/backend.rs

//! Dispatch seam between the scheduler runtime and real process execution.
//!
//! The runtime only ever talks to a [`DriverBackend`]; tests substitute a
//! scripted fake, production wires in [`ProcessBackend`] which runs each
//! node through the [`BuildExecutor`](crate::exec::BuildExecutor) on its own
//! Tokio task and reports back over the runtime's event channel.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, warn};

use crate::errors::BuildError;
use crate::exec::executor::BuildExecutor;
use crate::sched::BuildEvent;
use crate::solve::DependencyGraph;

/// Something that can execute one dispatched node and eventually send a
/// [`BuildEvent::TaskCompleted`] for it.
pub trait DriverBackend: Send + Sync {
    fn dispatch(&self, graph: Arc<DependencyGraph>, package: String);

    /// Request best-effort termination of every in-flight dispatch. Each
    /// terminated node still reports a [`BuildEvent::TaskCompleted`].
    fn cancel_in_flight(&self);
}

type CancelMap = BTreeMap<String, oneshot::Sender<()>>;

fn lock_cancels(map: &Mutex<CancelMap>) -> MutexGuard<'_, CancelMap> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Production backend: one spawned task per in-flight node.
///
/// Each task races the build against a per-node cancel channel; when the
/// cancel fires first, dropping the build future kills the stage's child
/// process (it is spawned with `kill_on_drop`).
pub struct ProcessBackend {
    executor: Arc<BuildExecutor>,
    events_tx: mpsc::Sender<BuildEvent>,
    cancels: Arc<Mutex<CancelMap>>,
}

impl ProcessBackend {
    pub fn new(executor: Arc<BuildExecutor>, events_tx: mpsc::Sender<BuildEvent>) -> Self {
        Self {
            executor,
            events_tx,
            cancels: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl DriverBackend for ProcessBackend {
    fn dispatch(&self, graph: Arc<DependencyGraph>, package: String) {
        let executor = self.executor.clone();
        let events_tx = self.events_tx.clone();
        let cancels = self.cancels.clone();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        lock_cancels(&cancels).insert(package.clone(), cancel_tx);

        tokio::spawn(async move {
            let started = Instant::now();
            let result = tokio::select! {
                res = executor.build_node(graph, &package) => res,
                _ = cancel_rx => Err(BuildError::Cancelled),
            };
            lock_cancels(&cancels).remove(&package);

            let (success, log) = match result {
                Ok(log) => (true, Some(log)),
                Err(BuildError::Cancelled) => {
                    warn!(package = %package, "build terminated by cancellation");
                    (false, None)
                }
                Err(err) => {
                    error!(package = %package, error = %err, "build failed");
                    (false, err.log_ref().cloned())
                }
            };

            // The runtime shutting down early is the only reason this send
            // can fail; the outcome is irrelevant at that point.
            let _ = events_tx
                .send(BuildEvent::TaskCompleted {
                    package,
                    success,
                    duration: started.elapsed(),
                    log,
                })
                .await;
        });
    }

    fn cancel_in_flight(&self) {
        let pending = std::mem::take(&mut *lock_cancels(&self.cancels));
        for (package, cancel_tx) in pending {
            warn!(package = %package, "requesting termination of in-flight build");
            let _ = cancel_tx.send(());
        }
    }
}
