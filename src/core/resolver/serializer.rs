// src/core/resolver/serializer.rs

//! The single-worker cooperative serializer that sequences all resolver state
//! transitions.
//!
//! Every state-mutating callback (watcher deliveries, ref-drop notifications,
//! the initial watch registration) is posted as a job onto a FIFO queue and
//! executed in order by one worker task that owns the `ResolverState`.
//! Serialization is the mutual-exclusion mechanism; the state needs no locks.

use super::ResolverState;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// A unit of work executed by the serializer worker.
pub(crate) type Job = Box<dyn FnOnce(&mut ResolverState) + Send + 'static>;

/// A cloneable handle for posting jobs onto the serializer.
#[derive(Clone)]
pub(crate) struct SerializerHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerializerHandle {
    /// Posts a job. Returns `false` when the serializer has shut down and the
    /// job was discarded.
    pub(crate) fn post(&self, job: impl FnOnce(&mut ResolverState) + Send + 'static) -> bool {
        self.tx.send(Box::new(job)).is_ok()
    }
}

/// Creates the job queue shared between a handle and the worker that will
/// drain it. Split from [`WorkSerializer::spawn`] so the state under
/// construction can capture its own handle.
pub(crate) fn queue() -> (SerializerHandle, mpsc::UnboundedReceiver<Job>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (SerializerHandle { tx }, rx)
}

/// The owning side of the serializer: the spawned worker plus its
/// cancellation token.
#[derive(Debug)]
pub(crate) struct WorkSerializer {
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkSerializer {
    /// Spawns the worker task. The worker executes jobs in FIFO order until
    /// cancelled, then runs the state's shutdown exactly once. Jobs still
    /// queued at cancellation are discarded.
    pub(crate) fn spawn(mut queue: mpsc::UnboundedReceiver<Job>, state: ResolverState) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let worker = tokio::spawn(async move {
            let mut state = state;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    job = queue.recv() => match job {
                        Some(job) => {
                            trace!("serializer executing job");
                            job(&mut state);
                        }
                        None => break,
                    },
                }
            }
            state.shutdown();
        });
        Self {
            cancel,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Cancels the worker. Idempotent; any job posted afterwards is discarded.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the worker to finish its in-flight job and run shutdown.
    /// Subsequent calls return immediately.
    pub(crate) async fn join(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}
