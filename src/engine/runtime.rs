//! Background resolution runtime.
//!
//! Resolving a field may take several network round trips. This module runs
//! resolution jobs on a small, bounded pool of worker threads so callers
//! (for example an interactive shell) never block on the network.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::code::StandardCode;
use crate::error::{ExecutionError, SscnError, SscnResult};
use crate::store::StandardStore;
use crate::value::FieldValue;

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Maximum queued jobs.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

enum Job {
    Resolve {
        code: StandardCode,
        field: String,
        reply: Sender<SscnResult<FieldValue>>,
    },

    #[cfg(test)]
    Sleep {
        duration: Duration,
        reply: Sender<()>,
    },
}

struct WorkerPool {
    tx: Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl WorkerPool {
    fn start(workers: usize, queue_capacity: usize, store: &Arc<StandardStore>) -> SscnResult<Self> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut pool = Self {
            tx,
            workers: Vec::with_capacity(workers),
            queue_capacity,
        };
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let store = Arc::clone(store);
            let spawned = thread::Builder::new()
                .name(format!("sscn-resolver-{idx}"))
                .spawn(move || loop {
                    match rx.recv() {
                        Ok(Job::Resolve { code, field, reply }) => {
                            let standard = store.get_or_create(&code);
                            let result = standard.get_field(&field);
                            if let Err(err) = &result {
                                tracing::warn!(code = %code, field = %field, error = %err, "background resolution failed");
                            }
                            let _ = reply.send(result);
                        }
                        Err(_) => break,

                        #[cfg(test)]
                        Ok(Job::Sleep { duration, reply }) => {
                            thread::sleep(duration);
                            let _ = reply.send(());
                        }
                    }
                });
            match spawned {
                Ok(handle) => pool.workers.push(handle),
                Err(err) => {
                    pool.shutdown();
                    return Err(SscnError::Io(err));
                }
            }
        }
        Ok(pool)
    }

    fn try_submit(&self, job: Job) -> SscnResult<()> {
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SscnError::Execution(ExecutionError::QueueFull {
                capacity: self.queue_capacity,
            })),
            Err(TrySendError::Disconnected(_)) => Err(SscnError::Execution(ExecutionError::Disconnected)),
        }
    }

    fn shutdown(self) {
        // Closing the channel lets workers drain queued jobs, then exit.
        drop(self.tx);
        for handle in self.workers {
            let _ = handle.join();
        }
    }
}

/// Handle returned by [`ResolverRuntime::submit`].
pub struct ResolveHandle {
    code: StandardCode,
    field: String,
    rx: Receiver<SscnResult<FieldValue>>,
}

impl ResolveHandle {
    /// Code of the standard being resolved.
    #[must_use]
    pub const fn code(&self) -> &StandardCode {
        &self.code
    }

    /// Field being resolved.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Waits for the resolution to complete.
    ///
    /// # Errors
    ///
    /// The resolution error, or [`ExecutionError::Disconnected`] if the worker
    /// went away without answering.
    pub fn join(self) -> SscnResult<FieldValue> {
        self.rx
            .recv()
            .map_err(|_| SscnError::Execution(ExecutionError::Disconnected))?
    }

    /// Waits for the resolution to complete with a timeout.
    ///
    /// # Errors
    ///
    /// As [`ResolveHandle::join`], plus [`ExecutionError::Timeout`].
    pub fn join_timeout(self, timeout: Duration) -> SscnResult<FieldValue> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SscnError::Execution(ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => SscnError::Execution(ExecutionError::Disconnected),
        })?
    }
}

/// Resolves fields of standards from a shared store on worker threads.
pub struct ResolverRuntime {
    store: Arc<StandardStore>,
    pool: Option<WorkerPool>,
}

impl ResolverRuntime {
    /// Starts the workers.
    ///
    /// # Errors
    ///
    /// Returns [`SscnError::Io`] if a worker thread cannot be spawned.
    pub fn new(store: Arc<StandardStore>, config: &RuntimeConfig) -> SscnResult<Self> {
        let pool = WorkerPool::start(config.workers, config.queue_capacity, &store)?;
        Ok(Self {
            store,
            pool: Some(pool),
        })
    }

    fn pool(&self) -> SscnResult<&WorkerPool> {
        self.pool
            .as_ref()
            .ok_or(SscnError::Execution(ExecutionError::Disconnected))
    }

    /// Queues resolution of `field` for `code`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::QueueFull`] if the queue is full.
    pub fn submit(&self, code: StandardCode, field: impl Into<String>) -> SscnResult<ResolveHandle> {
        let field = field.into();
        let (tx, rx) = bounded::<SscnResult<FieldValue>>(1);
        self.pool()?.try_submit(Job::Resolve {
            code: code.clone(),
            field: field.clone(),
            reply: tx,
        })?;
        Ok(ResolveHandle { code, field, rx })
    }

    /// Resolves `field` for `code` on a worker and waits for it.
    ///
    /// # Errors
    ///
    /// As [`ResolverRuntime::submit`] and [`ResolveHandle::join`].
    pub fn resolve(&self, code: StandardCode, field: impl Into<String>) -> SscnResult<FieldValue> {
        self.submit(code, field)?.join()
    }

    /// The store standards are taken from.
    #[must_use]
    pub fn store(&self) -> &Arc<StandardStore> {
        &self.store
    }

    #[cfg(test)]
    fn submit_sleep(&self, duration: Duration) -> SscnResult<Receiver<()>> {
        let (tx, rx) = bounded::<()>(1);
        self.pool()?.try_submit(Job::Sleep { duration, reply: tx })?;
        Ok(rx)
    }
}

impl Drop for ResolverRuntime {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
    }
}
