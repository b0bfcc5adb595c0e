//! Dispatch queue — single-consumer, rate-limited executor for outbound effects.
//!
//! Every component that talks to the transport pushes a deferred task here.
//! One drain loop runs at a time: pop → jitter for the action kind →
//! run under the hard timeout → settle delay → repeat. Failures and timeouts
//! are logged and the loop moves on; nothing is retried.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::profile::{ActionKind, DelayProfile};
use crate::error::DispatchError;

/// A deferred outbound action.
pub type DispatchFuture = BoxFuture<'static, anyhow::Result<()>>;

struct QueuedTask {
    kind: ActionKind,
    label: String,
    future: DispatchFuture,
}

/// Counters for completed, failed and timed-out tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
}

/// FIFO queue of deferred actions with a reentrancy-guarded drain loop.
pub struct DispatchQueue {
    tasks: Mutex<VecDeque<QueuedTask>>,
    draining: AtomicBool,
    profile: RwLock<DelayProfile>,
    timeout: Duration,
    idle: Notify,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
}

impl DispatchQueue {
    /// Create a new queue. Tasks run on the ambient tokio runtime.
    pub fn new(profile: DelayProfile, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            tasks: Mutex::new(VecDeque::new()),
            draining: AtomicBool::new(false),
            profile: RwLock::new(profile),
            timeout,
            idle: Notify::new(),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
        })
    }

    /// Push a task and make sure a drain loop is running. Never blocks.
    pub fn enqueue<F>(self: &Arc<Self>, kind: ActionKind, label: impl Into<String>, task: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        let depth = {
            let mut tasks = self.lock_tasks();
            tasks.push_back(QueuedTask {
                kind,
                label: label.clone(),
                future: task.boxed(),
            });
            tasks.len()
        };
        debug!(kind = kind.as_str(), label = %label, depth, "Task queued");
        self.start_drain();
    }

    /// Replace the delay profile used for tasks popped from now on.
    pub fn set_profile(&self, profile: DelayProfile) {
        match self.profile.write() {
            Ok(mut guard) => *guard = profile,
            Err(poisoned) => *poisoned.into_inner() = profile,
        }
    }

    /// Number of tasks waiting (not counting the one running).
    pub fn pending(&self) -> usize {
        self.lock_tasks().len()
    }

    /// True when nothing is queued and no drain loop is active.
    pub fn is_idle(&self) -> bool {
        !self.draining.load(Ordering::Acquire) && self.pending() == 0
    }

    /// Resolve once the queue has fully drained.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedTask>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn current_profile(&self) -> DelayProfile {
        match self.profile.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Start a drain loop unless one is already active.
    fn start_drain(self: &Arc<Self>) {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let queue = Arc::clone(self);
            tokio::spawn(async move { queue.drain().await });
        }
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let next = self.lock_tasks().pop_front();
            let Some(task) = next else {
                self.draining.store(false, Ordering::Release);
                // An enqueue may have landed between the pop and the store.
                if self.pending() > 0
                    && self
                        .draining
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    continue;
                }
                self.idle.notify_waiters();
                return;
            };
            self.run(task).await;
        }
    }

    async fn run(&self, task: QueuedTask) {
        let profile = self.current_profile();
        let jitter = profile.range_for(task.kind).sample();
        let settle = profile.settle.sample();

        tokio::time::sleep(jitter).await;

        // Spawned so a timeout abandons the body instead of cancelling it.
        let handle = tokio::spawn(task.future);
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(()))) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                debug!(kind = task.kind.as_str(), label = %task.label, "Task completed");
            }
            Ok(Ok(Err(e))) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let err = DispatchError::Failed {
                    label: task.label,
                    reason: format!("{e:#}"),
                };
                warn!(kind = task.kind.as_str(), error = %err, "Dispatch task failed");
            }
            Ok(Err(join_err)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let err = DispatchError::Failed {
                    label: task.label,
                    reason: join_err.to_string(),
                };
                error!(kind = task.kind.as_str(), error = %err, "Dispatch task panicked");
            }
            Err(_) => {
                self.timed_out.fetch_add(1, Ordering::Relaxed);
                let err = DispatchError::Timeout {
                    label: task.label,
                    timeout: self.timeout,
                };
                warn!(kind = task.kind.as_str(), error = %err, "Dispatch task abandoned");
            }
        }

        tokio::time::sleep(settle).await;
    }
}

impl Drop for DispatchQueue {
    fn drop(&mut self) {
        let left = self.lock_tasks().len();
        if left > 0 {
            info!(left, "Dispatch queue dropped with tasks pending");
        }
    }
}
