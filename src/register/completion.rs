//! Completion counters shared between a register and its waiters.
//!
//! Workers bump `completed`/`failed` as qubits finish. A [`CompletionHandle`]
//! can be cloned out of the register and waited on from another thread or
//! task while the register itself is busy dispatching.

use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::error::RegisterError;

/// Poll interval for the async wait
const ASYNC_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct Counters {
    completed: CachePadded<AtomicU32>,
    failed: CachePadded<AtomicU32>,
    /// Enabled qubits of the current run
    expected: CachePadded<AtomicU32>,
    executing: CachePadded<AtomicBool>,
    started: CachePadded<AtomicBool>,
}

/// Register-side owner of the completion counters
#[derive(Debug, Clone, Default)]
pub struct CompletionTracker {
    counters: Arc<Counters>,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the counters and mark a run of `expected` qubits as started
    pub(crate) fn begin(&self, expected: u32) {
        let c = &self.counters;
        c.completed.store(0, Ordering::SeqCst);
        c.failed.store(0, Ordering::SeqCst);
        c.expected.store(expected, Ordering::SeqCst);
        c.executing.store(true, Ordering::SeqCst);
        c.started.store(true, Ordering::SeqCst);
    }

    pub(crate) fn finish_dispatch(&self) {
        self.counters.executing.store(false, Ordering::SeqCst);
    }

    pub(crate) fn record_completed(&self) {
        self.counters.completed.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_failed(&self) {
        self.counters.failed.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn clear(&self) {
        let c = &self.counters;
        c.completed.store(0, Ordering::SeqCst);
        c.failed.store(0, Ordering::SeqCst);
        c.expected.store(0, Ordering::SeqCst);
        c.executing.store(false, Ordering::SeqCst);
        c.started.store(false, Ordering::SeqCst);
    }

    pub fn completed(&self) -> u32 {
        self.counters.completed.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u32 {
        self.counters.failed.load(Ordering::Acquire)
    }

    pub fn is_executing(&self) -> bool {
        self.counters.executing.load(Ordering::Acquire)
    }

    pub fn handle(&self) -> CompletionHandle {
        CompletionHandle {
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Cloneable view used to wait for a run to finish
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    counters: Arc<Counters>,
}

impl CompletionHandle {
    pub fn completed(&self) -> u32 {
        self.counters.completed.load(Ordering::Acquire)
    }

    pub fn failed(&self) -> u32 {
        self.counters.failed.load(Ordering::Acquire)
    }

    /// A run has started and every expected qubit has finished
    pub fn is_complete(&self) -> bool {
        let c = &self.counters;
        c.started.load(Ordering::Acquire)
            && self.completed() + self.failed() >= c.expected.load(Ordering::Acquire)
    }

    /// Spin until complete; `Duration::ZERO` waits without a deadline
    pub fn wait(&self, timeout: Duration) -> Result<(), RegisterError> {
        let start = Instant::now();
        while !self.is_complete() {
            if !timeout.is_zero() && start.elapsed() >= timeout {
                debug!(
                    "Completion wait timed out: {}/{} finished",
                    self.completed() + self.failed(),
                    self.counters.expected.load(Ordering::Acquire)
                );
                return Err(RegisterError::WaitTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            std::thread::yield_now();
        }
        trace!("Completion wait satisfied after {:?}", start.elapsed());
        Ok(())
    }

    /// Async variant of [`wait`](Self::wait) that sleeps on the tokio timer
    pub async fn wait_async(&self, timeout: Duration) -> Result<(), RegisterError> {
        let poll = async {
            while !self.is_complete() {
                tokio::time::sleep(ASYNC_POLL_INTERVAL).await;
            }
        };

        if timeout.is_zero() {
            poll.await;
            return Ok(());
        }

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| RegisterError::WaitTimeout {
                timeout_ms: timeout.as_millis() as u64,
            })
    }
}
