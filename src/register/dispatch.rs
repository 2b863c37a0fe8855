//! Execution collaborators that run qubit jobs to completion.
//!
//! The register hands a dispatcher one wave of jobs at a time and expects
//! every job to have finished when `dispatch` returns. Between waves the
//! register runs its adaptive checkpoint.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{QarmaError, Result};

/// A single qubit run, borrowed from the register for the duration of a wave
pub type Job<'a> = Box<dyn FnOnce() + Send + 'a>;

/// How registers run their qubits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Run each qubit on the calling thread, one per wave
    Inline,
    /// Run each wave on a dedicated rayon pool
    Parallel,
}

impl Default for DispatchMode {
    fn default() -> Self {
        Self::Inline
    }
}

pub trait Dispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Maximum number of jobs handed over per call
    fn wave_size(&self) -> usize;

    /// Run every job; returns once all of them have finished
    fn dispatch<'a>(&self, jobs: Vec<Job<'a>>);
}

/// Runs jobs on the calling thread in submission order
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDispatcher;

impl Dispatcher for InlineDispatcher {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn wave_size(&self) -> usize {
        1
    }

    fn dispatch<'a>(&self, jobs: Vec<Job<'a>>) {
        for job in jobs {
            job();
        }
    }
}

/// Runs jobs concurrently on a dedicated thread pool
pub struct ParallelDispatcher {
    pool: rayon::ThreadPool,
    wave_size: usize,
}

impl ParallelDispatcher {
    /// Pool sized to the machine; a zero `wave_size` means one job per thread
    pub fn new(wave_size: usize) -> Result<Self> {
        Self::with_threads(num_cpus::get(), wave_size)
    }

    pub fn with_threads(threads: usize, wave_size: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("qarma-qubit-{}", i))
            .build()
            .map_err(|e| QarmaError::Internal(format!("Failed to build qubit pool: {}", e)))?;

        let wave_size = if wave_size == 0 { threads } else { wave_size };
        info!(
            "Parallel dispatcher ready: {} threads, wave size {}",
            threads, wave_size
        );

        Ok(Self { pool, wave_size })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl Dispatcher for ParallelDispatcher {
    fn name(&self) -> &'static str {
        "parallel"
    }

    fn wave_size(&self) -> usize {
        self.wave_size
    }

    fn dispatch<'a>(&self, jobs: Vec<Job<'a>>) {
        debug!("Dispatching wave of {} jobs", jobs.len());
        self.pool.scope(|scope| {
            for job in jobs {
                scope.spawn(move |_| job());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_jobs(counter: &AtomicUsize, n: usize) -> Vec<Job<'_>> {
        (0..n)
            .map(|_| -> Job<'_> {
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect()
    }

    #[test]
    fn test_inline_runs_every_job() {
        let counter = AtomicUsize::new(0);
        InlineDispatcher.dispatch(counting_jobs(&counter, 5));
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert_eq!(InlineDispatcher.wave_size(), 1);
    }

    #[test]
    fn test_parallel_waits_for_all_jobs() {
        let dispatcher = ParallelDispatcher::with_threads(4, 0).unwrap();
        assert_eq!(dispatcher.wave_size(), 4);

        let counter = AtomicUsize::new(0);
        dispatcher.dispatch(counting_jobs(&counter, 16));
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }
}
