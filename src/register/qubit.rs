//! Qubit: one independently executable unit of work inside a register.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Values a qubit can operate on and a register can collapse
pub trait QubitData: Clone + Default + PartialEq + Send + Sync + 'static {}

impl<T> QubitData for T where T: Clone + Default + PartialEq + Send + Sync + 'static {}

/// Qubit body; mutates its data in place, an `Err` marks the qubit failed
pub type QubitFn<T> = Arc<dyn Fn(&mut T) -> anyhow::Result<()> + Send + Sync>;

/// Opaque caller payload attached to a qubit
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Pending -> Running -> {Completed | Failed}, or Pending -> Skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QubitStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl QubitStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

pub struct Qubit<T> {
    pub(crate) enabled: bool,
    pub(crate) status: QubitStatus,
    pub(crate) function: Option<QubitFn<T>>,
    pub(crate) data: T,
    /// Declared result size in bytes, used as the scheduler's learning key
    pub(crate) result_size: usize,
    pub(crate) start_time_ms: u64,
    pub(crate) end_time_ms: u64,
    pub(crate) assigned_worker: u32,
    pub(crate) id: u32,
    pub(crate) userdata: Option<UserData>,
}

impl<T: QubitData> Qubit<T> {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            enabled: false,
            status: QubitStatus::Pending,
            function: None,
            data: T::default(),
            result_size: 0,
            start_time_ms: 0,
            end_time_ms: 0,
            assigned_worker: 0,
            id,
            userdata: None,
        }
    }

    /// Run the body once, recording timing and the terminal status
    pub(crate) fn run(&mut self, now: &dyn Fn() -> u64) -> anyhow::Result<()> {
        self.status = QubitStatus::Running;
        self.start_time_ms = now();
        self.assigned_worker = rayon::current_thread_index().unwrap_or(0) as u32;

        let outcome = match &self.function {
            Some(function) => function(&mut self.data),
            None => Err(anyhow::anyhow!("qubit {} has no function", self.id)),
        };

        self.end_time_ms = now();
        self.status = if outcome.is_ok() {
            QubitStatus::Completed
        } else {
            QubitStatus::Failed
        };
        outcome
    }

    pub(crate) fn reset_run_state(&mut self) {
        self.status = QubitStatus::Pending;
        self.start_time_ms = 0;
        self.end_time_ms = 0;
        self.assigned_worker = 0;
    }
}

impl<T> Qubit<T> {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn status(&self) -> QubitStatus {
        self.status
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn result_size(&self) -> usize {
        self.result_size
    }

    pub fn start_time_ms(&self) -> u64 {
        self.start_time_ms
    }

    pub fn end_time_ms(&self) -> u64 {
        self.end_time_ms
    }

    /// Wall time of the last run in milliseconds
    pub fn duration_ms(&self) -> u64 {
        self.end_time_ms.saturating_sub(self.start_time_ms)
    }

    pub fn assigned_worker(&self) -> u32 {
        self.assigned_worker
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn userdata(&self) -> Option<&UserData> {
        self.userdata.as_ref()
    }

    pub fn has_function(&self) -> bool {
        self.function.is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for Qubit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Qubit")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .field("status", &self.status)
            .field("data", &self.data)
            .field("result_size", &self.result_size)
            .field("duration_ms", &self.duration_ms())
            .field("assigned_worker", &self.assigned_worker)
            .finish()
    }
}
