//! qarma-register
//!
//! Adaptive parallel execution core: a quantum register fans one unit of work
//! out into qubits, runs them, and collapses their results into a single
//! output with one of thirteen collapse strategies. Around the register sit a
//! workload profiler, a learning observer that recommends strategies, a
//! predictive scheduler, an adaptive controller that switches strategy
//! mid-run, and a messaging bus for cross-qubit cooperation.

pub mod adaptive;
pub mod clock;
pub mod collapse;
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod observer;
pub mod profiler;
pub mod register;
pub mod scheduler;

pub use adaptive::{AdaptiveController, AdaptivePolicy, AdaptiveState, AdaptiveThresholds};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use collapse::{CollapseStrategy, MultiDimCriteria, TemporalHistory};
pub use config::QarmaConfig;
pub use error::{BusError, CollapseError, ErrorReport, QarmaError, RegisterError, Result};
pub use messaging::{BusConfig, CrossMessage, MessageBus, MessageType, BROADCAST};
pub use observer::{AiObserver, ObserverConfig};
pub use profiler::WorkloadProfile;
pub use register::{QuantumRegister, QubitStatus, RegisterConfig};
pub use scheduler::{PredictiveScheduler, ScheduleStrategy, SchedulerConfig};
