// Centralized error handling for the qarma register framework
use thiserror::Error;

use crate::collapse::{CollapseStrategy, Requirement};

/// Main error type for register operations with error codes
#[derive(Error, Debug)]
pub enum QarmaError {
    #[error("Register error: {0}")]
    Register(#[from] RegisterError),

    #[error("Collapse error: {0}")]
    Collapse(#[from] CollapseError),

    #[error("Messaging error: {0}")]
    Bus(#[from] BusError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Resource exhaustion: {resource} - {details}")]
    ResourceExhaustion { resource: String, details: String },
}

impl QarmaError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Register(_) => 1000,
            Self::Collapse(_) => 2000,
            Self::Bus(_) => 3000,
            Self::Config(_) => 5000,
            Self::Io(_) => 7000,
            Self::Serialization(_) => 8000,
            Self::Internal(_) => 9000,
            Self::ResourceExhaustion { .. } => 9100,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Register(reg_err) => reg_err.is_recoverable(),
            Self::Collapse(collapse_err) => collapse_err.is_recoverable(),
            Self::Bus(bus_err) => bus_err.is_recoverable(),
            Self::ResourceExhaustion { .. } => true,
            _ => false,
        }
    }

    /// Get error severity level for monitoring and alerting
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Internal(_) => ErrorSeverity::Critical,
            Self::Config(_) | Self::Collapse(CollapseError::MissingConfiguration { .. }) => {
                ErrorSeverity::High
            }
            Self::Register(_) | Self::Collapse(_) | Self::ResourceExhaustion { .. } => {
                ErrorSeverity::Medium
            }
            Self::Bus(_) | Self::Serialization(_) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        }
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSeverity {
    Low,      // Recoverable, minimal impact
    Medium,   // Run result unusable, register still consistent
    High,     // Caller misconfiguration
    Critical, // Broken internal invariant
}

/// Error reporting with context and correlation tracking
#[derive(Debug)]
pub struct ErrorReport {
    pub error: QarmaError,
    pub context: Vec<String>,
    pub correlation_id: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub component: Option<String>,
}

impl ErrorReport {
    pub fn new(error: QarmaError) -> Self {
        Self {
            error,
            context: Vec::new(),
            correlation_id: None,
            timestamp: chrono::Utc::now(),
            component: None,
        }
    }

    pub fn with_context(mut self, context: String) -> Self {
        self.context.push(context);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_component(mut self, component: String) -> Self {
        self.component = Some(component);
        self
    }

    /// Format error for structured logging
    pub fn format_for_log(&self) -> String {
        let context_str = if self.context.is_empty() {
            String::new()
        } else {
            format!(" | Context: {}", self.context.join(" -> "))
        };

        let correlation_str = if let Some(ref id) = self.correlation_id {
            format!(" | Correlation: {}", id)
        } else {
            String::new()
        };

        let component_str = if let Some(ref comp) = self.component {
            format!(" | Component: {}", comp)
        } else {
            String::new()
        };

        format!(
            "[{}] {} (Code: {}, Severity: {:?}){}{}{}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.error,
            self.error.error_code(),
            self.error.severity(),
            context_str,
            correlation_str,
            component_str
        )
    }
}

/// Register lifecycle and configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegisterError {
    #[error("Register capacity must be greater than zero")]
    ZeroCapacity,

    #[error("Qubit index {index} out of range (capacity {capacity})")]
    IndexOutOfRange { index: usize, capacity: usize },

    #[error("Register is already executing")]
    AlreadyExecuting,

    #[error("Timeout: qubits did not finish within {timeout_ms}ms")]
    WaitTimeout { timeout_ms: u64 },

    #[error("Adaptive execution has not been initialized for this register")]
    AdaptiveNotInitialized,

    #[error("Invalid execution order: {reason}")]
    InvalidOrder { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },
}

impl RegisterError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::AlreadyExecuting => true,
            Self::WaitTimeout { .. } => true,
            Self::ZeroCapacity => false,
            Self::IndexOutOfRange { .. } => false, // Caller bug
            Self::AdaptiveNotInitialized => false,
            Self::InvalidOrder { .. } => false,
            Self::InvalidConfiguration { .. } => false,
        }
    }
}

/// Collapse strategy errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollapseError {
    #[error("Strategy {strategy:?} requires {requirement:?} but none is configured")]
    MissingConfiguration {
        strategy: CollapseStrategy,
        requirement: Requirement,
    },

    #[error("Validation failed: result {index} differs from result 0")]
    ValidationMismatch { index: usize },

    #[error("No consensus: largest agreeing group has {largest_group} of {total} results")]
    NoConsensus { largest_group: usize, total: usize },

    #[error("No completed qubit results to collapse")]
    NoResults,
}

impl CollapseError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::MissingConfiguration { .. } => false, // Needs reconfiguration
            Self::ValidationMismatch { .. } => true,     // Re-run may agree
            Self::NoConsensus { .. } => true,
            Self::NoResults => true,
        }
    }
}

/// Messaging bus errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("Messaging is disabled")]
    Disabled,

    #[error("Message queue full ({capacity} messages), message dropped")]
    QueueFull { capacity: usize },
}

impl BusError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::QueueFull { .. } => true,
        }
    }
}

/// Result type alias for register operations
pub type Result<T> = std::result::Result<T, QarmaError>;

/// Error context extension for better error reporting
pub trait ErrorContext<T> {
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<QarmaError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let base_error = e.into();
            let context = f();
            QarmaError::Internal(format!("{}: {}", context, base_error))
        })
    }
}

impl QarmaError {
    /// Get suggested recovery actions
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            QarmaError::Register(RegisterError::WaitTimeout { .. }) => {
                vec![
                    "Wait again with a longer timeout".to_string(),
                    "Check that execute was called".to_string(),
                ]
            }
            QarmaError::Register(RegisterError::AlreadyExecuting) => {
                vec!["Wait for the running dispatch to finish".to_string()]
            }
            QarmaError::Collapse(CollapseError::MissingConfiguration { requirement, .. }) => {
                vec![format!("Configure {:?} before collapsing", requirement)]
            }
            QarmaError::Collapse(CollapseError::ValidationMismatch { .. }) => {
                vec![
                    "Reset and re-execute the register".to_string(),
                    "Switch to a tolerant strategy such as Vote".to_string(),
                ]
            }
            QarmaError::Collapse(CollapseError::NoResults) => {
                vec!["Enable and execute at least one qubit".to_string()]
            }
            QarmaError::Bus(BusError::QueueFull { .. }) => {
                vec![
                    "Drain pending messages with receive".to_string(),
                    "Clear the bus between executions".to_string(),
                ]
            }
            QarmaError::ResourceExhaustion { .. } => {
                vec!["Free up memory".to_string()]
            }
            _ => vec!["Check logs for more details".to_string()],
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            QarmaError::Register(RegisterError::WaitTimeout { .. }) => {
                "Qubits did not finish in time.".to_string()
            }
            QarmaError::Collapse(CollapseError::ValidationMismatch { .. }) => {
                "Qubit results disagree, validation failed.".to_string()
            }
            QarmaError::Collapse(CollapseError::MissingConfiguration { .. }) => {
                "Collapse strategy is not fully configured.".to_string()
            }
            QarmaError::Bus(BusError::QueueFull { .. }) => {
                "Message queue is full, message dropped.".to_string()
            }
            _ => format!("An error occurred: {}", self),
        }
    }
}

/// Macro for creating error reports
#[macro_export]
macro_rules! error_report {
    ($err:expr) => {
        $crate::error::ErrorReport::new($err)
    };
    ($err:expr, $context:expr) => {
        $crate::error::ErrorReport::new($err).with_context($context.to_string())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_per_component() {
        let err: QarmaError = RegisterError::ZeroCapacity.into();
        assert_eq!(err.error_code(), 1000);

        let err: QarmaError = CollapseError::NoResults.into();
        assert_eq!(err.error_code(), 2000);

        let err: QarmaError = BusError::QueueFull { capacity: 64 }.into();
        assert_eq!(err.error_code(), 3000);
        assert!(err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_missing_configuration_is_loud() {
        let err: QarmaError = CollapseError::MissingConfiguration {
            strategy: CollapseStrategy::Best,
            requirement: Requirement::Evaluator,
        }
        .into();
        assert!(!err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(err.recovery_suggestions().len(), 1);
    }

    #[test]
    fn test_error_report_format() {
        let report = error_report!(QarmaError::from(CollapseError::ValidationMismatch { index: 2 }), "collapse")
            .with_correlation_id("run-1".to_string())
            .with_component("register".to_string());
        let line = report.format_for_log();
        assert!(line.contains("Code: 2000"));
        assert!(line.contains("Context: collapse"));
        assert!(line.contains("Correlation: run-1"));
        assert!(line.contains("Component: register"));
    }

    #[test]
    fn test_user_message() {
        let err: QarmaError = RegisterError::WaitTimeout { timeout_ms: 10 }.into();
        assert_eq!(err.user_message(), "Qubits did not finish in time.");
        let err = QarmaError::Internal("boom".to_string());
        assert!(err.user_message().ends_with("boom"));
    }

    #[test]
    fn test_error_context_wraps() {
        let res: std::result::Result<(), RegisterError> = Err(RegisterError::AlreadyExecuting);
        let wrapped = res.with_context(|| "second execute".to_string());
        match wrapped {
            Err(QarmaError::Internal(msg)) => assert!(msg.starts_with("second execute")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
