use thiserror::Error;

/// Main error type for the supervisor
#[derive(Error, Debug)]
pub enum ButlerError {
    // Environment preflight errors: fatal, abort before any launch
    #[error("Environment error: {0}")]
    Environment(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    // Launch errors
    #[error("Failed to launch '{service}': {reason}")]
    Launch { service: String, reason: String },

    // Startup validation errors (the launched process is rolled back)
    #[error("Startup validation failed for '{service}': {reason}")]
    Validation {
        service: String,
        reason: ValidationFailure,
    },

    // Termination errors
    #[error("Process {pid} of '{service}' survived SIGTERM and SIGKILL, manual intervention required")]
    Termination { service: String, pid: u32 },

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Why startup validation rejected a freshly launched service.
///
/// The distinction is informational only: every variant surfaces as a failed
/// start and none is retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    /// Declared port never reached LISTEN state within the bounded wait.
    PortBindTimeout,
    /// The service-specific health predicate failed.
    HealthCheckFailed,
    /// The log tail matched the critical error patterns.
    CriticalLogError,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationFailure::PortBindTimeout => write!(f, "port bind timeout"),
            ValidationFailure::HealthCheckFailed => write!(f, "health check failed"),
            ValidationFailure::CriticalLogError => write!(f, "critical error in log"),
        }
    }
}

/// Result type alias for ButlerError
pub type Result<T> = std::result::Result<T, ButlerError>;
