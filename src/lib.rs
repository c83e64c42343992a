pub mod cli;
pub mod config;
pub mod envcheck;
pub mod error;
pub mod process;
pub mod retry;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::{ButlerError, Result, ValidationFailure};
pub use process::{MockProbe, ProcessInfo, ProcessProbe, SystemProbe};
pub use retry::{wait_until, WaitOutcome};
pub use supervisor::{
    AuditLog, HealthCheck, LogScanPolicy, ManagedService, RunMode, ServiceState, StartOutcome,
    StatusReport, StopOutcome, Supervisor,
};
