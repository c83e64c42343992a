//! Process supervision: lifecycle, PID records, startup validation, audit.

pub mod audit;
pub mod lifecycle;
pub mod logscan;
pub mod pidfile;
pub mod service;
pub mod validate;

pub use audit::{AuditLevel, AuditLog};
pub use lifecycle::{RunMode, StartOutcome, StopOutcome, Supervisor};
pub use logscan::{LogScanPolicy, ScanReport};
pub use service::{HealthCheck, ManagedService, ServiceState, StatusReport};
pub use validate::ValidationReport;
