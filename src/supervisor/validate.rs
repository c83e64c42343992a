//! Startup validation protocol.
//!
//! After a background launch the supervisor walks a small state machine:
//!
//! `Launching -> PortCheck -> HealthCheck -> LogScan -> Validated`
//!
//! Any state can fail, and a failed start is rolled back by the caller. The
//! log scan is a heuristic; a validated start still prints a manual
//! inspection checklist.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::TimingConfig;
use crate::error::{ButlerError, Result, ValidationFailure};
use crate::process::{port, ProcessProbe};
use crate::retry::wait_until;
use crate::supervisor::logscan::{self, LogScanPolicy};
use crate::supervisor::service::{HealthCheck, ManagedService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValidationState {
    Launching,
    PortCheck,
    HealthCheck,
    LogScan,
    Validated,
    Failed(ValidationFailure),
}

/// What a successful validation hands back to the caller.
#[derive(Debug, Default)]
pub struct ValidationReport {
    /// Non-critical log-scan hits, reported but not fatal
    pub warnings: Vec<String>,
}

/// Run the protocol against a freshly spawned service process.
pub async fn validate_startup(
    service: &ManagedService,
    pid: u32,
    timing: &TimingConfig,
    policy: &LogScanPolicy,
    probe: &mut dyn ProcessProbe,
) -> Result<ValidationReport> {
    let interval = Duration::from_secs(timing.poll_interval_secs);
    let mut report = ValidationReport::default();
    let mut state = ValidationState::Launching;

    loop {
        debug!(service = %service.name, ?state, "Validation state");
        state = match state {
            ValidationState::Launching => {
                tokio::time::sleep(Duration::from_secs(timing.settle_delay_secs)).await;
                if !probe.is_alive(pid) {
                    return Err(ButlerError::Launch {
                        service: service.name.clone(),
                        reason: format!("process {pid} exited during the settle delay"),
                    });
                }
                ValidationState::PortCheck
            }

            ValidationState::PortCheck => match service.port {
                None => ValidationState::HealthCheck,
                Some(port) => {
                    let outcome =
                        wait_until(interval, timing.port_wait_attempts, || port::is_bound(port))
                            .await;
                    if outcome.is_satisfied() {
                        ValidationState::HealthCheck
                    } else {
                        ValidationState::Failed(ValidationFailure::PortBindTimeout)
                    }
                }
            },

            ValidationState::HealthCheck => {
                if check_health(service, pid, timing, probe).await? {
                    ValidationState::LogScan
                } else {
                    ValidationState::Failed(ValidationFailure::HealthCheckFailed)
                }
            }

            ValidationState::LogScan => {
                let lines = logscan::tail_lines(&service.log_file, policy.tail_lines)?;
                let scan = logscan::scan(policy, &lines);
                for line in &scan.warnings {
                    warn!(service = %service.name, "Log warning: {line}");
                }
                if scan.is_critical() {
                    ValidationState::Failed(ValidationFailure::CriticalLogError)
                } else {
                    report.warnings = scan.warnings;
                    ValidationState::Validated
                }
            }

            ValidationState::Validated => return Ok(report),

            ValidationState::Failed(reason) => {
                return Err(ButlerError::Validation {
                    service: service.name.clone(),
                    reason,
                })
            }
        };
    }
}

/// Evaluate the service-specific health predicate with a bounded retry.
async fn check_health(
    service: &ManagedService,
    pid: u32,
    timing: &TimingConfig,
    probe: &mut dyn ProcessProbe,
) -> Result<bool> {
    match &service.health {
        HealthCheck::ProcessAlive => Ok(probe.is_alive(pid)),
        HealthCheck::HttpGet { url } => {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()?;

            for attempt in 1..=timing.health_attempts {
                match client.get(url).send().await {
                    Ok(response) if response.status().is_success() => return Ok(true),
                    Ok(response) => {
                        debug!(
                            service = %service.name,
                            status = %response.status(),
                            attempt,
                            "Health endpoint returned non-success"
                        );
                    }
                    Err(e) => {
                        debug!(service = %service.name, attempt, "Health request failed: {e}");
                    }
                }
                if attempt < timing.health_attempts {
                    tokio::time::sleep(Duration::from_secs(timing.poll_interval_secs)).await;
                }
            }
            Ok(false)
        }
    }
}
