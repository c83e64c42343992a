//! Managed service definitions.

use std::path::PathBuf;

use crate::config::SupervisorConfig;
use crate::process::ProcessInfo;

/// A named long-running process the supervisor is responsible for.
/// Built once from configuration, immutable afterwards.
#[derive(Debug, Clone)]
pub struct ManagedService {
    pub name: String,
    /// Program to execute
    pub program: PathBuf,
    pub args: Vec<String>,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub error_log_file: PathBuf,
    /// Declared listening port, probed during startup validation
    pub port: Option<u16>,
    pub health: HealthCheck,
}

/// Service-specific health predicate.
#[derive(Debug, Clone)]
pub enum HealthCheck {
    /// The launched PID is still alive
    ProcessAlive,
    /// An HTTP GET to the URL returns a response
    HttpGet { url: String },
}

/// Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    Running { pid: u32 },
}

impl ServiceState {
    pub fn pid(&self) -> Option<u32> {
        match self {
            ServiceState::Running { pid } => Some(*pid),
            ServiceState::Stopped => None,
        }
    }
}

/// What `status` reports for one service.
#[derive(Debug)]
pub struct StatusReport {
    pub name: String,
    pub state: ServiceState,
    /// Present when the service is running and the process is introspectable
    pub metrics: Option<ProcessInfo>,
    /// Present when the service declares a port
    pub port_bound: Option<bool>,
}

/// The CoinButler service set. Declared order is start order (bot first);
/// stop runs in reverse.
pub fn coinbutler_services(config: &SupervisorConfig) -> Vec<ManagedService> {
    let run = config.run_path();
    let logs = config.log_path();
    let python = config.python_path();

    let bot = ManagedService {
        name: "bot".to_string(),
        program: python.clone(),
        args: vec!["main.py".to_string(), "bot".to_string()],
        pid_file: run.join("bot.pid"),
        log_file: logs.join("bot.log"),
        error_log_file: logs.join("bot.error.log"),
        port: None,
        health: HealthCheck::ProcessAlive,
    };

    let dashboard = ManagedService {
        name: "dashboard".to_string(),
        program: python,
        args: [
            "-m",
            "streamlit",
            "run",
            "dashboard.py",
            "--server.address",
            &config.dashboard.host,
            "--server.port",
            &config.dashboard.port.to_string(),
            "--server.headless",
            "true",
            "--server.fileWatcherType",
            "none",
            "--browser.gatherUsageStats",
            "false",
        ]
        .map(str::to_string)
        .to_vec(),
        pid_file: run.join("dashboard.pid"),
        log_file: logs.join("dashboard.log"),
        error_log_file: logs.join("dashboard.error.log"),
        port: Some(config.dashboard.port),
        health: HealthCheck::HttpGet {
            url: format!("http://127.0.0.1:{}/", config.dashboard.port),
        },
    };

    vec![bot, dashboard]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_starts_before_dashboard() {
        let services = coinbutler_services(&SupervisorConfig::default());
        let names: Vec<&str> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["bot", "dashboard"]);
    }

    #[test]
    fn dashboard_declares_configured_port() {
        let mut config = SupervisorConfig::default();
        config.dashboard.port = 9000;
        let services = coinbutler_services(&config);
        let dashboard = services.iter().find(|s| s.name == "dashboard").unwrap();
        assert_eq!(dashboard.port, Some(9000));
        match &dashboard.health {
            HealthCheck::HttpGet { url } => assert!(url.contains(":9000")),
            other => panic!("unexpected health check: {other:?}"),
        }
    }
}
