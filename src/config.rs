use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::supervisor::logscan::LogScanPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorConfig {
    /// Install root of the CoinButler application (main.py, dashboard.py, .env)
    #[serde(default = "default_install_root")]
    pub install_root: PathBuf,
    /// Directory for PID files, relative to the install root
    #[serde(default = "default_run_dir")]
    pub run_dir: PathBuf,
    /// Directory for service and supervisor logs, relative to the install root
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Python interpreter, relative to the install root
    #[serde(default = "default_python")]
    pub python: PathBuf,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub log_scan: LogScanPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_install_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_run_dir() -> PathBuf {
    PathBuf::from("run")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_python() -> PathBuf {
    PathBuf::from("venv/bin/python")
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// Bind address passed to streamlit
    pub host: String,
    /// Dashboard port, also probed during startup validation
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8501,
        }
    }
}

/// Every wait in the supervisor, in one place.
#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// Wait after spawning before startup validation begins
    pub settle_delay_secs: u64,
    /// Poll period for all bounded waits
    pub poll_interval_secs: u64,
    /// Attempts to see a declared port reach LISTEN state
    pub port_wait_attempts: u32,
    /// Attempts for the service health predicate
    pub health_attempts: u32,
    /// Graceful wait after SIGTERM before escalating, in seconds
    pub stop_grace_secs: u32,
    /// Wait after SIGKILL before reporting a termination failure, in seconds
    pub kill_wait_secs: u32,
    /// Graceful wait for port/pattern cleanup sweeps, in seconds
    pub cleanup_wait_secs: u32,
    /// Pause between stop and start during restart, lets the OS release sockets
    pub restart_delay_secs: u64,
    /// Poll period of the watch loop
    pub watch_interval_secs: u64,
    /// Pause before restarting a service the watch loop found dead
    pub watch_restart_delay_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: 3,
            poll_interval_secs: 1,
            port_wait_attempts: 15,
            health_attempts: 3,
            stop_grace_secs: 10,
            kill_wait_secs: 3,
            cleanup_wait_secs: 3,
            restart_delay_secs: 2,
            watch_interval_secs: 30,
            watch_restart_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl SupervisorConfig {
    /// Load configuration from `butler.toml` and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(".")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("butler.toml")).required(false))
            // Override with environment variables (BUTLER_DASHBOARD__PORT, etc.)
            .add_source(
                Environment::with_prefix("BUTLER")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn run_path(&self) -> PathBuf {
        self.install_root.join(&self.run_dir)
    }

    pub fn log_path(&self) -> PathBuf {
        self.install_root.join(&self.log_dir)
    }

    pub fn python_path(&self) -> PathBuf {
        self.install_root.join(&self.python)
    }

    pub fn env_file(&self) -> PathBuf {
        self.install_root.join(".env")
    }

    pub fn env_template(&self) -> PathBuf {
        self.install_root.join(".env.example")
    }

    /// Aggregate supervisor audit log
    pub fn system_log(&self) -> PathBuf {
        self.log_path().join("system.log")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.dashboard.port == 0 {
            errors.push("dashboard.port must be non-zero".to_string());
        }

        if self.timing.poll_interval_secs == 0 {
            errors.push("timing.poll_interval_secs must be positive".to_string());
        }

        if self.timing.port_wait_attempts == 0 {
            errors.push("timing.port_wait_attempts must be positive".to_string());
        }

        if self.timing.stop_grace_secs == 0 {
            errors.push("timing.stop_grace_secs must be positive".to_string());
        }

        if self.log_scan.tail_lines == 0 {
            errors.push("log_scan.tail_lines must be positive".to_string());
        }

        if self.log_scan.keywords.is_empty() {
            errors.push("log_scan.keywords must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            install_root: default_install_root(),
            run_dir: default_run_dir(),
            log_dir: default_log_dir(),
            python: default_python(),
            dashboard: DashboardConfig::default(),
            timing: TimingConfig::default(),
            log_scan: LogScanPolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SupervisorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dashboard.port, 8501);
        assert_eq!(config.timing.settle_delay_secs, 3);
        assert_eq!(config.timing.stop_grace_secs, 10);
    }

    #[test]
    fn paths_resolve_under_install_root() {
        let mut config = SupervisorConfig::default();
        config.install_root = PathBuf::from("/opt/coinbutler");
        assert_eq!(config.run_path(), PathBuf::from("/opt/coinbutler/run"));
        assert_eq!(
            config.system_log(),
            PathBuf::from("/opt/coinbutler/logs/system.log")
        );
    }

    #[test]
    fn zero_grace_period_is_rejected() {
        let mut config = SupervisorConfig::default();
        config.timing.stop_grace_secs = 0;
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("stop_grace_secs")));
    }
}
