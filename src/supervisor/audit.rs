//! Aggregate supervisor audit log.
//!
//! Every lifecycle operation appends a timestamped line to `system.log` so
//! an operator can reconstruct what the supervisor did across invocations.
//! Writes are best-effort: a broken audit log never blocks an operation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
    Success,
}

impl AuditLevel {
    fn tag(&self) -> &'static str {
        match self {
            AuditLevel::Info => "INFO",
            AuditLevel::Warn => "WARN",
            AuditLevel::Error => "ERROR",
            AuditLevel::Success => "SUCCESS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn record(&self, level: AuditLevel, message: &str) {
        let line = format!(
            "{} [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.tag(),
            message
        );

        let result = self
            .path
            .parent()
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
            })
            .and_then(|mut f| f.write_all(line.as_bytes()));

        if let Err(e) = result {
            warn!(path = %self.path.display(), "Audit log write failed: {e}");
        }
    }

    pub fn info(&self, message: &str) {
        self.record(AuditLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.record(AuditLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.record(AuditLevel::Error, message);
    }

    pub fn success(&self, message: &str) {
        self.record(AuditLevel::Success, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_tagged_and_appended() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = AuditLog::new(dir.path().join("system.log"));

        log.info("starting bot");
        log.success("bot started (PID: 123)");
        log.error("dashboard failed validation");

        let contents = std::fs::read_to_string(dir.path().join("system.log")).expect("read");
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("[INFO] starting bot"));
        assert!(lines[1].contains("[SUCCESS] bot started (PID: 123)"));
        assert!(lines[2].contains("[ERROR] dashboard failed validation"));
    }

    #[test]
    fn missing_parent_directory_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = AuditLog::new(dir.path().join("logs").join("system.log"));
        log.info("first line");
        assert!(dir.path().join("logs").join("system.log").exists());
    }
}
