//! On-disk PID records, one plain-integer file per service.

use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;

use crate::process::ProcessProbe;
use crate::supervisor::service::{ManagedService, ServiceState};

/// Read the PID record. Missing file means stopped; unparseable contents are
/// treated as stale and purged.
pub fn read(path: &Path) -> io::Result<Option<u32>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    match contents.trim().parse::<u32>() {
        Ok(pid) => Ok(Some(pid)),
        Err(_) => {
            warn!(path = %path.display(), "Purging unparseable PID record");
            let _ = fs::remove_file(path);
            Ok(None)
        }
    }
}

/// Persist the PID immediately after a successful launch.
pub fn write(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, pid.to_string())
}

/// Best-effort removal, used on every stop path including failures.
pub fn remove(path: &Path) {
    let _ = fs::remove_file(path);
}

/// Derive the service state, opportunistically purging a stale record when
/// the PID is dead.
pub fn current_state(
    service: &ManagedService,
    probe: &mut dyn ProcessProbe,
) -> io::Result<ServiceState> {
    match read(&service.pid_file)? {
        None => Ok(ServiceState::Stopped),
        Some(pid) => {
            if probe.is_alive(pid) {
                Ok(ServiceState::Running { pid })
            } else {
                warn!(
                    service = %service.name,
                    pid,
                    "Stale PID record, process is gone; treating as stopped"
                );
                remove(&service.pid_file);
                Ok(ServiceState::Stopped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::MockProbe;
    use crate::supervisor::service::HealthCheck;

    fn service_with_pid_file(path: &Path) -> ManagedService {
        ManagedService {
            name: "bot".to_string(),
            program: "python".into(),
            args: vec![],
            pid_file: path.to_path_buf(),
            log_file: path.with_extension("log"),
            error_log_file: path.with_extension("error.log"),
            port: None,
            health: HealthCheck::ProcessAlive,
        }
    }

    #[test]
    fn round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bot.pid");
        write(&path, 4242).expect("write");
        assert_eq!(read(&path).expect("read"), Some(4242));
        remove(&path);
        assert_eq!(read(&path).expect("read"), None);
    }

    #[test]
    fn garbage_record_is_purged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bot.pid");
        fs::write(&path, "not a pid").expect("write");
        assert_eq!(read(&path).expect("read"), None);
        assert!(!path.exists());
    }

    #[test]
    fn stale_record_heals_to_stopped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bot.pid");
        let service = service_with_pid_file(&path);

        // Reaped child: the PID is valid syntax but no longer alive.
        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        let pid = child.id();
        child.wait().expect("wait");

        write(&path, pid).expect("write");
        let mut probe = MockProbe::new();
        let state = current_state(&service, &mut probe).expect("state");
        assert_eq!(state, ServiceState::Stopped);
        assert!(!path.exists());
    }

    #[test]
    fn live_record_reports_running() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bot.pid");
        let service = service_with_pid_file(&path);

        let me = std::process::id();
        write(&path, me).expect("write");
        let mut probe = MockProbe::new();
        let state = current_state(&service, &mut probe).expect("state");
        assert_eq!(state, ServiceState::Running { pid: me });
    }
}
