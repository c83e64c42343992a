//! Service lifecycle operations.
//!
//! The supervisor is sequential: one operation at a time, blocking bounded
//! waits while polling. Children run as detached OS processes tracked only
//! through PID records, logs, and ports.
//!
//! Concurrent invocations against the same service are not guarded: two
//! simultaneous `start` calls can race between the liveness check and the
//! PID-record write. Accepted for the single-operator usage this tool is
//! built for.

use std::fs::OpenOptions;
use std::process::{Command, Stdio};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::SupervisorConfig;
use crate::envcheck;
use crate::error::{ButlerError, Result};
use crate::process::{port, ProcessProbe, SystemProbe};
use crate::retry::wait_until;
use crate::supervisor::audit::AuditLog;
use crate::supervisor::pidfile;
use crate::supervisor::service::{coinbutler_services, ManagedService, ServiceState, StatusReport};
use crate::supervisor::validate::{validate_startup, ValidationReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Background,
    Foreground,
}

/// What `start` did.
#[derive(Debug)]
pub enum StartOutcome {
    /// Launched and validated; warnings are non-critical log-scan hits
    Started { pid: u32, warnings: Vec<String> },
    /// Idempotent no-op: a live process already exists
    AlreadyRunning { pid: u32 },
    /// Foreground child ran to completion
    ForegroundExited { code: Option<i32> },
}

/// What `stop` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Idempotent no-op: nothing was running
    NotRunning,
}

pub struct Supervisor {
    config: SupervisorConfig,
    services: Vec<ManagedService>,
    probe: Box<dyn ProcessProbe>,
    audit: AuditLog,
    /// Children spawned by this supervisor instance, held for reaping in
    /// long-lived modes (watch); dropping a handle does not kill the child.
    children: Vec<std::process::Child>,
}

impl Supervisor {
    /// Supervisor over the CoinButler service set with real OS introspection.
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        let services = coinbutler_services(&config);
        Self::with_parts(config, services, Box::new(SystemProbe::new()))
    }

    /// Fully injected constructor, used by tests.
    pub fn with_parts(
        config: SupervisorConfig,
        services: Vec<ManagedService>,
        probe: Box<dyn ProcessProbe>,
    ) -> Result<Self> {
        if let Err(errors) = config.validate() {
            return Err(ButlerError::Environment(format!(
                "invalid configuration: {}",
                errors.join("; ")
            )));
        }
        let audit = AuditLog::new(config.system_log());
        Ok(Self {
            config,
            services,
            probe,
            audit,
            children: Vec::new(),
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    pub fn service(&self, name: &str) -> Result<ManagedService> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| ButlerError::UnknownService(name.to_string()))
    }

    /// Start one service.
    ///
    /// Background mode launches detached, persists the PID record, and gates
    /// success on the startup validation protocol, rolling the process back
    /// on failure. Foreground mode blocks until the child exits and keeps no
    /// PID record.
    pub async fn start(&mut self, name: &str, mode: RunMode) -> Result<StartOutcome> {
        let service = self.service(name)?;
        envcheck::preflight(&self.config)?;

        if let ServiceState::Running { pid } = pidfile::current_state(&service, &mut *self.probe)? {
            info!(service = name, pid, "Already running");
            return Ok(StartOutcome::AlreadyRunning { pid });
        }

        // Clear orphans from prior instances before binding the port again.
        if let Some(port) = service.port {
            let cleared = self.cleanup_by_port(port).await?;
            if cleared > 0 {
                warn!(service = name, port, cleared, "Cleared stale port holders");
            }
        }

        match mode {
            RunMode::Foreground => self.run_foreground(&service).await,
            RunMode::Background => self.start_background(&service).await,
        }
    }

    async fn start_background(&mut self, service: &ManagedService) -> Result<StartOutcome> {
        self.audit.info(&format!("Starting '{}'", service.name));

        let pid = self.spawn_detached(service)?;
        pidfile::write(&service.pid_file, pid)?;
        info!(service = %service.name, pid, "Launched, validating startup");

        match validate_startup(
            service,
            pid,
            &self.config.timing,
            &self.config.log_scan,
            &mut *self.probe,
        )
        .await
        {
            Ok(ValidationReport { warnings }) => {
                self.audit
                    .success(&format!("'{}' started (PID: {pid})", service.name));
                Ok(StartOutcome::Started { pid, warnings })
            }
            Err(e) => {
                self.audit
                    .error(&format!("'{}' failed startup: {e}", service.name));
                error!(service = %service.name, "Startup validation failed, rolling back: {e}");
                // Rollback: the process must not be left behind.
                let _ = self.stop(&service.name).await;
                Err(e)
            }
        }
    }

    async fn run_foreground(&mut self, service: &ManagedService) -> Result<StartOutcome> {
        info!(service = %service.name, "Running in foreground (Ctrl+C to stop)");

        let mut child = tokio::process::Command::new(&service.program)
            .args(&service.args)
            .current_dir(&self.config.install_root)
            .spawn()
            .map_err(|e| ButlerError::Launch {
                service: service.name.clone(),
                reason: e.to_string(),
            })?;

        tokio::select! {
            status = child.wait() => {
                let status = status?;
                Ok(StartOutcome::ForegroundExited { code: status.code() })
            }
            _ = tokio::signal::ctrl_c() => {
                info!(service = %service.name, "Interrupted, terminating child");
                if let Some(pid) = child.id() {
                    send_term(pid)?;
                }
                let status = child.wait().await?;
                Ok(StartOutcome::ForegroundExited { code: status.code() })
            }
        }
    }

    /// Stop one service: SIGTERM, bounded wait, SIGKILL, bounded wait. The
    /// PID record is removed on every path, including termination failure.
    pub async fn stop(&mut self, name: &str) -> Result<StopOutcome> {
        let service = self.service(name)?;

        let pid = match pidfile::current_state(&service, &mut *self.probe)? {
            ServiceState::Stopped => {
                info!(service = name, "Not running");
                return Ok(StopOutcome::NotRunning);
            }
            ServiceState::Running { pid } => pid,
        };

        self.audit
            .info(&format!("Stopping '{name}' (PID: {pid})"));

        let grace = self.config.timing.stop_grace_secs;
        let kill_wait = self.config.timing.kill_wait_secs;
        let dead = self.terminate_pid(pid, grace, kill_wait).await?;

        pidfile::remove(&service.pid_file);
        self.reap();

        if dead {
            self.audit.success(&format!("'{name}' stopped"));
            Ok(StopOutcome::Stopped)
        } else {
            self.audit.error(&format!(
                "'{name}' (PID: {pid}) survived SIGTERM and SIGKILL"
            ));
            Err(ButlerError::Termination {
                service: name.to_string(),
                pid,
            })
        }
    }

    /// Read-only status with derived metrics; stale PID records are healed
    /// as a side effect of the state derivation.
    pub fn status(&mut self, name: &str) -> Result<StatusReport> {
        let service = self.service(name)?;
        self.reap();
        let state = pidfile::current_state(&service, &mut *self.probe)?;

        let metrics = match state {
            ServiceState::Running { pid } => self.probe.info(pid),
            ServiceState::Stopped => None,
        };
        let port_bound = service.port.map(port::is_bound);

        Ok(StatusReport {
            name: service.name,
            state,
            metrics,
            port_bound,
        })
    }

    /// Stop then start, with a pause for the OS to release sockets.
    pub async fn restart(&mut self, name: &str) -> Result<StartOutcome> {
        self.stop(name).await?;
        tokio::time::sleep(Duration::from_secs(self.config.timing.restart_delay_secs)).await;
        self.start(name, RunMode::Background).await
    }

    /// Start every service in declared order. All-or-nothing: a failure
    /// rolls back the services already started in this sequence.
    pub async fn start_all(&mut self) -> Result<()> {
        let names = self.service_names();
        let mut started: Vec<String> = Vec::new();

        for name in names {
            match self.start(&name, RunMode::Background).await {
                Ok(_) => started.push(name),
                Err(e) => {
                    error!(service = %name, "Start failed, rolling back started services: {e}");
                    for prior in started.iter().rev() {
                        if let Err(rollback_err) = self.stop(prior).await {
                            warn!(service = %prior, "Rollback stop failed: {rollback_err}");
                        }
                    }
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Stop every service, dashboard before bot. Keeps going past failures
    /// and reports the first one.
    pub async fn stop_all(&mut self) -> Result<()> {
        let mut names = self.service_names();
        names.reverse();

        let mut first_error = None;
        for name in names {
            if let Err(e) = self.stop(&name).await {
                error!(service = %name, "Stop failed: {e}");
                first_error.get_or_insert(e);
            }
        }

        // Sweep strays the PID records lost track of, matched by command line.
        for service in self.services.clone() {
            let pattern = service.args.join("*");
            match self.cleanup_by_pattern(&pattern).await {
                Ok(0) => {}
                Ok(swept) => {
                    warn!(service = %service.name, swept, "Swept stray processes");
                    self.audit.warn(&format!(
                        "Swept {swept} stray '{}' process(es)",
                        service.name
                    ));
                }
                Err(e) => {
                    warn!(service = %service.name, "Stray sweep failed: {e}");
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Terminate every process holding a LISTEN socket on the port.
    /// "Nothing to kill" is a normal outcome. Returns how many processes
    /// were signalled.
    pub async fn cleanup_by_port(&mut self, port: u16) -> Result<usize> {
        let me = std::process::id();
        let pids: Vec<u32> = self
            .probe
            .listeners_on_port(port)
            .into_iter()
            .filter(|pid| *pid != me)
            .collect();

        for &pid in &pids {
            warn!(port, pid, "Terminating process holding port");
            let wait = self.config.timing.cleanup_wait_secs;
            self.terminate_pid(pid, wait, wait).await?;
        }

        self.reap();
        Ok(pids.len())
    }

    /// Terminate every process whose command line matches the glob pattern.
    /// Catches processes the supervisor lost track of, independent of PID
    /// records. Returns how many processes were signalled.
    pub async fn cleanup_by_pattern(&mut self, pattern: &str) -> Result<usize> {
        let me = std::process::id();
        let matches: Vec<u32> = self
            .probe
            .list()
            .into_iter()
            .filter(|p| p.pid != me && crate::supervisor::logscan::glob_match(pattern, &p.command))
            .map(|p| p.pid)
            .collect();

        for &pid in &matches {
            warn!(pid, pattern, "Terminating process matched by pattern sweep");
            let wait = self.config.timing.cleanup_wait_secs;
            self.terminate_pid(pid, wait, wait).await?;
        }

        self.reap();
        Ok(matches.len())
    }

    /// Monitor loop: poll the service set, restart anything that died
    /// unexpectedly (PID record present, process gone). Ctrl+C exits the
    /// loop and leaves the children running.
    pub async fn watch(&mut self) -> Result<()> {
        let interval = Duration::from_secs(self.config.timing.watch_interval_secs);
        let restart_delay = Duration::from_secs(self.config.timing.watch_restart_delay_secs);

        info!("Watching services (Ctrl+C to exit, children keep running)");
        self.audit.info("Watch loop started");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Watch loop interrupted");
                    self.audit.info("Watch loop stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(interval) => {}
            }

            self.reap();

            for name in self.service_names() {
                let service = self.service(&name)?;
                let recorded = pidfile::read(&service.pid_file)?;
                let Some(pid) = recorded else { continue };
                if self.probe.is_alive(pid) {
                    continue;
                }

                warn!(service = %name, pid, "Service died unexpectedly, restarting");
                self.audit
                    .warn(&format!("'{name}' (PID: {pid}) died unexpectedly"));
                tokio::time::sleep(restart_delay).await;

                match self.start(&name, RunMode::Background).await {
                    Ok(StartOutcome::Started { pid, .. }) => {
                        self.audit
                            .success(&format!("'{name}' restarted (PID: {pid})"));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Not retried here; the next tick will try again.
                        error!(service = %name, "Restart failed: {e}");
                    }
                }
            }
        }
    }

    fn spawn_detached(&mut self, service: &ManagedService) -> Result<u32> {
        if let Some(parent) = service.log_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&service.log_file)?;
        let stderr = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&service.error_log_file)?;

        let mut cmd = Command::new(&service.program);
        cmd.args(&service.args)
            .current_dir(&self.config.install_root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        // Detach from the controlling session so the child outlives us.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            unsafe {
                cmd.pre_exec(|| {
                    nix::unistd::setsid()
                        .map(|_| ())
                        .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
                });
            }
        }

        let child = cmd.spawn().map_err(|e| ButlerError::Launch {
            service: service.name.clone(),
            reason: e.to_string(),
        })?;
        let pid = child.id();
        self.children.push(child);
        Ok(pid)
    }

    /// Graceful-then-forced termination. Returns whether the process is
    /// confirmed dead.
    async fn terminate_pid(&mut self, pid: u32, grace_secs: u32, kill_secs: u32) -> Result<bool> {
        let interval = Duration::from_secs(self.config.timing.poll_interval_secs);

        self.reap();
        if !self.probe.is_alive(pid) {
            return Ok(true);
        }

        // Reap inside the poll: a child of this very instance turns into a
        // zombie on exit and would still answer the signal-0 probe.
        let children = &mut self.children;
        let probe = &mut self.probe;

        send_term(pid)?;
        let outcome = wait_until(interval, attempts(grace_secs, interval), || {
            reap_children(children);
            !probe.is_alive(pid)
        })
        .await;
        if outcome.is_satisfied() {
            return Ok(true);
        }

        warn!(pid, "Did not exit within grace period, sending SIGKILL");
        send_kill(pid)?;
        let outcome = wait_until(interval, attempts(kill_secs, interval), || {
            reap_children(children);
            !probe.is_alive(pid)
        })
        .await;
        Ok(outcome.is_satisfied())
    }

    /// Collect exit statuses of our own finished children so they do not
    /// linger as zombies and fool the signal-0 liveness probe.
    fn reap(&mut self) {
        reap_children(&mut self.children);
    }
}

fn reap_children(children: &mut Vec<std::process::Child>) {
    children.retain_mut(|child| !matches!(child.try_wait(), Ok(Some(_))));
}

fn attempts(secs: u32, interval: Duration) -> u32 {
    let interval = interval.as_secs().max(1) as u32;
    (secs / interval).max(1)
}

#[cfg(unix)]
fn send_term(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(ButlerError::Internal(format!(
            "failed to signal PID {pid}: {e}"
        ))),
    }
}

#[cfg(unix)]
fn send_kill(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(e) => Err(ButlerError::Internal(format!(
            "failed to signal PID {pid}: {e}"
        ))),
    }
}

#[cfg(not(unix))]
fn send_term(pid: u32) -> Result<()> {
    Err(ButlerError::Internal(format!(
        "signal delivery not supported on this platform (PID {pid})"
    )))
}

#[cfg(not(unix))]
fn send_kill(pid: u32) -> Result<()> {
    send_term(pid)
}
