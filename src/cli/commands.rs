//! Command handlers.

use std::path::Path;

use anyhow::Context;

use crate::cli::{Cli, Commands};
use crate::config::SupervisorConfig;
use crate::envcheck;
use crate::error::ButlerError;
use crate::process::port;
use crate::supervisor::logscan;
use crate::supervisor::service::ServiceState;
use crate::supervisor::{pidfile, RunMode, StartOutcome, StopOutcome, Supervisor};

/// Dispatch a parsed command line. Returns the process exit code.
pub async fn run(cli: Cli) -> anyhow::Result<u8> {
    let config_dir = cli
        .config_dir
        .unwrap_or_else(|| Path::new(".").to_path_buf());
    let config = SupervisorConfig::load_from(&config_dir).context("loading configuration")?;

    if let Err(errors) = config.validate() {
        for error in &errors {
            eprintln!("\x1b[31m✗ config: {error}\x1b[0m");
        }
        return Ok(1);
    }

    let mut supervisor = Supervisor::new(config)?;

    match cli.command {
        Commands::Start {
            service,
            foreground,
        } => start(&mut supervisor, service.as_deref(), foreground).await,
        Commands::Stop { service } => stop(&mut supervisor, service.as_deref()).await,
        Commands::Restart { service } => restart(&mut supervisor, service.as_deref()).await,
        Commands::Status { service } => status(&mut supervisor, service.as_deref()),
        Commands::Logs {
            target,
            tail,
            follow,
        } => logs(&supervisor, &target, tail, follow),
        Commands::Watch => {
            supervisor.watch().await?;
            Ok(0)
        }
        Commands::Check => check(&supervisor),
    }
}

async fn start(
    supervisor: &mut Supervisor,
    service: Option<&str>,
    foreground: bool,
) -> anyhow::Result<u8> {
    if foreground {
        let name = service.unwrap_or("bot");
        match supervisor.start(name, RunMode::Foreground).await {
            Ok(StartOutcome::ForegroundExited { code }) => {
                println!("\x1b[33m'{name}' exited with code {code:?}\x1b[0m");
                return Ok(u8::from(code != Some(0)));
            }
            Ok(StartOutcome::AlreadyRunning { pid }) => {
                println!("\x1b[33m⚠ '{name}' is already running (PID: {pid})\x1b[0m");
                return Ok(0);
            }
            Ok(StartOutcome::Started { .. }) => unreachable!("foreground start never detaches"),
            Err(e) => {
                eprintln!("\x1b[31m✗ {e}\x1b[0m");
                return Ok(1);
            }
        }
    }

    match service {
        Some(name) => match supervisor.start(name, RunMode::Background).await {
            Ok(outcome) => {
                report_start(supervisor, name, &outcome);
                Ok(0)
            }
            Err(e) => {
                print_failure_diagnostics(supervisor, &e);
                Ok(1)
            }
        },
        None => {
            println!("\x1b[36mStarting CoinButler services...\x1b[0m");
            match supervisor.start_all().await {
                Ok(()) => {
                    for name in supervisor.service_names() {
                        let report = supervisor.status(&name)?;
                        if let ServiceState::Running { pid } = report.state {
                            println!("  \x1b[32m✓ {name} running (PID: {pid})\x1b[0m");
                        }
                    }
                    print_checklist(supervisor);
                    Ok(0)
                }
                Err(e) => {
                    print_failure_diagnostics(supervisor, &e);
                    println!("\x1b[33mAll previously started services were rolled back.\x1b[0m");
                    Ok(1)
                }
            }
        }
    }
}

fn report_start(supervisor: &Supervisor, name: &str, outcome: &StartOutcome) {
    match outcome {
        StartOutcome::Started { pid, warnings } => {
            println!("\x1b[32m✓ '{name}' started (PID: {pid})\x1b[0m");
            for warning in warnings {
                println!("  \x1b[33m⚠ log: {warning}\x1b[0m");
            }
            print_checklist(supervisor);
        }
        StartOutcome::AlreadyRunning { pid } => {
            println!("\x1b[33m⚠ '{name}' is already running (PID: {pid})\x1b[0m");
        }
        StartOutcome::ForegroundExited { .. } => {}
    }
}

/// The log scan is a heuristic, not a substitute for looking.
fn print_checklist(supervisor: &Supervisor) {
    let config = supervisor.config();
    println!("\n  Manual checks:");
    println!(
        "  - tail the bot log for scanner activity: {}",
        config.log_path().join("bot.log").display()
    );
    println!(
        "  - open the dashboard: http://{}:{}",
        config.dashboard.host, config.dashboard.port
    );
    println!("  - confirm the .env API keys are valid (startup scan is a heuristic)");
}

/// Validation failures print the tail of the relevant logs to aid diagnosis.
fn print_failure_diagnostics(supervisor: &Supervisor, error: &ButlerError) {
    eprintln!("\x1b[31m✗ {error}\x1b[0m");

    let service = match error {
        ButlerError::Validation { service, .. } | ButlerError::Launch { service, .. } => service,
        _ => return,
    };
    let Ok(service) = supervisor.service(service) else {
        return;
    };

    for (label, path) in [
        ("log", &service.log_file),
        ("error log", &service.error_log_file),
    ] {
        if let Ok(lines) = logscan::tail_lines(path, 15) {
            if lines.is_empty() {
                continue;
            }
            eprintln!("\n  Last lines of {} ({}):", label, path.display());
            for line in lines {
                eprintln!("    {line}");
            }
        }
    }
}

async fn stop(supervisor: &mut Supervisor, service: Option<&str>) -> anyhow::Result<u8> {
    let result = match service {
        Some(name) => supervisor
            .stop(name)
            .await
            .map(|outcome| report_stop(name, outcome)),
        None => supervisor.stop_all().await.map(|()| {
            println!("\x1b[32m✓ All services stopped\x1b[0m");
        }),
    };

    match result {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("\x1b[31m✗ {e}\x1b[0m");
            Ok(1)
        }
    }
}

fn report_stop(name: &str, outcome: StopOutcome) {
    match outcome {
        StopOutcome::Stopped => println!("\x1b[32m✓ '{name}' stopped\x1b[0m"),
        StopOutcome::NotRunning => {
            println!("\x1b[33m⚠ '{name}' is not running\x1b[0m");
        }
    }
}

async fn restart(supervisor: &mut Supervisor, service: Option<&str>) -> anyhow::Result<u8> {
    match service {
        Some(name) => match supervisor.restart(name).await {
            Ok(outcome) => {
                report_start(supervisor, name, &outcome);
                Ok(0)
            }
            Err(e) => {
                print_failure_diagnostics(supervisor, &e);
                Ok(1)
            }
        },
        None => {
            if let Err(e) = supervisor.stop_all().await {
                eprintln!("\x1b[31m✗ {e}\x1b[0m");
            }
            tokio::time::sleep(std::time::Duration::from_secs(
                supervisor.config().timing.restart_delay_secs,
            ))
            .await;
            match supervisor.start_all().await {
                Ok(()) => {
                    println!("\x1b[32m✓ All services restarted\x1b[0m");
                    Ok(0)
                }
                Err(e) => {
                    print_failure_diagnostics(supervisor, &e);
                    Ok(1)
                }
            }
        }
    }
}

fn status(supervisor: &mut Supervisor, service: Option<&str>) -> anyhow::Result<u8> {
    let names = match service {
        Some(name) => vec![name.to_string()],
        None => supervisor.service_names(),
    };

    println!("\n{}", "=".repeat(64));
    println!("  COINBUTLER SERVICE STATUS");
    println!("{}\n", "=".repeat(64));

    println!(
        "  {:<12} {:<12} {:<8} {:>6} {:>9} {:>9}  {}",
        "SERVICE", "STATUS", "PID", "CPU%", "MEM(MB)", "UPTIME", "PORT"
    );
    println!("  {}", "-".repeat(60));

    for name in names {
        let report = supervisor.status(&name)?;
        match report.state {
            ServiceState::Running { pid } => {
                let (cpu, mem, uptime) = report
                    .metrics
                    .map(|m| {
                        (
                            format!("{:.1}", m.cpu_percent),
                            format!("{:.1}", m.memory_bytes as f64 / 1024.0 / 1024.0),
                            format_uptime(m.run_time_secs),
                        )
                    })
                    .unwrap_or_else(|| ("-".into(), "-".into(), "-".into()));
                let port = port_label(report.port_bound, &report.name, supervisor);
                println!(
                    "  {:<12} \x1b[32m{:<12}\x1b[0m {:<8} {:>6} {:>9} {:>9}  {}",
                    report.name, "● running", pid, cpu, mem, uptime, port
                );
            }
            ServiceState::Stopped => {
                let port = port_label(report.port_bound, &report.name, supervisor);
                println!(
                    "  {:<12} \x1b[90m{:<12}\x1b[0m {:<8} {:>6} {:>9} {:>9}  {}",
                    report.name, "○ stopped", "-", "-", "-", "-", port
                );
            }
        }
    }

    println!("\n{}", "=".repeat(64));
    Ok(0)
}

fn port_label(port_bound: Option<bool>, name: &str, supervisor: &Supervisor) -> String {
    match (port_bound, supervisor.service(name).ok().and_then(|s| s.port)) {
        (Some(true), Some(port)) => format!("{port} (bound)"),
        (Some(false), Some(port)) => format!("{port} (free)"),
        _ => "-".to_string(),
    }
}

fn format_uptime(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn logs(supervisor: &Supervisor, target: &str, tail: usize, follow: bool) -> anyhow::Result<u8> {
    let config = supervisor.config();

    let path = match target {
        "system" => config.system_log(),
        "error" => {
            // Both services' error logs, no follow mode for the pair.
            for name in supervisor.service_names() {
                let service = supervisor.service(&name)?;
                let lines = logscan::tail_lines(&service.error_log_file, tail)?;
                println!(
                    "\x1b[36m==> {} <==\x1b[0m",
                    service.error_log_file.display()
                );
                for line in lines {
                    println!("{line}");
                }
                println!();
            }
            return Ok(0);
        }
        name => supervisor.service(name)?.log_file,
    };

    if !path.exists() {
        println!("\x1b[33m⚠ No log file at {}\x1b[0m", path.display());
        return Ok(0);
    }

    if follow {
        follow_log(&path, tail)
    } else {
        for line in logscan::tail_lines(&path, tail)? {
            println!("{line}");
        }
        Ok(0)
    }
}

/// Print the tail, then poll for appended content until interrupted.
fn follow_log(path: &Path, tail: usize) -> anyhow::Result<u8> {
    use std::io::Write;

    for line in logscan::tail_lines(path, tail)? {
        println!("{line}");
    }
    let mut offset = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

    loop {
        std::thread::sleep(std::time::Duration::from_millis(500));
        let (chunk, next) = logscan::read_appended(path, offset)
            .with_context(|| format!("following {}", path.display()))?;
        if !chunk.is_empty() {
            print!("{chunk}");
            std::io::stdout().flush()?;
        }
        offset = next;
    }
}

/// Diagnose the environment without mutating any state. Exit code 0 when
/// clean, 2 when there are only warnings, 1 when something is fatal.
fn check(supervisor: &Supervisor) -> anyhow::Result<u8> {
    let config = supervisor.config().clone();
    let mut warnings = 0u32;
    let mut fatal = 0u32;

    let ok = |msg: &str| println!("  \x1b[32m✓\x1b[0m {msg}");
    let mut report = |result: Result<String, (bool, String)>| match result {
        Ok(msg) => println!("  \x1b[32m✓\x1b[0m {msg}"),
        Err((is_fatal, msg)) => {
            if is_fatal {
                fatal += 1;
                println!("  \x1b[31m✗ {msg}\x1b[0m");
            } else {
                warnings += 1;
                println!("  \x1b[33m⚠ {msg}\x1b[0m");
            }
        }
    };

    println!("\n\x1b[36mCoinButler environment check\x1b[0m\n");

    report(
        envcheck::ensure_interpreter(&config)
            .map(|()| format!("python interpreter at {}", config.python_path().display()))
            .map_err(|e| (true, e.to_string())),
    );

    report(match config.env_file().exists() {
        true => Ok(format!("{} exists", config.env_file().display())),
        false if config.env_template().exists() => Err((
            false,
            format!(
                "{} missing, will be copied from template on start",
                config.env_file().display()
            ),
        )),
        false => Err((
            true,
            format!(
                "{} missing and no template at {}",
                config.env_file().display(),
                config.env_template().display()
            ),
        )),
    });

    if config.env_file().exists() {
        report(
            envcheck::validate_env_keys(&config)
                .map(|()| "required .env keys present".to_string())
                .map_err(|e| (true, e.to_string())),
        );
    }

    for dir in [config.run_path(), config.log_path()] {
        report(match std::fs::create_dir_all(&dir) {
            Ok(()) => Ok(format!("{} is writable", dir.display())),
            Err(e) => Err((false, format!("cannot create {}: {e}", dir.display()))),
        });
    }

    for name in supervisor.service_names() {
        let service = supervisor.service(&name)?;

        // Diagnostics only: read the record directly so a stale one is
        // reported, not healed.
        let recorded = pidfile::read(&service.pid_file)?;
        match recorded {
            Some(pid) if !crate::process::pid_is_alive(pid) => {
                warnings += 1;
                println!(
                    "  \x1b[33m⚠ stale PID record for '{name}' (PID {pid} is gone)\x1b[0m"
                );
            }
            Some(pid) => ok(&format!("'{name}' running (PID: {pid})")),
            None => ok(&format!("'{name}' has no PID record")),
        }

        if let Some(service_port) = service.port {
            let running = recorded.is_some_and(crate::process::pid_is_alive);
            if !running && port::is_bound(service_port) {
                warnings += 1;
                println!(
                    "  \x1b[33m⚠ port {service_port} is bound but '{name}' is not running (foreign process?)\x1b[0m"
                );
            }
        }
    }

    println!();
    if fatal > 0 {
        println!("\x1b[31m✗ {fatal} fatal issue(s), {warnings} warning(s)\x1b[0m");
        Ok(1)
    } else if warnings > 0 {
        println!("\x1b[33m⚠ {warnings} warning(s), no fatal issues\x1b[0m");
        Ok(2)
    } else {
        println!("\x1b[32m✓ Environment looks good\x1b[0m");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SupervisorConfig;
    use crate::process::MockProbe;
    use crate::supervisor::service::{HealthCheck, ManagedService};

    #[test]
    fn check_reports_a_stale_record_without_purging_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = SupervisorConfig::default();
        config.install_root = dir.path().to_path_buf();
        config.python = "/bin/sh".into();
        std::fs::write(
            dir.path().join(".env"),
            "UPBIT_ACCESS_KEY=a\nUPBIT_SECRET_KEY=b\nGEMINI_API_KEY=c\n",
        )
        .expect("write .env");

        // Reaped child: the recorded PID is definitely dead.
        let mut child = std::process::Command::new("true").spawn().expect("spawn");
        let pid = child.id();
        child.wait().expect("wait");

        let pid_file = dir.path().join("run").join("bot.pid");
        pidfile::write(&pid_file, pid).expect("write pid");

        let service = ManagedService {
            name: "bot".to_string(),
            program: "/bin/sh".into(),
            args: vec![],
            pid_file: pid_file.clone(),
            log_file: dir.path().join("logs").join("bot.log"),
            error_log_file: dir.path().join("logs").join("bot.error.log"),
            port: None,
            health: HealthCheck::ProcessAlive,
        };
        let supervisor =
            Supervisor::with_parts(config, vec![service], Box::new(MockProbe::new()))
                .expect("supervisor");

        let code = check(&supervisor).expect("check");
        assert_eq!(code, 2);
        assert!(pid_file.exists(), "diagnostics must not heal the record");
    }
}
