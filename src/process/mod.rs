//! Process discovery.
//!
//! The supervisor never shells out to `pgrep`/`lsof`; everything it needs to
//! know about foreign processes comes through [`ProcessProbe`], so the
//! matching logic stays in-process and testable against a mock.

pub mod mock;
pub mod port;
pub mod system;

pub use mock::MockProbe;
pub use system::SystemProbe;

/// Snapshot of one OS process.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Full command line, arguments joined with spaces
    pub command: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub run_time_secs: u64,
}

/// Discovery capability the supervisor operates against.
pub trait ProcessProbe: Send {
    /// Snapshot all visible processes.
    fn list(&mut self) -> Vec<ProcessInfo>;

    /// Whether the process is currently alive.
    fn is_alive(&mut self, pid: u32) -> bool;

    /// Metrics for a single process, `None` when it is gone.
    fn info(&mut self, pid: u32) -> Option<ProcessInfo>;

    /// PIDs of processes holding a LISTEN socket on the TCP port.
    fn listeners_on_port(&mut self, port: u16) -> Vec<u32>;
}

/// Signal-0 liveness probe.
pub fn pid_is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
    #[cfg(not(unix))]
    {
        use crate::process::ProcessProbe as _;
        system::SystemProbe::new().is_alive(pid)
    }
}
