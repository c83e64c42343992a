//! Fake discovery for tests.
//!
//! The mock fakes what the supervisor *discovers* (process listings, port
//! ownership); liveness stays real so tests can exercise termination against
//! processes they actually spawned.

use std::collections::HashMap;

use super::{pid_is_alive, ProcessInfo, ProcessProbe};

#[derive(Default)]
pub struct MockProbe {
    processes: Vec<ProcessInfo>,
    ports: HashMap<u16, Vec<u32>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_process(&mut self, pid: u32, command: &str) -> &mut Self {
        self.processes.push(ProcessInfo {
            pid,
            command: command.to_string(),
            cpu_percent: 0.0,
            memory_bytes: 0,
            run_time_secs: 0,
        });
        self
    }

    pub fn bind_port(&mut self, port: u16, pid: u32) -> &mut Self {
        self.ports.entry(port).or_default().push(pid);
        self
    }
}

impl ProcessProbe for MockProbe {
    fn list(&mut self) -> Vec<ProcessInfo> {
        self.processes
            .iter()
            .filter(|p| pid_is_alive(p.pid))
            .cloned()
            .collect()
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        pid_is_alive(pid)
    }

    fn info(&mut self, pid: u32) -> Option<ProcessInfo> {
        if !pid_is_alive(pid) {
            return None;
        }
        self.processes.iter().find(|p| p.pid == pid).cloned()
    }

    fn listeners_on_port(&mut self, port: u16) -> Vec<u32> {
        self.ports
            .get(&port)
            .map(|pids| pids.iter().copied().filter(|p| pid_is_alive(*p)).collect())
            .unwrap_or_default()
    }
}
