//! `sysinfo`-backed probe, with procfs socket-inode mapping for port lookup
//! on Linux.

use sysinfo::{Pid, ProcessRefreshKind, System};

use super::{ProcessInfo, ProcessProbe};

pub struct SystemProbe {
    sys: System,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self {
            sys: System::new_all(),
        }
    }

    fn to_info(process: &sysinfo::Process) -> ProcessInfo {
        ProcessInfo {
            pid: process.pid().as_u32(),
            command: process.cmd().join(" "),
            cpu_percent: process.cpu_usage(),
            memory_bytes: process.memory(),
            run_time_secs: process.run_time(),
        }
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProbe for SystemProbe {
    fn list(&mut self) -> Vec<ProcessInfo> {
        self.sys.refresh_processes();
        self.sys.processes().values().map(Self::to_info).collect()
    }

    fn is_alive(&mut self, pid: u32) -> bool {
        #[cfg(unix)]
        {
            use nix::sys::signal::kill;
            use nix::unistd::Pid as NixPid;
            kill(NixPid::from_raw(pid as i32), None).is_ok()
        }
        #[cfg(not(unix))]
        {
            self.sys
                .refresh_process_specifics(Pid::from_u32(pid), ProcessRefreshKind::new())
        }
    }

    fn info(&mut self, pid: u32) -> Option<ProcessInfo> {
        let pid = Pid::from_u32(pid);
        // cpu_usage() needs two samples separated by the minimum interval,
        // otherwise it reads 0.0 for every process.
        self.sys
            .refresh_process_specifics(pid, ProcessRefreshKind::everything());
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        self.sys
            .refresh_process_specifics(pid, ProcessRefreshKind::everything());
        self.sys.process(pid).map(Self::to_info)
    }

    fn listeners_on_port(&mut self, port: u16) -> Vec<u32> {
        #[cfg(target_os = "linux")]
        {
            let inodes = procfs::socket_inodes_listening_on(port);
            if inodes.is_empty() {
                return Vec::new();
            }
            procfs::pids_owning_inodes(&inodes)
        }
        #[cfg(not(target_os = "linux"))]
        {
            let _ = port;
            Vec::new()
        }
    }
}

#[cfg(target_os = "linux")]
mod procfs {
    use std::collections::HashSet;
    use std::fs;

    /// Socket inodes in LISTEN state on the given local port, from
    /// /proc/net/tcp and /proc/net/tcp6.
    pub(super) fn socket_inodes_listening_on(port: u16) -> HashSet<u64> {
        const TCP_LISTEN: &str = "0A";
        let mut inodes = HashSet::new();

        for table in ["/proc/net/tcp", "/proc/net/tcp6"] {
            let Ok(contents) = fs::read_to_string(table) else {
                continue;
            };
            for line in contents.lines().skip(1) {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 10 || fields[3] != TCP_LISTEN {
                    continue;
                }
                let Some((_, port_hex)) = fields[1].rsplit_once(':') else {
                    continue;
                };
                if u16::from_str_radix(port_hex, 16) != Ok(port) {
                    continue;
                }
                if let Ok(inode) = fields[9].parse::<u64>() {
                    inodes.insert(inode);
                }
            }
        }

        inodes
    }

    /// Scan /proc/<pid>/fd for sockets matching the inode set.
    pub(super) fn pids_owning_inodes(inodes: &HashSet<u64>) -> Vec<u32> {
        let mut pids = Vec::new();

        let Ok(entries) = fs::read_dir("/proc") else {
            return pids;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(pid) = name.to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(fds) = fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            for fd in fds.flatten() {
                let Ok(target) = fs::read_link(fd.path()) else {
                    continue;
                };
                let Some(target) = target.to_str() else {
                    continue;
                };
                let Some(inode) = target
                    .strip_prefix("socket:[")
                    .and_then(|s| s.strip_suffix(']'))
                    .and_then(|s| s.parse::<u64>().ok())
                else {
                    continue;
                };
                if inodes.contains(&inode) {
                    pids.push(pid);
                    break;
                }
            }
        }

        pids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive_and_listed() {
        let mut probe = SystemProbe::new();
        let me = std::process::id();
        assert!(probe.is_alive(me));
        assert!(probe.info(me).is_some());
    }

    #[test]
    fn dead_pid_is_not_alive() {
        let mut probe = SystemProbe::new();
        // Spawn a child that exits immediately, then reap it.
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait");
        assert!(!probe.is_alive(pid));
        assert!(probe.info(pid).is_none());
    }

    #[test]
    fn busy_process_shows_nonzero_cpu() {
        let mut child = std::process::Command::new("/bin/sh")
            .arg("-c")
            .arg("while :; do :; done")
            .spawn()
            .expect("spawn spinner");
        let pid = child.id();

        let mut probe = SystemProbe::new();
        let info = probe.info(pid).expect("info");
        assert!(info.cpu_percent > 0.0, "cpu_percent was {}", info.cpu_percent);

        child.kill().expect("kill");
        child.wait().expect("wait");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn finds_own_listener_by_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let mut probe = SystemProbe::new();
        let pids = probe.listeners_on_port(port);
        assert!(pids.contains(&std::process::id()));
    }
}
