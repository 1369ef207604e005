use std::collections::HashSet;
use std::error::Error;
use std::io;
use std::net::IpAddr;
use std::sync::Mutex;

use get_if_addrs::get_if_addrs;
use netstat2::{get_sockets_info, AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo};
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, RefreshKind, System};

use super::connection::RawSocket;
use super::error::SourceError;

/// The process being monitored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetProcess {
    pub pid: u32,
    pub name: String,
}

impl TargetProcess {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self { pid, name: name.into() }
    }
}

/// OS facilities the monitor depends on.
pub trait ProcessSource: Send + Sync {
    /// Current sockets owned by `pid`, unfiltered.
    fn connections(&self, pid: u32) -> Result<Vec<RawSocket>, SourceError>;

    fn is_alive(&self, pid: u32) -> bool;

    /// Addresses bound to this host's network interfaces.
    fn local_addresses(&self) -> Result<HashSet<IpAddr>, SourceError>;
}

/// Walks the source chain looking for an OS permission failure.
fn is_permission_denied(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::PermissionDenied)
        {
            return true;
        }
        current = e.source();
    }
    false
}

/// [`ProcessSource`] backed by `netstat2`, `sysinfo` and `get_if_addrs`.
pub struct SystemProcessSource {
    system_info: Mutex<System>,
}

impl SystemProcessSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_processes(ProcessRefreshKind::nothing());
        Self {
            system_info: Mutex::new(System::new_with_specifics(refresh_kind)),
        }
    }

    fn refresh_one(system: &mut System, pid: u32) {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[Pid::from_u32(pid)]),
            true,
            ProcessRefreshKind::nothing(),
        );
    }

    pub fn process_name(&self, pid: u32) -> Option<String> {
        let mut system = self.system_info.lock().unwrap_or_else(|p| p.into_inner());
        Self::refresh_one(&mut system, pid);
        system
            .process(Pid::from_u32(pid))
            .map(|proc| proc.name().to_string_lossy().to_string())
    }

    /// All running processes as `(pid, name)`, sorted by name.
    pub fn list_processes(&self) -> Vec<TargetProcess> {
        let mut system = self.system_info.lock().unwrap_or_else(|p| p.into_inner());
        system.refresh_processes_specifics(ProcessesToUpdate::All, true, ProcessRefreshKind::nothing());

        let mut processes: Vec<TargetProcess> = system
            .processes()
            .iter()
            .filter(|(_, process)| !matches!(process.status(), ProcessStatus::Dead | ProcessStatus::Zombie))
            .map(|(pid, process)| TargetProcess::new(pid.as_u32(), process.name().to_string_lossy()))
            .collect();
        processes.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()).then(a.pid.cmp(&b.pid)));
        processes
    }
}

impl Default for SystemProcessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSource for SystemProcessSource {
    fn connections(&self, pid: u32) -> Result<Vec<RawSocket>, SourceError> {
        if !self.is_alive(pid) {
            return Err(SourceError::ProcessNotFound(pid));
        }

        let af_flags = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
        let proto_flags = ProtocolFlags::TCP | ProtocolFlags::UDP;
        let sockets_info = get_sockets_info(af_flags, proto_flags).map_err(|e| {
            if is_permission_denied(&e) {
                SourceError::AccessDenied(pid)
            } else {
                SourceError::Enumeration(e.to_string())
            }
        })?;

        let sockets = sockets_info
            .into_iter()
            .filter(|si| si.associated_pids.contains(&pid))
            .map(|si| match si.protocol_socket_info {
                ProtocolSocketInfo::Tcp(tcp_si) => RawSocket::tcp(
                    (tcp_si.local_addr, tcp_si.local_port),
                    (tcp_si.remote_addr, tcp_si.remote_port),
                    tcp_si.state.into(),
                ),
                // netstat2 reports no peer for UDP, so these never pass the remote filter.
                ProtocolSocketInfo::Udp(udp_si) => RawSocket::udp((udp_si.local_addr, udp_si.local_port), None),
            })
            .collect();

        Ok(sockets)
    }

    fn is_alive(&self, pid: u32) -> bool {
        let mut system = self.system_info.lock().unwrap_or_else(|p| p.into_inner());
        Self::refresh_one(&mut system, pid);
        system
            .process(Pid::from_u32(pid))
            .map(|proc| !matches!(proc.status(), ProcessStatus::Dead | ProcessStatus::Zombie))
            .unwrap_or(false)
    }

    fn local_addresses(&self) -> Result<HashSet<IpAddr>, SourceError> {
        let interfaces = get_if_addrs().map_err(|e| SourceError::Enumeration(e.to_string()))?;
        Ok(interfaces.iter().map(|iface| iface.ip()).collect())
    }
}
