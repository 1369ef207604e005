use std::fmt;
use std::net::IpAddr;

use netstat2::TcpState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressFamily {
    #[serde(rename = "AF_INET")]
    Inet,
    #[serde(rename = "AF_INET6")]
    Inet6,
}

impl AddressFamily {
    pub fn of(addr: &IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => AddressFamily::Inet,
            IpAddr::V6(_) => AddressFamily::Inet6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Tcp => "TCP",
            Transport::Udp => "UDP",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Socket state as reported by the OS. UDP sockets carry no state and are
/// recorded as `NONE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Established,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    TimeWait,
    Closed,
    CloseWait,
    LastAck,
    Listen,
    Closing,
    #[serde(rename = "NONE")]
    Stateless,
}

impl ConnectionState {
    pub const LIVE: [ConnectionState; 4] = [
        ConnectionState::Established,
        ConnectionState::SynSent,
        ConnectionState::SynRecv,
        ConnectionState::Stateless,
    ];

    pub const CLOSED: [ConnectionState; 8] = [
        ConnectionState::TimeWait,
        ConnectionState::CloseWait,
        ConnectionState::LastAck,
        ConnectionState::FinWait1,
        ConnectionState::FinWait2,
        ConnectionState::Closing,
        ConnectionState::Closed,
        ConnectionState::Listen,
    ];

    /// Whether a socket in this state is currently doing work.
    pub fn is_live(&self) -> bool {
        Self::LIVE.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Established => "ESTABLISHED",
            ConnectionState::SynSent => "SYN_SENT",
            ConnectionState::SynRecv => "SYN_RECV",
            ConnectionState::FinWait1 => "FIN_WAIT1",
            ConnectionState::FinWait2 => "FIN_WAIT2",
            ConnectionState::TimeWait => "TIME_WAIT",
            ConnectionState::Closed => "CLOSED",
            ConnectionState::CloseWait => "CLOSE_WAIT",
            ConnectionState::LastAck => "LAST_ACK",
            ConnectionState::Listen => "LISTEN",
            ConnectionState::Closing => "CLOSING",
            ConnectionState::Stateless => "NONE",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<TcpState> for ConnectionState {
    fn from(state: TcpState) -> Self {
        match state {
            TcpState::Established => ConnectionState::Established,
            TcpState::SynSent => ConnectionState::SynSent,
            TcpState::SynReceived => ConnectionState::SynRecv,
            TcpState::FinWait1 => ConnectionState::FinWait1,
            TcpState::FinWait2 => ConnectionState::FinWait2,
            TcpState::TimeWait => ConnectionState::TimeWait,
            TcpState::CloseWait => ConnectionState::CloseWait,
            TcpState::LastAck => ConnectionState::LastAck,
            TcpState::Listen => ConnectionState::Listen,
            TcpState::Closing => ConnectionState::Closing,
            // Closed, DeleteTcb and Unknown are all treated as gone.
            _ => ConnectionState::Closed,
        }
    }
}

/// One socket row as handed over by a process source, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSocket {
    pub family: AddressFamily,
    pub transport: Transport,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote: Option<(IpAddr, u16)>,
    pub state: ConnectionState,
}

impl RawSocket {
    pub fn tcp(local: (IpAddr, u16), remote: (IpAddr, u16), state: ConnectionState) -> Self {
        let remote = if remote.0.is_unspecified() { None } else { Some(remote) };
        Self {
            family: AddressFamily::of(&local.0),
            transport: Transport::Tcp,
            local_addr: local.0,
            local_port: local.1,
            remote,
            state,
        }
    }

    pub fn udp(local: (IpAddr, u16), remote: Option<(IpAddr, u16)>) -> Self {
        Self {
            family: AddressFamily::of(&local.0),
            transport: Transport::Udp,
            local_addr: local.0,
            local_port: local.1,
            remote: remote.filter(|(addr, _)| !addr.is_unspecified()),
            state: ConnectionState::Stateless,
        }
    }
}

/// A live remote connection observed during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub family: AddressFamily,
    #[serde(rename = "type")]
    pub transport: Transport,
    pub local_address: IpAddr,
    pub local_port: u16,
    pub remote_address: IpAddr,
    pub remote_port: u16,
    #[serde(rename = "status")]
    pub state: ConnectionState,
    /// Resolved name, or the literal remote address when unresolved.
    pub remote_hostname: String,
}

impl ConnectionRecord {
    pub fn new(raw: &RawSocket, remote_addr: IpAddr, remote_port: u16, hostname: Option<String>) -> Self {
        Self {
            family: raw.family,
            transport: raw.transport,
            local_address: raw.local_addr,
            local_port: raw.local_port,
            remote_address: remote_addr,
            remote_port,
            state: raw.state,
            remote_hostname: hostname.unwrap_or_else(|| remote_addr.to_string()),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.remote_hostname != self.remote_address.to_string()
    }

    /// Hostname when it differs from the address, otherwise the address.
    pub fn remote_host(&self) -> String {
        if self.is_resolved() {
            self.remote_hostname.clone()
        } else {
            self.remote_address.to_string()
        }
    }

    /// `host:port` key used for per-endpoint aggregation.
    pub fn endpoint_key(&self) -> String {
        format!("{}:{}", self.remote_host(), self.remote_port)
    }

    /// `type/state` pair, e.g. `TCP/ESTABLISHED`.
    pub fn kind(&self) -> String {
        format!("{}/{}", self.transport, self.state)
    }
}
