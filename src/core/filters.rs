use std::collections::HashSet;
use std::net::IpAddr;

use super::connection::RawSocket;

/// Decides which sockets of the target process are worth recording.
#[derive(Debug, Clone)]
pub struct ConnectionFilter {
    pub live_only: bool,
    pub local_addresses: HashSet<IpAddr>,
}

impl Default for ConnectionFilter {
    fn default() -> Self {
        Self {
            live_only: true,
            local_addresses: HashSet::new(),
        }
    }
}

impl ConnectionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live_only(mut self, live_only: bool) -> Self {
        self.live_only = live_only;
        self
    }

    pub fn with_local_addresses(mut self, addresses: HashSet<IpAddr>) -> Self {
        self.local_addresses = addresses;
        self
    }

    pub fn to_string(&self) -> String {
        if self.live_only {
            "live remote sockets (ESTABLISHED, SYN_SENT, SYN_RECV, UDP)".to_string()
        } else {
            "all remote sockets".to_string()
        }
    }

    /// True for loopback peers, the host's own interface addresses, and
    /// sockets without a remote endpoint.
    pub fn is_local_or_loopback(&self, addr: Option<&IpAddr>) -> bool {
        let Some(addr) = addr else {
            return true;
        };
        let canonical = addr.to_canonical();
        canonical.is_loopback()
            || self.local_addresses.contains(addr)
            || self.local_addresses.contains(&canonical)
    }

    pub fn matches_connection(&self, socket: &RawSocket) -> bool {
        if self.live_only && !socket.state.is_live() {
            return false;
        }

        !self.is_local_or_loopback(socket.remote.as_ref().map(|(addr, _)| addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::ConnectionState;

    fn tcp_to(remote: &str, state: ConnectionState) -> RawSocket {
        RawSocket::tcp(("192.168.1.10".parse().unwrap(), 51000), (remote.parse().unwrap(), 443), state)
    }

    fn filter() -> ConnectionFilter {
        let local = ["192.168.1.10", "fe80::1"].iter().map(|a| a.parse().unwrap()).collect();
        ConnectionFilter::new().with_local_addresses(local)
    }

    #[test]
    fn test_closing_and_listening_states_are_excluded() {
        let filter = filter();
        for state in ConnectionState::CLOSED {
            assert!(
                !filter.matches_connection(&tcp_to("8.8.8.8", state)),
                "{} should be excluded",
                state
            );
        }
    }

    #[test]
    fn test_live_states_are_included() {
        let filter = filter();
        for state in [ConnectionState::Established, ConnectionState::SynSent, ConnectionState::SynRecv] {
            assert!(filter.matches_connection(&tcp_to("8.8.8.8", state)), "{} should be included", state);
        }

        let udp = RawSocket::udp(
            ("192.168.1.10".parse().unwrap(), 5353),
            Some(("8.8.4.4".parse().unwrap(), 53)),
        );
        assert!(filter.matches_connection(&udp));
    }

    #[test]
    fn test_loopback_and_local_peers_are_excluded_in_every_state() {
        let filter = filter();
        let states = ConnectionState::LIVE.iter().chain(ConnectionState::CLOSED.iter());
        for state in states {
            for remote in ["127.0.0.1", "127.4.5.6", "::1", "::ffff:127.0.0.1", "192.168.1.10", "fe80::1"] {
                assert!(!filter.matches_connection(&tcp_to(remote, *state)), "{} {} should be excluded", remote, state);
            }
        }
    }

    #[test]
    fn test_socket_without_remote_is_excluded() {
        let udp = RawSocket::udp(("0.0.0.0".parse().unwrap(), 5353), None);
        assert!(!filter().matches_connection(&udp));
    }

    #[test]
    fn test_all_states_mode_keeps_closing_sockets() {
        let filter = filter().with_live_only(false);
        assert!(filter.matches_connection(&tcp_to("8.8.8.8", ConnectionState::TimeWait)));
        assert!(!filter.matches_connection(&tcp_to("127.0.0.1", ConnectionState::TimeWait)));
    }
}
