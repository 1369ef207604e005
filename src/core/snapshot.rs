use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::connection::ConnectionRecord;

/// Aggregated view of the target's live remote connections at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Local>,
    pub timestamp_epoch: f64,
    pub total_count: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub by_remote: BTreeMap<String, usize>,
    pub sockets: Vec<ConnectionRecord>,
}

impl Snapshot {
    pub fn capture(sockets: Vec<ConnectionRecord>) -> Self {
        Self::at(Local::now(), sockets)
    }

    pub fn at(timestamp: DateTime<Local>, sockets: Vec<ConnectionRecord>) -> Self {
        let mut by_type = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        let mut by_remote = BTreeMap::new();

        for socket in &sockets {
            *by_type.entry(socket.transport.to_string()).or_insert(0) += 1;
            *by_status.entry(socket.state.to_string()).or_insert(0) += 1;
            *by_remote.entry(socket.endpoint_key()).or_insert(0) += 1;
        }

        Self {
            timestamp,
            timestamp_epoch: timestamp.timestamp_micros() as f64 / 1_000_000.0,
            total_count: sockets.len(),
            by_type,
            by_status,
            by_remote,
            sockets,
        }
    }

    /// One-line status, e.g. `Remote: 3 (TCP:3) [ESTABLISHED:2, SYN_SENT:1]`.
    pub fn progress_line(&self) -> String {
        let mut parts = vec![format!("Remote: {}", self.total_count)];

        if !self.by_type.is_empty() {
            let types: Vec<String> = self.by_type.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
            parts.push(format!("({})", types.join(", ")));
        }

        if !self.by_status.is_empty() {
            let states: Vec<String> = self.by_status.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
            parts.push(format!("[{}]", states.join(", ")));
        }

        parts.join(" ")
    }
}
