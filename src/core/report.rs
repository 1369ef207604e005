use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::connection::ConnectionRecord;
use super::error::ReportError;
use super::process::TargetProcess;
use super::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Requested,
    DurationElapsed,
    ProcessExited,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Requested => "stop requested",
            StopReason::DurationElapsed => "duration elapsed",
            StopReason::ProcessExited => "process exited",
        }
    }
}

/// Everything recorded during one monitoring session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringReport {
    pub process_name: String,
    pub process_id: u32,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub duration_seconds: f64,
    pub interval_seconds: f64,
    pub stop_reason: StopReason,
    pub total_snapshots: usize,
    pub max_sockets: usize,
    pub max_sockets_time: Option<DateTime<Local>>,
    pub max_sockets_details: Vec<ConnectionRecord>,
    pub dns_cache: BTreeMap<String, String>,
    pub snapshots: Vec<Snapshot>,
}

pub struct SessionTiming {
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub duration_seconds: f64,
    pub interval_seconds: f64,
}

/// Index of the snapshot with the highest total count; ties go to the
/// earliest one.
pub fn peak_index(snapshots: &[Snapshot]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, snapshot) in snapshots.iter().enumerate() {
        match best {
            Some((_, count)) if snapshot.total_count <= count => {}
            _ => best = Some((idx, snapshot.total_count)),
        }
    }
    best.map(|(idx, _)| idx)
}

impl MonitoringReport {
    pub fn new(
        target: &TargetProcess,
        timing: SessionTiming,
        stop_reason: StopReason,
        snapshots: Vec<Snapshot>,
        dns_cache: BTreeMap<String, String>,
    ) -> Self {
        let peak = peak_index(&snapshots).map(|idx| &snapshots[idx]);

        Self {
            process_name: target.name.clone(),
            process_id: target.pid,
            start_time: timing.start_time,
            end_time: timing.end_time,
            duration_seconds: timing.duration_seconds,
            interval_seconds: timing.interval_seconds,
            stop_reason,
            total_snapshots: snapshots.len(),
            max_sockets: peak.map(|s| s.total_count).unwrap_or(0),
            max_sockets_time: peak.map(|s| s.timestamp),
            max_sockets_details: peak.map(|s| s.sockets.clone()).unwrap_or_default(),
            dns_cache,
            snapshots,
        }
    }

    pub fn peak_snapshot(&self) -> Option<&Snapshot> {
        peak_index(&self.snapshots).map(|idx| &self.snapshots[idx])
    }

    pub fn total_counts(&self) -> Vec<usize> {
        self.snapshots.iter().map(|s| s.total_count).collect()
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let data = fs::read_to_string(path)?;
        Self::from_json(&data)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::connection::{ConnectionState, RawSocket};
    use chrono::{Duration, TimeZone};

    pub(crate) fn record(remote: &str, port: u16, state: ConnectionState, hostname: Option<&str>) -> ConnectionRecord {
        let addr = remote.parse().unwrap();
        let raw = RawSocket::tcp(("10.0.0.2".parse().unwrap(), 50000), (addr, port), state);
        ConnectionRecord::new(&raw, addr, port, hostname.map(String::from))
    }

    pub(crate) fn base_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap()
    }

    /// Snapshots half a second apart with the given totals; every
    /// connection goes to a distinct port on 93.184.216.34.
    pub(crate) fn scripted_snapshots(counts: &[usize]) -> Vec<Snapshot> {
        counts
            .iter()
            .enumerate()
            .map(|(i, count)| {
                let sockets = (0..*count)
                    .map(|n| record("93.184.216.34", 8000 + n as u16, ConnectionState::Established, None))
                    .collect();
                Snapshot::at(base_time() + Duration::milliseconds(500 * i as i64), sockets)
            })
            .collect()
    }

    pub(crate) fn scripted_report(counts: &[usize]) -> MonitoringReport {
        let mut dns = BTreeMap::new();
        dns.insert("93.184.216.34".to_string(), "example.com".to_string());
        dns.insert("8.8.8.8".to_string(), "8.8.8.8".to_string());

        MonitoringReport::new(
            &TargetProcess::new(4242, "browser"),
            SessionTiming {
                start_time: base_time(),
                end_time: base_time() + Duration::seconds(3),
                duration_seconds: 3.0,
                interval_seconds: 0.5,
            },
            StopReason::Requested,
            scripted_snapshots(counts),
            dns,
        )
    }

    #[test]
    fn test_peak_is_first_maximum() {
        let report = scripted_report(&[2, 5, 3, 5, 1]);

        assert_eq!(report.max_sockets, 5);
        assert_eq!(peak_index(&report.snapshots), Some(1));
        assert_eq!(report.max_sockets_time, Some(report.snapshots[1].timestamp));
        assert_eq!(report.max_sockets_details.len(), 5);
        assert_eq!(report.total_snapshots, 5);
    }

    #[test]
    fn test_empty_session() {
        let report = scripted_report(&[]);
        assert_eq!(report.max_sockets, 0);
        assert!(report.max_sockets_time.is_none());
        assert!(report.max_sockets_details.is_empty());
        assert!(report.peak_snapshot().is_none());
    }

    #[test]
    fn test_json_roundtrip() {
        let report = scripted_report(&[2, 5, 3, 5, 1]);

        let json = report.to_json().unwrap();
        let restored = MonitoringReport::from_json(&json).unwrap();

        assert_eq!(restored.total_counts(), vec![2, 5, 3, 5, 1]);
        assert_eq!(restored.max_sockets, report.max_sockets);
        assert_eq!(restored.max_sockets_details, report.max_sockets_details);
        assert_eq!(restored.dns_cache, report.dns_cache);
        assert_eq!(restored.stop_reason, StopReason::Requested);
        assert_eq!(peak_index(&restored.snapshots), Some(1));
    }

    #[test]
    fn test_json_field_names() {
        let report = scripted_report(&[1]);
        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(value["process_id"], 4242);
        assert_eq!(value["stop_reason"], "requested");
        let socket = &value["snapshots"][0]["sockets"][0];
        assert_eq!(socket["type"], "TCP");
        assert_eq!(socket["status"], "ESTABLISHED");
        assert_eq!(socket["family"], "AF_INET");
        assert_eq!(socket["remote_address"], "93.184.216.34");
    }
}
