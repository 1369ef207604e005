use std::collections::{BTreeMap, BTreeSet};

use super::connection::ConnectionRecord;
use super::report::MonitoringReport;

const RULE_WIDTH: usize = 70;

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatistics {
    pub max: usize,
    pub min: usize,
    pub mean: f64,
    pub median: f64,
}

impl SessionStatistics {
    /// Statistics over per-snapshot totals. An empty session counts as a
    /// single zero sample.
    pub fn from_counts(counts: &[usize]) -> Self {
        if counts.is_empty() {
            return Self {
                max: 0,
                min: 0,
                mean: 0.0,
                median: 0.0,
            };
        }

        let mut sorted = counts.to_vec();
        sorted.sort_unstable();
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
        } else {
            sorted[mid] as f64
        };

        Self {
            max: sorted[sorted.len() - 1],
            min: sorted[0],
            mean: sorted.iter().sum::<usize>() as f64 / sorted.len() as f64,
            median,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortGroup {
    pub port: u16,
    /// `TYPE/STATE` -> count, e.g. `TCP/ESTABLISHED: 3`.
    pub kinds: BTreeMap<String, usize>,
}

/// Peak connections to one remote address.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressGroup {
    pub label: String,
    pub connections: usize,
    pub ports: Vec<PortGroup>,
}

fn address_label(record: &ConnectionRecord) -> String {
    if record.is_resolved() {
        format!("{} ({})", record.remote_hostname, record.remote_address)
    } else {
        record.remote_address.to_string()
    }
}

/// Groups peak connections by address (most connections first, then
/// alphabetically), then by port, then by `type/state`.
pub fn peak_breakdown(details: &[ConnectionRecord]) -> Vec<AddressGroup> {
    let mut by_address: BTreeMap<String, BTreeMap<u16, BTreeMap<String, usize>>> = BTreeMap::new();
    for record in details {
        let ports = by_address.entry(address_label(record)).or_default();
        *ports.entry(record.remote_port).or_default().entry(record.kind()).or_insert(0) += 1;
    }

    let mut groups: Vec<AddressGroup> = by_address
        .into_iter()
        .map(|(label, ports)| {
            let ports: Vec<PortGroup> = ports.into_iter().map(|(port, kinds)| PortGroup { port, kinds }).collect();
            let connections = ports.iter().flat_map(|p| p.kinds.values()).sum::<usize>();
            AddressGroup {
                label,
                connections,
                ports,
            }
        })
        .collect();

    groups.sort_by(|a, b| b.connections.cmp(&a.connections).then_with(|| a.label.cmp(&b.label)));
    groups
}

/// Every `host:port` seen across the session, sorted.
pub fn unique_endpoints(report: &MonitoringReport) -> BTreeSet<String> {
    report
        .snapshots
        .iter()
        .flat_map(|snapshot| snapshot.sockets.iter())
        .map(ConnectionRecord::endpoint_key)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnsEntry {
    pub address: String,
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DnsSummary {
    pub resolved: usize,
    pub unresolved: usize,
    pub entries: Vec<DnsEntry>,
}

impl DnsSummary {
    pub fn from_cache(cache: &BTreeMap<String, String>) -> Self {
        let entries: Vec<DnsEntry> = cache
            .iter()
            .map(|(address, hostname)| DnsEntry {
                address: address.clone(),
                hostname: (hostname != address).then(|| hostname.clone()),
            })
            .collect();
        let resolved = entries.iter().filter(|e| e.hostname.is_some()).count();

        Self {
            resolved,
            unresolved: entries.len() - resolved,
            entries,
        }
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }
}

/// Human-facing reduction of a [`MonitoringReport`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSummary {
    pub statistics: SessionStatistics,
    pub peak: Vec<AddressGroup>,
    pub endpoints: BTreeSet<String>,
    pub dns: DnsSummary,
}

impl ReportSummary {
    pub fn from_report(report: &MonitoringReport) -> Self {
        Self {
            statistics: SessionStatistics::from_counts(&report.total_counts()),
            peak: peak_breakdown(&report.max_sockets_details),
            endpoints: unique_endpoints(report),
            dns: DnsSummary::from_cache(&report.dns_cache),
        }
    }

    pub fn render(&self, report: &MonitoringReport) -> String {
        let heavy = "=".repeat(RULE_WIDTH);
        let light = "-".repeat(RULE_WIDTH);
        let mut lines: Vec<String> = Vec::new();

        lines.push(heavy.clone());
        lines.push("SOCKET MONITORING SUMMARY".to_string());
        lines.push(heavy.clone());
        lines.push(String::new());

        lines.push("PROCESS INFORMATION".to_string());
        lines.push(light.clone());
        lines.push(format!("  Process Name: {}", report.process_name));
        lines.push(format!("  Process ID:   {}", report.process_id));
        lines.push(format!("  Start Time:   {}", report.start_time.to_rfc3339()));
        lines.push(format!("  End Time:     {}", report.end_time.to_rfc3339()));
        lines.push(format!("  Duration:     {:.1} seconds", report.duration_seconds));
        lines.push(format!("  Interval:     {}s", report.interval_seconds));
        lines.push(format!("  Snapshots:    {}", report.total_snapshots));
        lines.push(format!("  Stopped:      {}", report.stop_reason.as_str()));
        lines.push(String::new());

        let stats = &self.statistics;
        let peak_time = report
            .max_sockets_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        lines.push("SOCKET STATISTICS".to_string());
        lines.push(light.clone());
        lines.push(format!("  Maximum concurrent sockets: {}", stats.max));
        lines.push(format!("  Minimum concurrent sockets: {}", stats.min));
        lines.push(format!("  Average concurrent sockets: {:.1}", stats.mean));
        lines.push(format!("  Median concurrent sockets:  {:.1}", stats.median));
        lines.push(format!("  Max sockets occurred at:    {}", peak_time));
        lines.push(String::new());
        lines.push(format!("  Unique remote endpoints:    {}", self.endpoints.len()));
        lines.push(String::new());

        if !self.peak.is_empty() {
            lines.push("MAX CONCURRENT SOCKETS BREAKDOWN (grouped by address)".to_string());
            lines.push(light.clone());
            lines.push(format!("  Total: {} sockets at peak", report.max_sockets_details.len()));
            lines.push(String::new());

            for group in &self.peak {
                lines.push(format!("  {}", group.label));
                lines.push(format!("    Connections: {}", group.connections));
                for port in &group.ports {
                    let kinds: Vec<String> = port.kinds.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                    lines.push(format!("      :{} [{}]", port.port, kinds.join(", ")));
                }
                lines.push(String::new());
            }
        }

        if !self.endpoints.is_empty() {
            lines.push("ALL UNIQUE REMOTE ENDPOINTS".to_string());
            lines.push(light.clone());
            for endpoint in &self.endpoints {
                lines.push(format!("  {}", endpoint));
            }
            lines.push(String::new());
        }

        if self.dns.total() > 0 {
            lines.push("DNS RESOLUTION".to_string());
            lines.push(light.clone());
            lines.push(format!("  Resolved: {}/{} IPs", self.dns.resolved, self.dns.total()));
            lines.push(String::new());
            for entry in &self.dns.entries {
                match &entry.hostname {
                    Some(hostname) => lines.push(format!("  {:40} -> {}", entry.address, hostname)),
                    None => lines.push(format!("  {:40} (unresolved)", entry.address)),
                }
            }
            lines.push(String::new());
        }

        lines.push(heavy.clone());
        lines.push("END OF REPORT".to_string());
        lines.push(heavy);

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::ConnectionState;
    use crate::core::report::tests::{record, scripted_report};

    #[test]
    fn test_statistics_over_scripted_counts() {
        let report = scripted_report(&[2, 5, 3, 5, 1]);
        let stats = ReportSummary::from_report(&report).statistics;

        assert_eq!(stats.max, 5);
        assert_eq!(stats.min, 1);
        assert_eq!(stats.median, 3.0);
        assert!((stats.mean - 3.2).abs() < 1e-9);
    }

    #[test]
    fn test_median_of_even_count() {
        assert_eq!(SessionStatistics::from_counts(&[4, 1, 3, 2]).median, 2.5);
        assert_eq!(SessionStatistics::from_counts(&[]).max, 0);
    }

    #[test]
    fn test_peak_breakdown_ordering() {
        let details = vec![
            record("8.8.8.8", 443, ConnectionState::Established, None),
            record("93.184.216.34", 443, ConnectionState::Established, Some("example.com")),
            record("93.184.216.34", 443, ConnectionState::SynSent, Some("example.com")),
            record("93.184.216.34", 80, ConnectionState::Established, Some("example.com")),
            record("1.1.1.1", 443, ConnectionState::Established, None),
        ];

        let groups = peak_breakdown(&details);

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].label, "example.com (93.184.216.34)");
        assert_eq!(groups[0].connections, 3);
        assert_eq!(groups[0].ports[0].port, 80);
        assert_eq!(groups[0].ports[1].port, 443);
        assert_eq!(groups[0].ports[1].kinds["TCP/ESTABLISHED"], 1);
        assert_eq!(groups[0].ports[1].kinds["TCP/SYN_SENT"], 1);
        // Ties on count fall back to alphabetical order.
        assert_eq!(groups[1].label, "1.1.1.1");
        assert_eq!(groups[2].label, "8.8.8.8");
    }

    #[test]
    fn test_unique_endpoints_span_all_snapshots() {
        let report = scripted_report(&[1, 3, 2]);
        let endpoints: Vec<String> = unique_endpoints(&report).into_iter().collect();

        assert_eq!(
            endpoints,
            vec!["93.184.216.34:8000", "93.184.216.34:8001", "93.184.216.34:8002"]
        );
    }

    #[test]
    fn test_dns_summary() {
        let report = scripted_report(&[1]);
        let dns = DnsSummary::from_cache(&report.dns_cache);

        assert_eq!(dns.resolved, 1);
        assert_eq!(dns.unresolved, 1);
        assert_eq!(dns.entries[0].address, "8.8.8.8");
        assert_eq!(dns.entries[0].hostname, None);
        assert_eq!(dns.entries[1].hostname.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_render_sections() {
        let report = scripted_report(&[2, 5, 3, 5, 1]);
        let text = ReportSummary::from_report(&report).render(&report);

        assert!(text.starts_with(&"=".repeat(70)));
        assert!(text.contains("  Process Name: browser"));
        assert!(text.contains("  Maximum concurrent sockets: 5"));
        assert!(text.contains("  Average concurrent sockets: 3.2"));
        assert!(text.contains("  Median concurrent sockets:  3.0"));
        assert!(text.contains("  Total: 5 sockets at peak"));
        assert!(text.contains("      :8004 [TCP/ESTABLISHED: 1]"));
        assert!(text.contains("  Resolved: 1/2 IPs"));
        assert!(text.contains("(unresolved)"));
        assert!(text.ends_with(&format!("END OF REPORT\n{}", "=".repeat(70))));
    }

    #[test]
    fn test_render_empty_session() {
        let report = scripted_report(&[]);
        let text = ReportSummary::from_report(&report).render(&report);

        assert!(text.contains("  Maximum concurrent sockets: 0"));
        assert!(text.contains("  Max sockets occurred at:    -"));
        assert!(!text.contains("MAX CONCURRENT SOCKETS BREAKDOWN"));
        assert!(!text.contains("ALL UNIQUE REMOTE ENDPOINTS"));
    }
}
