use std::time::Duration;

use super::resolver::{DEFAULT_DNS_TIMEOUT, DEFAULT_DNS_WORKERS};

/// Sampling parameters for one monitoring session.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Time between two ticks.
    pub interval: Duration,
    /// Hard cap on the session length; `None` runs until stopped.
    pub duration: Option<Duration>,
    pub resolve_dns: bool,
    pub dns_timeout: Duration,
    pub dns_workers: usize,
    pub live_only: bool,
    /// How long `stop()` waits for the sampler thread to exit.
    pub join_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            duration: None,
            resolve_dns: true,
            dns_timeout: DEFAULT_DNS_TIMEOUT,
            dns_workers: DEFAULT_DNS_WORKERS,
            live_only: true,
            join_timeout: Duration::from_secs(3),
        }
    }
}

impl MonitorConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_dns(mut self, resolve_dns: bool) -> Self {
        self.resolve_dns = resolve_dns;
        self
    }
}
