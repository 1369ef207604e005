use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use log::{info, warn};

use super::config::MonitorConfig;
use super::enumerator::ConnectionEnumerator;
use super::error::{MonitorError, SourceError};
use super::process::{ProcessSource, TargetProcess};
use super::report::{MonitoringReport, SessionTiming, StopReason};
use super::resolver::HostnameResolver;
use super::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Running,
    Stopped,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Cooperative cancellation flag whose wait wakes up as soon as it is set.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<Option<StopReason>>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `reason` unless a stop was already requested.
    pub fn set(&self, reason: StopReason) {
        let (flag, condvar) = &*self.inner;
        let mut current = lock(flag);
        if current.is_none() {
            *current = Some(reason);
        }
        condvar.notify_all();
    }

    pub fn is_set(&self) -> bool {
        lock(&self.inner.0).is_some()
    }

    pub fn reason(&self) -> Option<StopReason> {
        *lock(&self.inner.0)
    }

    /// Waits up to `timeout`; returns true if the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let guard = lock(flag);
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |reason| reason.is_none())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.is_some()
    }
}

/// Shortest sampling interval the scheduler will run at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Next tick deadline after `previous`, skipping any boundary already in the
/// past so an overrun never produces a burst of catch-up ticks. Intervals
/// below [`MIN_INTERVAL`] are raised to it.
pub fn next_deadline(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let interval = interval.max(MIN_INTERVAL);
    let next = previous + interval;
    if next > now {
        return next;
    }

    // Land on the first boundary of the `previous + k * interval` grid after `now`.
    let behind = now.duration_since(next).as_nanos();
    let into_slot = behind % interval.as_nanos();
    let remaining = interval.saturating_sub(Duration::from_nanos(u64::try_from(into_slot).unwrap_or(u64::MAX)));
    now + remaining
}

/// Background sampler owned by one monitoring session.
pub struct SocketMonitor {
    target: TargetProcess,
    config: MonitorConfig,
    source: Arc<dyn ProcessSource>,
    resolver: Arc<HostnameResolver>,
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
    stop_signal: StopSignal,
    state: MonitorState,
    worker: Option<JoinHandle<()>>,
    started_at: Option<(DateTime<Local>, Instant)>,
}

impl SocketMonitor {
    pub fn new(
        target: TargetProcess,
        config: MonitorConfig,
        source: Arc<dyn ProcessSource>,
        resolver: Arc<HostnameResolver>,
    ) -> Self {
        Self {
            target,
            config,
            source,
            resolver,
            snapshots: Arc::new(Mutex::new(Vec::new())),
            stop_signal: StopSignal::new(),
            state: MonitorState::Idle,
            worker: None,
            started_at: None,
        }
    }

    pub fn target(&self) -> &TargetProcess {
        &self.target
    }

    pub fn state(&self) -> MonitorState {
        match self.state {
            MonitorState::Running if self.stop_signal.is_set() => MonitorState::Stopped,
            state => state,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == MonitorState::Running
    }

    pub fn snapshot_count(&self) -> usize {
        lock(&self.snapshots).len()
    }

    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.state != MonitorState::Idle {
            return Err(MonitorError::AlreadyStarted);
        }
        if self.config.interval < MIN_INTERVAL {
            return Err(MonitorError::IntervalTooShort(self.config.interval));
        }

        let started = Instant::now();
        let sampler = Sampler {
            pid: self.target.pid,
            interval: self.config.interval,
            deadline: self.config.duration.map(|limit| started + limit),
            source: Arc::clone(&self.source),
            enumerator: ConnectionEnumerator::new(Arc::clone(&self.source), Arc::clone(&self.resolver))
                .with_dns(self.config.resolve_dns)
                .with_live_only(self.config.live_only),
            snapshots: Arc::clone(&self.snapshots),
            stop_signal: self.stop_signal.clone(),
        };

        let handle = thread::Builder::new()
            .name(format!("socket-monitor-{}", self.target.pid))
            .spawn(move || sampler.run(started))?;

        self.worker = Some(handle);
        self.started_at = Some((Local::now(), started));
        self.state = MonitorState::Running;

        info!(
            "Monitoring started for {} (PID: {}), interval {:?}",
            self.target.name, self.target.pid, self.config.interval
        );
        Ok(())
    }

    /// Blocks until the session stops on its own or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.stop_signal.wait_timeout(timeout)
    }

    /// Stops sampling and builds the report. Safe to call after the sampler
    /// has already stopped itself, and more than once.
    pub fn stop(&mut self) -> Result<MonitoringReport, MonitorError> {
        let Some((start_time, started)) = self.started_at else {
            return Err(MonitorError::NotStarted);
        };

        self.stop_signal.set(StopReason::Requested);
        if let Some(handle) = self.worker.take() {
            self.join_worker(handle);
        }
        self.state = MonitorState::Stopped;

        let snapshots = lock(&self.snapshots).clone();
        let stop_reason = self.stop_signal.reason().unwrap_or(StopReason::Requested);
        info!("Monitoring stopped ({}), {} snapshots", stop_reason.as_str(), snapshots.len());

        Ok(MonitoringReport::new(
            &self.target,
            SessionTiming {
                start_time,
                end_time: Local::now(),
                duration_seconds: started.elapsed().as_secs_f64(),
                interval_seconds: self.config.interval.as_secs_f64(),
            },
            stop_reason,
            snapshots,
            self.resolver.snapshot(),
        ))
    }

    fn join_worker(&self, handle: JoinHandle<()>) {
        let deadline = Instant::now() + self.config.join_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        if handle.is_finished() {
            if handle.join().is_err() {
                warn!("Sampler thread for PID {} panicked", self.target.pid);
            }
        } else {
            warn!(
                "Sampler thread for PID {} did not exit within {:?}; reporting collected data",
                self.target.pid, self.config.join_timeout
            );
        }
    }
}

impl Drop for SocketMonitor {
    fn drop(&mut self) {
        self.stop_signal.set(StopReason::Requested);
    }
}

/// State moved onto the background thread.
struct Sampler {
    pid: u32,
    interval: Duration,
    deadline: Option<Instant>,
    source: Arc<dyn ProcessSource>,
    enumerator: ConnectionEnumerator,
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
    stop_signal: StopSignal,
}

impl Sampler {
    fn run(self, started: Instant) {
        let mut next_tick = started;

        while !self.stop_signal.is_set() {
            if let Some(reason) = self.tick() {
                self.stop_signal.set(reason);
                break;
            }

            next_tick = next_deadline(next_tick, self.interval, Instant::now());
            let wake_at = match self.deadline {
                Some(deadline) => next_tick.min(deadline),
                None => next_tick,
            };
            let wait = wake_at.saturating_duration_since(Instant::now());
            if !wait.is_zero() && self.stop_signal.wait_timeout(wait) {
                break;
            }
        }
    }

    /// One sampling pass; returns a reason when the session must end.
    fn tick(&self) -> Option<StopReason> {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            info!("Duration limit reached");
            return Some(StopReason::DurationElapsed);
        }

        if !self.source.is_alive(self.pid) {
            info!("Process {} no longer exists", self.pid);
            return Some(StopReason::ProcessExited);
        }

        match self.enumerator.enumerate(self.pid) {
            Ok(records) => {
                let snapshot = Snapshot::capture(records);
                let line = snapshot.progress_line();
                let time = snapshot.timestamp.format("%H:%M:%S").to_string();
                lock(&self.snapshots).push(snapshot);
                if !self.stop_signal.is_set() {
                    info!("[{}] {}", time, line);
                }
                None
            }
            Err(SourceError::ProcessNotFound(pid)) => {
                info!("Process {} no longer exists", pid);
                Some(StopReason::ProcessExited)
            }
            Err(e) => {
                warn!("No data this tick: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::{ConnectionState, RawSocket};
    use crate::core::enumerator::tests::tcp;
    use crate::core::resolver::tests::CountingLookup;
    use std::collections::HashSet;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source whose `connections` call number `fail_on` reports the process
    /// as gone, or returns a transient error when `transient` is set.
    struct ScriptedSource {
        calls: AtomicUsize,
        fail_on: Option<usize>,
        transient: bool,
        alive_for: Option<usize>,
        liveness_checks: AtomicUsize,
        sockets: Vec<RawSocket>,
    }

    impl ScriptedSource {
        fn empty() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: None,
                transient: false,
                alive_for: None,
                liveness_checks: AtomicUsize::new(0),
                sockets: Vec::new(),
            }
        }
    }

    impl ProcessSource for ScriptedSource {
        fn connections(&self, pid: u32) -> Result<Vec<RawSocket>, SourceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(call) {
                return Err(if self.transient {
                    SourceError::Enumeration("netlink hiccup".into())
                } else {
                    SourceError::ProcessNotFound(pid)
                });
            }
            Ok(self.sockets.clone())
        }

        fn is_alive(&self, _pid: u32) -> bool {
            let check = self.liveness_checks.fetch_add(1, Ordering::SeqCst) + 1;
            self.alive_for.map_or(true, |limit| check <= limit)
        }

        fn local_addresses(&self) -> Result<HashSet<IpAddr>, SourceError> {
            Ok(HashSet::new())
        }
    }

    fn monitor_with(source: ScriptedSource, config: MonitorConfig) -> SocketMonitor {
        let resolver = Arc::new(HostnameResolver::new(Arc::new(CountingLookup::new())));
        SocketMonitor::new(TargetProcess::new(777, "worker"), config, Arc::new(source), resolver)
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig::default().with_interval(Duration::from_millis(100))
    }

    fn wait_until_stopped(monitor: &SocketMonitor) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.is_running() && Instant::now() < deadline {
            monitor.wait(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_manual_stop_after_350ms() {
        let mut monitor = monitor_with(ScriptedSource::empty(), fast_config());
        assert_eq!(monitor.state(), MonitorState::Idle);

        monitor.start().unwrap();
        assert_eq!(monitor.state(), MonitorState::Running);
        thread::sleep(Duration::from_millis(350));
        let report = monitor.stop().unwrap();

        assert_eq!(monitor.state(), MonitorState::Stopped);
        assert!((3..=4).contains(&report.total_snapshots), "got {}", report.total_snapshots);
        assert!(
            (0.30..=0.45).contains(&report.duration_seconds),
            "duration {}",
            report.duration_seconds
        );
        assert_eq!(report.stop_reason, StopReason::Requested);
        assert_eq!(report.max_sockets, 0);
    }

    #[test]
    fn test_process_not_found_stops_loop() {
        let source = ScriptedSource {
            fail_on: Some(3),
            ..ScriptedSource::empty()
        };
        let mut monitor = monitor_with(source, fast_config());

        monitor.start().unwrap();
        wait_until_stopped(&monitor);
        assert_eq!(monitor.state(), MonitorState::Stopped);

        let report = monitor.stop().unwrap();
        assert_eq!(report.total_snapshots, 2);
        assert_eq!(report.stop_reason, StopReason::ProcessExited);
    }

    #[test]
    fn test_liveness_check_stops_loop() {
        let source = ScriptedSource {
            alive_for: Some(2),
            ..ScriptedSource::empty()
        };
        let mut monitor = monitor_with(source, fast_config());

        monitor.start().unwrap();
        wait_until_stopped(&monitor);

        let report = monitor.stop().unwrap();
        assert_eq!(report.total_snapshots, 2);
        assert_eq!(report.stop_reason, StopReason::ProcessExited);
    }

    #[test]
    fn test_transient_error_skips_one_tick() {
        let source = ScriptedSource {
            fail_on: Some(2),
            transient: true,
            alive_for: Some(4),
            ..ScriptedSource::empty()
        };
        let mut monitor = monitor_with(source, MonitorConfig::default().with_interval(Duration::from_millis(20)));

        monitor.start().unwrap();
        wait_until_stopped(&monitor);

        let report = monitor.stop().unwrap();
        assert_eq!(report.total_snapshots, 3);
        assert_eq!(report.stop_reason, StopReason::ProcessExited);
    }

    #[test]
    fn test_duration_limit_stops_loop() {
        let config = fast_config().with_duration(Some(Duration::from_millis(250)));
        let mut monitor = monitor_with(ScriptedSource::empty(), config);

        monitor.start().unwrap();
        wait_until_stopped(&monitor);
        assert!(!monitor.is_running());

        let report = monitor.stop().unwrap();
        assert_eq!(report.stop_reason, StopReason::DurationElapsed);
        assert!((2..=3).contains(&report.total_snapshots), "got {}", report.total_snapshots);
    }

    #[test]
    fn test_stop_interrupts_long_wait() {
        let config = MonitorConfig::default().with_interval(Duration::from_secs(30));
        let mut monitor = monitor_with(ScriptedSource::empty(), config);

        monitor.start().unwrap();
        thread::sleep(Duration::from_millis(50));
        let begun = Instant::now();
        let report = monitor.stop().unwrap();

        assert!(begun.elapsed() < Duration::from_secs(1));
        assert_eq!(report.total_snapshots, 1);
    }

    #[test]
    fn test_snapshots_carry_connections() {
        let source = ScriptedSource {
            sockets: vec![
                tcp("93.184.216.34", 443, ConnectionState::Established),
                tcp("93.184.216.34", 443, ConnectionState::TimeWait),
            ],
            alive_for: Some(1),
            ..ScriptedSource::empty()
        };
        let mut monitor = monitor_with(source, fast_config());

        monitor.start().unwrap();
        wait_until_stopped(&monitor);
        let report = monitor.stop().unwrap();

        assert_eq!(report.total_snapshots, 1);
        assert_eq!(report.max_sockets, 1);
        assert_eq!(report.max_sockets_details[0].remote_hostname, "host-34.test");
        assert_eq!(report.dns_cache.get("93.184.216.34").map(String::as_str), Some("host-34.test"));
    }

    #[test]
    fn test_stop_is_idempotent_and_start_once() {
        let mut monitor = monitor_with(ScriptedSource::empty(), fast_config());
        assert!(matches!(monitor.stop(), Err(MonitorError::NotStarted)));

        monitor.start().unwrap();
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyStarted)));

        let first = monitor.stop().unwrap();
        let second = monitor.stop().unwrap();
        assert_eq!(first.total_snapshots, second.total_snapshots);
        assert!(matches!(monitor.start(), Err(MonitorError::AlreadyStarted)));
    }

    #[test]
    fn test_next_deadline_without_overrun() {
        let t0 = Instant::now();
        let interval = Duration::from_millis(100);
        let next = next_deadline(t0, interval, t0 + Duration::from_millis(30));
        assert_eq!(next, t0 + interval);
    }

    #[test]
    fn test_next_deadline_skips_missed_ticks() {
        let t0 = Instant::now();
        let interval = Duration::from_millis(100);
        let next = next_deadline(t0, interval, t0 + Duration::from_millis(350));
        assert_eq!(next, t0 + Duration::from_millis(400));

        let on_boundary = next_deadline(t0, interval, t0 + Duration::from_millis(200));
        assert_eq!(on_boundary, t0 + Duration::from_millis(300));
    }

    #[test]
    fn test_next_deadline_after_very_long_overrun() {
        let t0 = Instant::now();
        let fifty_days = Duration::from_secs(50 * 24 * 3600);
        let now = t0 + fifty_days + Duration::from_micros(300);

        let next = next_deadline(t0, MIN_INTERVAL, now);

        assert!(next > now);
        assert_eq!(next, t0 + fifty_days + MIN_INTERVAL);
    }

    #[test]
    fn test_next_deadline_zero_interval_still_waits() {
        let t0 = Instant::now();
        let now = t0 + Duration::from_micros(2500);
        let next = next_deadline(t0, Duration::ZERO, now);
        assert_eq!(next, t0 + Duration::from_millis(3));
    }

    #[test]
    fn test_start_rejects_zero_interval() {
        let config = MonitorConfig::default().with_interval(Duration::ZERO);
        let mut monitor = monitor_with(ScriptedSource::empty(), config);

        assert!(matches!(monitor.start(), Err(MonitorError::IntervalTooShort(_))));
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert!(matches!(monitor.stop(), Err(MonitorError::NotStarted)));
    }

    #[test]
    fn test_stop_signal_keeps_first_reason() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.set(StopReason::ProcessExited);
        signal.set(StopReason::Requested);
        assert!(signal.wait_timeout(Duration::from_millis(10)));
        assert_eq!(signal.reason(), Some(StopReason::ProcessExited));
    }
}
