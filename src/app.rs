use std::io::{self, BufRead};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use crate::cli::Settings;
use crate::core::error::{MonitorError, ReportError};
use crate::core::filters::ConnectionFilter;
use crate::core::monitor::SocketMonitor;
use crate::core::process::{SystemProcessSource, TargetProcess};
use crate::core::report::MonitoringReport;
use crate::core::resolver::HostnameResolver;
use crate::core::writer::{summarize_saved, ReportWriter, SavedReport};
use crate::selector::ProcessSelector;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STOP_COMMAND: &str = "/stop";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("process with PID {0} not found")]
    ProcessNotFound(u32),

    #[error(transparent)]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("unable to register Ctrl+C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("terminal I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Operator commands that end a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Stop,
    Interrupted,
}

/// True for the line that requests a manual stop.
pub fn is_stop_command(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(STOP_COMMAND)
}

pub struct App {
    settings: Settings,
    source: Arc<SystemProcessSource>,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            source: Arc::new(SystemProcessSource::new()),
        }
    }

    pub fn run(&mut self) -> Result<(), AppError> {
        if let Some(path) = self.settings.summarize.clone() {
            let saved = summarize_saved(&path, self.settings.with_chart)?;
            println!("\n{}", saved.summary_text);
            return Ok(());
        }

        println!("\n{}", "=".repeat(60));
        println!("  SOCKET MONITOR - connection reuse investigation tool");
        println!("{}", "=".repeat(60));

        let Some(target) = self.select_target()? else {
            println!("No process selected. Exiting.");
            return Ok(());
        };
        println!("\nSelected: {} (PID: {})", target.name, target.pid);

        let report = self.monitor(target)?;
        let saved = self.save(&report)?;
        println!("\n{}", saved.summary_text);
        Ok(())
    }

    fn select_target(&self) -> Result<Option<TargetProcess>, AppError> {
        if let Some(pid) = self.settings.pid {
            let name = self.source.process_name(pid).ok_or(AppError::ProcessNotFound(pid))?;
            return Ok(Some(TargetProcess::new(pid, name)));
        }

        let processes = self.source.list_processes();
        let stdin = io::stdin();
        let mut selector = ProcessSelector::new(stdin.lock(), io::stdout());
        Ok(selector.select(&processes)?)
    }

    fn monitor(&self, target: TargetProcess) -> Result<MonitoringReport, AppError> {
        let config = self.settings.monitor.clone();
        let resolver = Arc::new(
            HostnameResolver::system()
                .with_timeout(config.dns_timeout)
                .with_max_workers(config.dns_workers),
        );

        let mut monitor = SocketMonitor::new(target, config.clone(), self.source.clone(), resolver);

        let (tx, rx) = mpsc::channel();
        let ctrlc_tx = tx.clone();
        ctrlc::set_handler(move || {
            let _ = ctrlc_tx.send(Command::Interrupted);
        })?;
        // With a duration cap the session may run detached from a terminal.
        spawn_stdin_reader(tx, config.duration.is_none());

        monitor.start()?;
        let target = monitor.target();
        println!("\nMonitoring {} (PID: {})", target.name, target.pid);
        println!("Tracking: {}", ConnectionFilter::new().with_live_only(config.live_only).to_string());
        println!("Excluded: loopback and local addresses");
        println!("DNS resolution: {}", if config.resolve_dns { "enabled" } else { "disabled" });
        if let Some(limit) = config.duration {
            println!("Auto-stop after: {:?}", limit);
        }
        println!("Type '{}' to stop and generate the report.\n", STOP_COMMAND);

        while monitor.is_running() {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(command) => {
                    info!("Received {:?}", command);
                    break;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    monitor.wait(POLL_INTERVAL);
                }
            }
        }

        println!("\nStopping monitor after {} snapshots...", monitor.snapshot_count());
        Ok(monitor.stop()?)
    }

    fn save(&self, report: &MonitoringReport) -> Result<SavedReport, AppError> {
        println!("Generating report...");
        let writer = ReportWriter::new(&self.settings.output_dir).with_chart(self.settings.with_chart);
        Ok(writer.save(report)?)
    }
}

/// Forwards `/stop` from stdin as a [`Command::Stop`]; end of input counts as
/// a stop only when `stop_on_eof` is set.
fn spawn_stdin_reader(tx: Sender<Command>, stop_on_eof: bool) {
    let spawned = thread::Builder::new().name("stdin-commands".to_string()).spawn(move || {
        let stdin = io::stdin();
        let mut requested = false;
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if is_stop_command(&line) => {
                    requested = true;
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!("Unable to read command input: {}", e);
                    break;
                }
            }
        }
        if requested || stop_on_eof {
            let _ = tx.send(Command::Stop);
        }
    });

    if let Err(e) = spawned {
        warn!("Unable to listen for '{}' on stdin: {}", STOP_COMMAND, e);
    }
}
