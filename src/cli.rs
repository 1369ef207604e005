use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::core::config::MonitorConfig;
use crate::core::monitor::MIN_INTERVAL;

/// Everything the command line controls.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub pid: Option<u32>,
    pub output_dir: PathBuf,
    pub with_chart: bool,
    pub summarize: Option<PathBuf>,
    pub monitor: MonitorConfig,
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value.parse().map_err(|_| format!("'{}' is not a number of seconds", value))?;
    let duration =
        Duration::try_from_secs_f64(secs).map_err(|e| format!("'{}' is not a usable duration: {}", value, e))?;
    if duration.is_zero() {
        return Err(format!("'{}' must be greater than zero", value));
    }
    Ok(duration)
}

fn parse_interval(value: &str) -> Result<Duration, String> {
    let interval = parse_seconds(value)?;
    if interval < MIN_INTERVAL {
        return Err(format!("'{}' is shorter than the {:?} minimum interval", value, MIN_INTERVAL));
    }
    Ok(interval)
}

fn parse_workers(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("'{}' must be a positive integer", value)),
    }
}

pub fn command() -> Command {
    Command::new("socketmon")
        .version("0.1.0")
        .about("Monitor the live remote sockets of a process and report on connection reuse")
        .arg(
            Arg::new("pid")
                .short('p')
                .long("pid")
                .help("Process ID to monitor (skips interactive selection)")
                .value_name("PID")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .help("Sampling interval in seconds")
                .value_name("SECONDS")
                .default_value("0.5")
                .value_parser(parse_interval),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .help("Stop automatically after this many seconds")
                .value_name("SECONDS")
                .value_parser(parse_seconds),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Output directory for reports")
                .value_name("DIR")
                .default_value("socket_reports")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("no-dns")
                .long("no-dns")
                .help("Disable reverse DNS lookups for remote addresses")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("dns-timeout")
                .long("dns-timeout")
                .help("Reverse DNS lookup timeout in seconds")
                .value_name("SECONDS")
                .default_value("2.0")
                .value_parser(parse_seconds),
        )
        .arg(
            Arg::new("dns-workers")
                .long("dns-workers")
                .help("Maximum parallel reverse DNS lookups per tick")
                .value_name("N")
                .default_value("10")
                .value_parser(parse_workers),
        )
        .arg(
            Arg::new("all-states")
                .long("all-states")
                .help("Also record closing and listening sockets (TIME_WAIT, CLOSE_WAIT, ...)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-chart")
                .long("no-chart")
                .help("Do not write the time-series chart")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("summarize")
                .long("summarize")
                .help("Regenerate summary and chart from a saved JSON report, then exit")
                .value_name("REPORT")
                .value_parser(clap::value_parser!(PathBuf)),
        )
}

pub fn settings_from(matches: &ArgMatches) -> Settings {
    let defaults = MonitorConfig::default();
    let interval = matches.get_one::<Duration>("interval").copied().unwrap_or(defaults.interval);

    let monitor = MonitorConfig {
        dns_timeout: matches.get_one::<Duration>("dns-timeout").copied().unwrap_or(defaults.dns_timeout),
        dns_workers: matches.get_one::<usize>("dns-workers").copied().unwrap_or(defaults.dns_workers),
        live_only: !matches.get_flag("all-states"),
        ..defaults
    }
    .with_interval(interval)
    .with_duration(matches.get_one::<Duration>("duration").copied())
    .with_dns(!matches.get_flag("no-dns"));

    Settings {
        pid: matches.get_one::<u32>("pid").copied(),
        output_dir: matches
            .get_one::<PathBuf>("output")
            .cloned()
            .unwrap_or_else(|| PathBuf::from("socket_reports")),
        with_chart: !matches.get_flag("no-chart"),
        summarize: matches.get_one::<PathBuf>("summarize").cloned(),
        monitor,
    }
}

pub fn parse_args() -> Settings {
    settings_from(&command().get_matches())
}
