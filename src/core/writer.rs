use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::info;

use super::error::ReportError;
use super::report::MonitoringReport;
use super::summary::ReportSummary;
use crate::widgets::connections_chart::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::widgets::ConnectionsChartWidget;

/// Paths of the artifacts written for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedReport {
    pub json: PathBuf,
    pub summary: PathBuf,
    pub chart: Option<PathBuf>,
    pub summary_text: String,
}

/// Writes the JSON report, the text summary and the optional chart.
pub struct ReportWriter {
    output_dir: PathBuf,
    with_chart: bool,
}

/// Process name made safe for use inside a file name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "process".to_string()
    } else {
        cleaned
    }
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            with_chart: true,
        }
    }

    pub fn with_chart(mut self, with_chart: bool) -> Self {
        self.with_chart = with_chart;
        self
    }

    pub fn base_name(report: &MonitoringReport, at: DateTime<Local>) -> String {
        format!(
            "socket_report_{}_{}",
            sanitize_name(&report.process_name),
            at.format("%Y%m%d_%H%M%S")
        )
    }

    pub fn save(&self, report: &MonitoringReport) -> Result<SavedReport, ReportError> {
        self.save_as(report, &Self::base_name(report, Local::now()))
    }

    pub fn save_as(&self, report: &MonitoringReport, base_name: &str) -> Result<SavedReport, ReportError> {
        fs::create_dir_all(&self.output_dir)?;

        let json = self.output_dir.join(format!("{}.json", base_name));
        fs::write(&json, report.to_json()?)?;
        info!("JSON report saved to: {}", json.display());

        self.write_derived(report, base_name, json)
    }

    /// Writes the summary and chart derived from `report`.
    fn write_derived(&self, report: &MonitoringReport, base_name: &str, json: PathBuf) -> Result<SavedReport, ReportError> {
        fs::create_dir_all(&self.output_dir)?;

        let chart = if self.with_chart {
            self.write_chart(report, base_name)?
        } else {
            None
        };

        let summary_text = ReportSummary::from_report(report).render(report);
        let summary = self.output_dir.join(format!("{}_summary.txt", base_name));
        fs::write(&summary, &summary_text)?;
        info!("Summary saved to: {}", summary.display());

        Ok(SavedReport {
            json,
            summary,
            chart,
            summary_text,
        })
    }

    fn write_chart(&self, report: &MonitoringReport, base_name: &str) -> Result<Option<PathBuf>, ReportError> {
        let Some(chart) = ConnectionsChartWidget::from_report(report) else {
            info!("No data to graph");
            return Ok(None);
        };

        let path = self.output_dir.join(format!("{}_chart.txt", base_name));
        fs::write(&path, chart.render_to_string(DEFAULT_WIDTH, DEFAULT_HEIGHT))?;
        info!("Graph saved to: {}", path.display());
        Ok(Some(path))
    }
}

/// Re-renders the summary and chart next to a saved JSON report.
pub fn summarize_saved(path: &Path, with_chart: bool) -> Result<SavedReport, ReportError> {
    let report = MonitoringReport::load(path)?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let base_name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| ReportWriter::base_name(&report, Local::now()));

    ReportWriter::new(dir)
        .with_chart(with_chart)
        .write_derived(&report, &base_name, path.to_path_buf())
}
