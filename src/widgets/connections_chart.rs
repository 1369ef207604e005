use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style, Stylize},
    symbols,
    widgets::{Axis, Block, BorderType, Chart, Dataset, GraphType, LegendPosition, Widget},
};

use crate::core::report::MonitoringReport;
use crate::core::summary::SessionStatistics;

pub const DEFAULT_WIDTH: u16 = 120;
pub const DEFAULT_HEIGHT: u16 = 32;

/// Remote socket count over time, with the peak and median marked.
pub struct ConnectionsChartWidget {
    title: String,
    points: Vec<(f64, f64)>,
    peak: (f64, f64),
    median: f64,
    first_label: String,
    last_label: String,
}

impl ConnectionsChartWidget {
    /// `None` when the session produced no snapshots.
    pub fn from_report(report: &MonitoringReport) -> Option<Self> {
        let first = report.snapshots.first()?;
        let last = report.snapshots.last()?;
        let peak = report.peak_snapshot()?;

        let offset = |epoch: f64| epoch - first.timestamp_epoch;
        let points = report
            .snapshots
            .iter()
            .map(|s| (offset(s.timestamp_epoch), s.total_count as f64))
            .collect();
        let stats = SessionStatistics::from_counts(&report.total_counts());

        Some(Self {
            title: format!("Remote Sockets: {} (PID: {})", report.process_name, report.process_id),
            points,
            peak: (offset(peak.timestamp_epoch), peak.total_count as f64),
            median: stats.median,
            first_label: first.timestamp.format("%H:%M:%S").to_string(),
            last_label: last.timestamp.format("%H:%M:%S").to_string(),
        })
    }

    /// Rounds `max` up to one significant digit so the axis ends on a round
    /// number.
    fn y_ceiling(max: f64) -> f64 {
        if max <= 0.0 {
            return 1.0;
        }
        let magnitude = max.log10().floor() as i32;
        let base = 10f64.powi(magnitude);
        (max / base).ceil() * base
    }

    fn x_span(&self) -> f64 {
        self.points.last().map(|(x, _)| *x).unwrap_or(0.0).max(1e-3)
    }

    /// Draws the chart off-screen and returns it as plain text lines.
    pub fn render_to_string(&self, width: u16, height: u16) -> String {
        let area = Rect::new(0, 0, width, height);
        let mut buf = Buffer::empty(area);
        self.render(area, &mut buf);

        let mut lines = Vec::with_capacity(height as usize);
        for y in area.top()..area.bottom() {
            let mut line = String::with_capacity(width as usize);
            for x in area.left()..area.right() {
                line.push_str(buf.cell((x, y)).map(|cell| cell.symbol()).unwrap_or(" "));
            }
            lines.push(line.trim_end().to_string());
        }
        lines.join("\n")
    }
}

impl Widget for &ConnectionsChartWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let x_max = self.x_span();
        let y_max = ConnectionsChartWidget::y_ceiling(self.peak.1);
        let median_line = [(0.0, self.median), (x_max, self.median)];
        let peak_point = [self.peak];

        let datasets = vec![
            Dataset::default()
                .name("Remote Sockets")
                .marker(symbols::Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Blue))
                .data(&self.points),
            Dataset::default()
                .name(format!("Median: {:.0}", self.median))
                .marker(symbols::Marker::Dot)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(Color::Yellow))
                .data(&median_line),
            Dataset::default()
                .name(format!("Max: {}", self.peak.1 as usize))
                .marker(symbols::Marker::Block)
                .graph_type(GraphType::Scatter)
                .style(Style::default().fg(Color::Red))
                .data(&peak_point),
        ];

        let chart = Chart::new(datasets)
            .block(
                Block::bordered()
                    .title(self.title.as_str())
                    .title_style(Style::new().bold().fg(Color::Cyan))
                    .border_type(BorderType::Plain)
                    .border_style(Style::new().fg(Color::Blue)),
            )
            .x_axis(
                Axis::default()
                    .title("Time")
                    .bounds([0.0, x_max])
                    .labels(vec![self.first_label.clone(), self.last_label.clone()]),
            )
            .y_axis(
                Axis::default()
                    .title("Concurrent Remote Sockets")
                    .bounds([0.0, y_max])
                    .labels(vec!["0".to_string(), format!("{}", y_max as u64)]),
            )
            .legend_position(Some(LegendPosition::TopLeft));

        chart.render(area, buf);
    }
}
