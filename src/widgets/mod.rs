pub mod connections_chart;

pub use self::connections_chart::ConnectionsChartWidget;
