//! Report module: run summary and the final timing lines printed to stdout.

use crate::query_stream::QueryTiming;
use crate::refresh::RefreshTiming;
use std::path::PathBuf;
use std::time::Duration;
use tpch_core::constants::QUERIES_PER_STREAM;
use tpch_core::metrics::{power_at_size, qphh_at_size, throughput_at_size};
use tpch_core::ScaleFactor;

/// Everything measured during one benchmark run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scale_factor: ScaleFactor,
    pub streams: usize,
    pub refresh_sets: u32,
    /// `None` when a cached database was reused.
    pub load_duration: Option<Duration>,
    /// Warm-up RF1 and RF2, run before the timed interval.
    pub rf1: Duration,
    pub rf2: Duration,
    /// Power-test stream (stream 0), empty unless queries were executed.
    pub power_queries: Vec<QueryTiming>,
    pub stream_queries: Vec<QueryTiming>,
    pub refreshes: Vec<RefreshTiming>,
    pub throughput_interval: Duration,
    pub sample_log: Option<PathBuf>,
}

impl RunSummary {
    /// Whether the query streams actually ran their queries.
    pub fn queries_executed(&self) -> bool {
        self.power_queries.len() == QUERIES_PER_STREAM
    }

    pub fn power_at_size(&self) -> Option<f64> {
        let intervals: Vec<Duration> = self.power_queries.iter().map(|q| q.elapsed).collect();
        power_at_size(self.scale_factor, &intervals, self.rf1, self.rf2)
    }

    pub fn throughput_at_size(&self) -> Option<f64> {
        self.queries_executed().then(|| {
            throughput_at_size(self.scale_factor, self.streams, self.throughput_interval)
        })
    }

    pub fn qphh_at_size(&self) -> Option<f64> {
        Some(qphh_at_size(self.power_at_size()?, self.throughput_at_size()?))
    }
}

/// The final summary block, one `name = value` line per metric.
pub fn format_summary(summary: &RunSummary) -> String {
    let load = match summary.load_duration {
        Some(d) => format!("{:.1} seconds", d.as_secs_f64()),
        None => "n/a (ran on cached database)".to_string(),
    };
    let mut out = format!(
        "tpch_load_time                  = {load}\n\
         throughput_measurement_interval = {:.2}\n",
        summary.throughput_interval.as_secs_f64()
    );
    if let Some(power) = summary.power_at_size() {
        out.push_str(&format!("tpch_power_at_size              = {power:.2}\n"));
    }
    if let Some(throughput) = summary.throughput_at_size() {
        out.push_str(&format!("tpch_throughput_at_size         = {throughput:.2}\n"));
    }
    if let Some(qphh) = summary.qphh_at_size() {
        out.push_str(&format!("tpch_qphh_at_size               = {qphh:.2}\n"));
    }
    out
}

/// Print the summary block, preceded by a blank line.
pub fn print_summary(summary: &RunSummary) {
    println!();
    print!("{}", format_summary(summary));
}
