//! TPC-H composite metrics (clause 5.4).

use crate::constants::{QUERIES_PER_STREAM, ScaleFactor};
use std::time::Duration;

/// Intervals shorter than this are rounded up before entering the geometric
/// mean, as the TPC-H rules require.
pub const MIN_INTERVAL_SECS: f64 = 0.001;

fn interval_secs(d: Duration) -> f64 {
    d.as_secs_f64().max(MIN_INTERVAL_SECS)
}

/// Power@Size: `3600 * SF` divided by the geometric mean of the 22 power-test
/// query intervals and the two refresh-function intervals.
///
/// Returns `None` unless exactly 22 query intervals are supplied.
pub fn power_at_size(
    sf: ScaleFactor,
    query_intervals: &[Duration],
    rf1: Duration,
    rf2: Duration,
) -> Option<f64> {
    if query_intervals.len() != QUERIES_PER_STREAM {
        return None;
    }
    // Sum of logs keeps the product of 24 intervals from overflowing.
    let log_sum: f64 = query_intervals
        .iter()
        .chain([&rf1, &rf2])
        .map(|d| interval_secs(*d).ln())
        .sum();
    let geo_mean = (log_sum / (QUERIES_PER_STREAM + 2) as f64).exp();
    Some(3600.0 * f64::from(sf.get()) / geo_mean)
}

/// Throughput@Size: queries per hour across all streams, scaled by SF.
pub fn throughput_at_size(sf: ScaleFactor, streams: usize, interval: Duration) -> f64 {
    let secs = interval_secs(interval);
    (streams * QUERIES_PER_STREAM * 3600) as f64 / secs * f64::from(sf.get())
}

/// QphH@Size: geometric mean of power and throughput.
pub fn qphh_at_size(power: f64, throughput: f64) -> f64 {
    (power * throughput).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(v: u32) -> ScaleFactor {
        ScaleFactor::new(v).unwrap()
    }

    #[test]
    fn power_with_unit_intervals_is_3600_times_sf() {
        let queries = vec![Duration::from_secs(1); QUERIES_PER_STREAM];
        let power = power_at_size(sf(10), &queries, Duration::from_secs(1), Duration::from_secs(1))
            .unwrap();
        assert!((power - 36_000.0).abs() < 1e-6, "got {power}");
    }

    #[test]
    fn power_requires_a_full_stream() {
        let queries = vec![Duration::from_secs(1); 21];
        assert!(power_at_size(sf(1), &queries, Duration::ZERO, Duration::ZERO).is_none());
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let queries = vec![Duration::ZERO; QUERIES_PER_STREAM];
        let power = power_at_size(sf(1), &queries, Duration::ZERO, Duration::ZERO).unwrap();
        assert!((power - 3600.0 / MIN_INTERVAL_SECS).abs() < 1e-3);
    }

    #[test]
    fn throughput_scales_with_streams_and_sf() {
        let t = throughput_at_size(sf(1), 2, Duration::from_secs(3600));
        assert!((t - 44.0).abs() < 1e-9);
        let t = throughput_at_size(sf(100), 5, Duration::from_secs(1800));
        assert!((t - 22_000.0).abs() < 1e-6);
    }

    #[test]
    fn qphh_is_geometric_mean() {
        assert!((qphh_at_size(4.0, 9.0) - 6.0).abs() < 1e-12);
    }
}
