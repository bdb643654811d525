//! TPC-H protocol constants: tables, scale factors and the derived stream and
//! refresh-set counts.

use std::fmt;
use std::str::FromStr;

/// The eight TPC-H tables, in the order the loader copies them.
pub const TABLES: [&str; 8] = [
    "customer", "lineitem", "nation", "orders", "part", "partsupp", "region", "supplier",
];

/// Number of queries in one query stream.
pub const QUERIES_PER_STREAM: usize = 22;

/// Minimum number of query streams for each valid scale factor
/// (TPC-H clause 5.3.4).
pub const STREAMS_BY_SCALE_FACTOR: [(u32, usize); 8] = [
    (1, 2),
    (10, 3),
    (30, 4),
    (100, 5),
    (300, 6),
    (1000, 7),
    (3000, 8),
    (10000, 9),
];

/// A validated TPC-H scale factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScaleFactor(u32);

impl ScaleFactor {
    /// Accepts only the scale factors listed in [`STREAMS_BY_SCALE_FACTOR`].
    pub fn new(value: u32) -> anyhow::Result<Self> {
        if STREAMS_BY_SCALE_FACTOR.iter().any(|&(sf, _)| sf == value) {
            Ok(Self(value))
        } else {
            let valid: Vec<String> = STREAMS_BY_SCALE_FACTOR
                .iter()
                .map(|(sf, _)| sf.to_string())
                .collect();
            anyhow::bail!(
                "unsupported scale factor {value}; expected one of {}",
                valid.join(", ")
            )
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Number of concurrent query streams in the throughput test.
    pub fn streams(self) -> usize {
        STREAMS_BY_SCALE_FACTOR
            .iter()
            .find(|&&(sf, _)| sf == self.0)
            .map(|&(_, streams)| streams)
            .unwrap_or(STREAMS_BY_SCALE_FACTOR[0].1)
    }

    /// Number of refresh units run by the refresh stream: ten percent of the
    /// scale factor, never fewer than one.
    pub fn refresh_sets(self) -> u32 {
        ((self.0 as f64 * 0.1).round() as u32).max(1)
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScaleFactor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("scale factor must be a positive integer, got {s:?}"))?;
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_count_follows_lookup_table() {
        let expected = [
            (1, 2),
            (10, 3),
            (30, 4),
            (100, 5),
            (300, 6),
            (1000, 7),
            (3000, 8),
            (10000, 9),
        ];
        for (sf, streams) in expected {
            assert_eq!(ScaleFactor::new(sf).unwrap().streams(), streams, "SF {sf}");
        }
    }

    #[test]
    fn refresh_sets_are_a_tenth_of_scale_factor_with_floor_of_one() {
        let expected = [
            (1, 1),
            (10, 1),
            (30, 3),
            (100, 10),
            (300, 30),
            (1000, 100),
            (3000, 300),
            (10000, 1000),
        ];
        for (sf, sets) in expected {
            assert_eq!(ScaleFactor::new(sf).unwrap().refresh_sets(), sets, "SF {sf}");
        }
    }

    #[test]
    fn unknown_scale_factors_are_rejected() {
        for sf in [0, 2, 5, 20, 99999] {
            assert!(ScaleFactor::new(sf).is_err(), "SF {sf} should be rejected");
        }
    }

    #[test]
    fn parses_from_environment_text() {
        let sf: ScaleFactor = " 30 ".parse().unwrap();
        assert_eq!(sf.get(), 30);
        assert!("ten".parse::<ScaleFactor>().is_err());
        assert!("-1".parse::<ScaleFactor>().is_err());
    }
}
