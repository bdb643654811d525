//! Query streams: the 22 TPC-H queries run back to back in a stream-specific
//! order.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::time::{Duration, Instant};
use tpch_core::queries::{query_text, stream_order};

/// Whether query streams execute their queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    /// Streams are launched and joined but run no SQL.
    #[default]
    Placeholder,
    /// Streams run all 22 queries and drain every result row.
    Execute,
}

/// Timing of one query within a stream.
#[derive(Debug, Clone, Copy)]
pub struct QueryTiming {
    pub stream: usize,
    pub query: u8,
    pub elapsed: Duration,
    pub rows: u64,
}

/// Run query stream `stream` on `conn`.
///
/// In [`QueryMode::Placeholder`] this returns immediately with no timings.
pub fn run_stream(conn: &Connection, stream: usize, mode: QueryMode) -> Result<Vec<QueryTiming>> {
    if mode == QueryMode::Placeholder {
        return Ok(Vec::new());
    }

    let order = stream_order(stream);
    let mut timings = Vec::with_capacity(order.len());
    for &query in order {
        let timing = run_query(conn, stream, query)
            .with_context(|| format!("stream {stream}, query {query}"))?;
        log::debug!(
            "Stream {stream} Q{query}: {} rows in {:.3}s",
            timing.rows,
            timing.elapsed.as_secs_f64()
        );
        timings.push(timing);
    }
    Ok(timings)
}

fn run_query(conn: &Connection, stream: usize, query: u8) -> Result<QueryTiming> {
    let sql = query_text(query).with_context(|| format!("no such query Q{query}"))?;
    let start = Instant::now();
    let mut stmt = conn.prepare(sql)?;
    let mut result = stmt.query([])?;
    let mut rows = 0u64;
    while result.next()?.is_some() {
        rows += 1;
    }
    Ok(QueryTiming {
        stream,
        query,
        elapsed: start.elapsed(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_mode_runs_nothing() {
        // No tables exist, so any executed query would fail.
        let conn = Connection::open_in_memory().unwrap();
        let timings = run_stream(&conn, 1, QueryMode::Placeholder).unwrap();
        assert!(timings.is_empty());
    }

    #[test]
    fn execute_mode_reports_the_failing_query() {
        let conn = Connection::open_in_memory().unwrap();
        let err = run_stream(&conn, 1, QueryMode::Execute).unwrap_err();
        // Stream 1 starts with Q21.
        assert!(format!("{err:#}").contains("stream 1, query 21"));
    }
}
