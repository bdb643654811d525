//! One-time bulk load of the eight TPC-H tables.

use crate::database::{checkpoint, copy_from_file, Database};
use crate::datafile::DataFormat;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};
use tpch_core::constants::TABLES;

/// Outcome of a completed load.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Rows copied per table, in load order.
    pub tables: Vec<(&'static str, u64)>,
    pub duration: Duration,
}

impl LoadReport {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|(_, rows)| rows).sum()
    }
}

/// Build the database from scratch: drop any previous file, apply the schema,
/// copy every `<table>.tbl` from `data_dir` in a single transaction, commit,
/// and optionally checkpoint the WAL into the main file.
pub fn load(
    db: &Database,
    schema_path: &Path,
    data_dir: &Path,
    checkpoint_after: bool,
) -> Result<LoadReport> {
    let start = Instant::now();

    db.remove_files()?;
    let mut conn = db.connect()?;

    let schema = fs::read_to_string(schema_path)
        .with_context(|| format!("reading schema {}", schema_path.display()))?;
    conn.execute_batch(&schema)
        .with_context(|| format!("applying schema {}", schema_path.display()))?;

    let tx = conn.transaction()?;
    let mut tables = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let path = data_dir.join(format!("{table}.tbl"));
        let table_start = Instant::now();
        let rows = copy_from_file(&tx, table, &path, DataFormat::Tbl)
            .with_context(|| format!("loading table {table}"))?;
        log::debug!(
            "Loaded {rows} rows into {table} in {:.2}s",
            table_start.elapsed().as_secs_f64()
        );
        tables.push((table, rows));
    }
    tx.commit()?;

    if checkpoint_after && !checkpoint(&conn)? {
        log::warn!("Checkpoint after load could not complete; database was busy");
    }

    Ok(LoadReport {
        tables,
        duration: start.elapsed(),
    })
}
