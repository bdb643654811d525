//! Refresh functions: RF1 inserts new orders, RF2 deletes old ones.
//!
//! A refresh unit `n` reads three files from the data directory:
//!
//! | File                  | Used by | Content                          |
//! |-----------------------|---------|----------------------------------|
//! | `lineitem.tbl.u<n>`   | RF1     | new `lineitem` rows              |
//! | `orders.tbl.u<n>`     | RF1     | new `orders` rows                |
//! | `delete.<n>`          | RF2     | order keys to delete, one a row  |
//!
//! The refresh stream applies RF1 and RF2 of a unit in one transaction, so a
//! unit is either fully applied or not at all.

use crate::database::copy_from_file;
use crate::datafile::{for_each_row, value_as_key, DataFormat};
use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Paths of the three files making up one refresh unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshFiles {
    pub lineitem: PathBuf,
    pub orders: PathBuf,
    pub delete: PathBuf,
}

impl RefreshFiles {
    pub fn new(data_dir: &Path, unit: u32, format: DataFormat) -> Self {
        let ext = format.extension();
        Self {
            lineitem: data_dir.join(format!("lineitem.tbl.u{unit}{ext}")),
            orders: data_dir.join(format!("orders.tbl.u{unit}{ext}")),
            delete: data_dir.join(format!("delete.{unit}{ext}")),
        }
    }
}

/// Row counts touched by one refresh operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub lineitem_inserted: u64,
    pub orders_inserted: u64,
    pub orders_deleted: u64,
    pub lineitem_deleted: u64,
}

/// Timing of one refresh unit run by the refresh stream.
#[derive(Debug, Clone, Copy)]
pub struct RefreshTiming {
    pub unit: u32,
    pub elapsed: Duration,
    pub stats: RefreshStats,
}

/// Runs refresh functions against files in one data directory.
#[derive(Debug, Clone)]
pub struct Refresher {
    data_dir: PathBuf,
    format: DataFormat,
}

impl Refresher {
    pub fn new(data_dir: impl Into<PathBuf>, format: DataFormat) -> Self {
        Self {
            data_dir: data_dir.into(),
            format,
        }
    }

    pub fn files(&self, unit: u32) -> RefreshFiles {
        RefreshFiles::new(&self.data_dir, unit, self.format)
    }

    /// RF1 on its own: insert the unit's new orders and line items.
    pub fn rf1(&self, conn: &mut Connection, unit: u32) -> Result<RefreshStats> {
        let files = self.files(unit);
        let tx = conn.transaction()?;
        let stats = self.insert_new_rows(&tx, &files)?;
        tx.commit()?;
        Ok(stats)
    }

    /// RF2 on its own: delete the unit's listed orders and their line items.
    pub fn rf2(&self, conn: &mut Connection, unit: u32) -> Result<RefreshStats> {
        let files = self.files(unit);
        let tx = conn.transaction()?;
        let stats = self.delete_old_rows(&tx, &files)?;
        tx.commit()?;
        Ok(stats)
    }

    /// RF1 followed by RF2 as a single all-or-nothing transaction.
    pub fn run_unit(&self, conn: &mut Connection, unit: u32) -> Result<RefreshStats> {
        let files = self.files(unit);
        let tx = conn.transaction()?;
        let inserted = self.insert_new_rows(&tx, &files)?;
        let deleted = self.delete_old_rows(&tx, &files)?;
        tx.commit()?;
        Ok(RefreshStats {
            lineitem_inserted: inserted.lineitem_inserted,
            orders_inserted: inserted.orders_inserted,
            orders_deleted: deleted.orders_deleted,
            lineitem_deleted: deleted.lineitem_deleted,
        })
    }

    /// Run every unit in `units`, in order, on one connection.
    pub fn run_stream(
        &self,
        conn: &mut Connection,
        units: RangeInclusive<u32>,
    ) -> Result<Vec<RefreshTiming>> {
        let mut timings = Vec::new();
        for unit in units {
            println!("start refresh {unit}");
            let start = Instant::now();
            let stats = self
                .run_unit(conn, unit)
                .with_context(|| format!("refresh unit {unit}"))?;
            let elapsed = start.elapsed();
            println!("done refresh {unit}");
            log::debug!("Refresh {unit} took {:.3}s: {stats:?}", elapsed.as_secs_f64());
            timings.push(RefreshTiming {
                unit,
                elapsed,
                stats,
            });
        }
        Ok(timings)
    }

    fn insert_new_rows(&self, tx: &Transaction, files: &RefreshFiles) -> Result<RefreshStats> {
        let lineitem_inserted = copy_from_file(tx, "lineitem", &files.lineitem, self.format)?;
        let orders_inserted = copy_from_file(tx, "orders", &files.orders, self.format)?;
        Ok(RefreshStats {
            lineitem_inserted,
            orders_inserted,
            ..RefreshStats::default()
        })
    }

    fn delete_old_rows(&self, tx: &Transaction, files: &RefreshFiles) -> Result<RefreshStats> {
        // SQLite cannot read the delete list from SQL, so stage the keys in a
        // temporary table private to this connection and delete via subquery.
        tx.execute_batch(
            "CREATE TEMP TABLE IF NOT EXISTS refresh_keys (orderkey INTEGER PRIMARY KEY);
             DELETE FROM temp.refresh_keys;",
        )?;
        {
            let mut stmt =
                tx.prepare_cached("INSERT OR IGNORE INTO temp.refresh_keys (orderkey) VALUES (?1)")?;
            for_each_row(&files.delete, self.format, |row| {
                let key = row
                    .first()
                    .context("empty row in delete file")
                    .and_then(value_as_key)?;
                stmt.execute([key])?;
                Ok(())
            })?;
        }

        let orders_deleted = tx.execute(
            "DELETE FROM orders WHERE o_orderkey IN (SELECT orderkey FROM temp.refresh_keys)",
            [],
        )? as u64;
        let lineitem_deleted = tx.execute(
            "DELETE FROM lineitem WHERE l_orderkey IN (SELECT orderkey FROM temp.refresh_keys)",
            [],
        )? as u64;

        Ok(RefreshStats {
            orders_deleted,
            lineitem_deleted,
            ..RefreshStats::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_dbgen_convention() {
        let files = RefreshFiles::new(Path::new("gen/sf1"), 3, DataFormat::Tbl);
        assert_eq!(files.lineitem, PathBuf::from("gen/sf1/lineitem.tbl.u3"));
        assert_eq!(files.orders, PathBuf::from("gen/sf1/orders.tbl.u3"));
        assert_eq!(files.delete, PathBuf::from("gen/sf1/delete.3"));
    }

    #[test]
    fn parquet_file_names_gain_a_suffix() {
        let files = RefreshFiles::new(Path::new("d"), 12, DataFormat::Parquet);
        assert_eq!(files.lineitem, PathBuf::from("d/lineitem.tbl.u12.parquet"));
        assert_eq!(files.orders, PathBuf::from("d/orders.tbl.u12.parquet"));
        assert_eq!(files.delete, PathBuf::from("d/delete.12.parquet"));
    }
}
