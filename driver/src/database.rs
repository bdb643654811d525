//! SQLite database handle shared by every benchmark task.
//!
//! [`Database`] plays the role of a connection pool: it is cheap to clone and
//! hands each task its own freshly configured [`Connection`] to the same
//! file, so no connection state is shared between threads.

use crate::datafile::{for_each_row, DataFormat};
use anyhow::{Context, Result};
use rusqlite::{params_from_iter, Connection};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Handle to the benchmark database file.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
    busy_timeout: Duration,
    wal_autocheckpoint_mib: Option<u32>,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
            wal_autocheckpoint_mib: None,
        }
    }

    /// Checkpoint the WAL automatically once it grows past `mib` MiB on every
    /// connection opened from now on.
    pub fn with_wal_autocheckpoint_mib(mut self, mib: u32) -> Self {
        self.wal_autocheckpoint_mib = Some(mib);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Open a new configured connection.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("opening database {}", self.path.display()))?;
        configure_connection(&conn, self.busy_timeout)?;
        if let Some(mib) = self.wal_autocheckpoint_mib {
            set_wal_autocheckpoint(&conn, mib)?;
        }
        Ok(conn)
    }

    /// Delete the database file together with its WAL and shared-memory
    /// companions. Missing files are not an error.
    pub fn remove_files(&self) -> Result<()> {
        for suffix in ["", "-wal", "-shm"] {
            let mut name = self.path.clone().into_os_string();
            name.push(suffix);
            let path = PathBuf::from(name);
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("removing {}", path.display()));
                }
            }
        }
        Ok(())
    }

    /// Replace `dest` with a copy of this database.
    ///
    /// The WAL is checkpointed into the main file first, so copying that one
    /// file is a complete snapshot. Fails if the checkpoint cannot complete.
    pub fn copy_to(&self, dest: &Database) -> Result<()> {
        {
            let conn = self.connect()?;
            anyhow::ensure!(
                checkpoint(&conn)?,
                "database {} is busy; cannot checkpoint before copying",
                self.path.display()
            );
        }
        dest.remove_files()?;
        fs::copy(&self.path, &dest.path).with_context(|| {
            format!(
                "copying {} to {}",
                self.path.display(),
                dest.path.display()
            )
        })?;
        Ok(())
    }
}

/// Configure a connection for concurrent benchmark use.
///
/// WAL mode lets query streams read while the refresh stream writes; the busy
/// timeout makes SQLite wait on a locked file instead of failing with
/// `SQLITE_BUSY`.
pub fn configure_connection(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -131072;
         PRAGMA temp_store = MEMORY;",
    )?;
    Ok(())
}

/// Set `wal_autocheckpoint` to `mib` MiB expressed in pages.
pub fn set_wal_autocheckpoint(conn: &Connection, mib: u32) -> Result<()> {
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
    let pages = (i64::from(mib) * 1024 * 1024 / page_size.max(1)).max(1);
    conn.execute_batch(&format!("PRAGMA wal_autocheckpoint = {pages};"))?;
    Ok(())
}

/// Copy the WAL back into the database file and truncate it.
///
/// Returns `false` when SQLite could not complete the checkpoint because
/// another connection held the database busy.
pub fn checkpoint(conn: &Connection) -> Result<bool> {
    let busy: i64 = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |r| r.get(0))?;
    Ok(busy == 0)
}

/// Number of columns in `table`.
pub fn column_count(conn: &Connection, table: &str) -> Result<usize> {
    let stmt = conn
        .prepare(&format!("SELECT * FROM {table} LIMIT 0"))
        .with_context(|| format!("unknown table {table}"))?;
    Ok(stmt.column_count())
}

/// Number of rows currently in `table`.
pub fn count_rows(conn: &Connection, table: &str) -> Result<u64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
    Ok(count as u64)
}

/// Append every row of a data file to `table`, binding fields positionally.
///
/// This is the SQLite stand-in for a bulk `COPY ... FROM`: one prepared
/// `INSERT` executed per row. Runs on whatever transaction `conn` currently
/// has open. Every row must have exactly as many fields as the table has
/// columns.
pub fn copy_from_file(
    conn: &Connection,
    table: &str,
    path: &Path,
    format: DataFormat,
) -> Result<u64> {
    let columns = column_count(conn, table)?;
    let placeholders: Vec<String> = (1..=columns).map(|i| format!("?{i}")).collect();
    let mut stmt = conn.prepare_cached(&format!(
        "INSERT INTO {table} VALUES ({})",
        placeholders.join(", ")
    ))?;

    let rows = for_each_row(path, format, |row| {
        anyhow::ensure!(
            row.len() == columns,
            "{table} has {columns} columns but the row has {} fields",
            row.len()
        );
        stmt.execute(params_from_iter(row.iter()))?;
        Ok(())
    })?;

    log::debug!("Copied {rows} rows into {table} from {}", path.display());
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k INTEGER PRIMARY KEY, name TEXT, price REAL);")
            .unwrap();
        conn
    }

    #[test]
    fn copy_converts_text_by_column_affinity() {
        let conn = memory_conn();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1|one|1.50|\n2|two|2.25|\n").unwrap();

        let rows = copy_from_file(&conn, "t", file.path(), DataFormat::Tbl).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(count_rows(&conn, "t").unwrap(), 2);

        let (k, price): (i64, f64) = conn
            .query_row("SELECT k, price FROM t WHERE name = 'two'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(k, 2);
        assert!((price - 2.25).abs() < 1e-9);
    }

    #[test]
    fn copy_rejects_rows_with_wrong_arity() {
        let conn = memory_conn();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "1|one|1.0|\n2|two|\n").unwrap();

        let err = copy_from_file(&conn, "t", file.path(), DataFormat::Tbl).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("line 2"), "{msg}");
        assert!(msg.contains("3 columns"), "{msg}");
    }

    #[test]
    fn column_count_of_unknown_table_fails() {
        let conn = memory_conn();
        assert_eq!(column_count(&conn, "t").unwrap(), 3);
        assert!(column_count(&conn, "missing").is_err());
    }

    #[test]
    fn remove_files_ignores_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("bench.db"), Duration::from_secs(1));
        db.remove_files().unwrap();

        db.connect().unwrap().execute_batch("CREATE TABLE x (a);").unwrap();
        assert!(db.exists());
        db.remove_files().unwrap();
        assert!(!db.exists());
    }

    #[test]
    fn copy_is_independent_of_the_template() {
        let dir = tempfile::tempdir().unwrap();
        let template = Database::new(dir.path().join("template.db"), Duration::from_secs(1));
        let work = Database::new(dir.path().join("work.db"), Duration::from_secs(1));
        template
            .connect()
            .unwrap()
            .execute_batch("CREATE TABLE x (a INTEGER PRIMARY KEY); INSERT INTO x VALUES (1);")
            .unwrap();

        template.copy_to(&work).unwrap();
        work.connect()
            .unwrap()
            .execute_batch("INSERT INTO x VALUES (2);")
            .unwrap();
        assert_eq!(count_rows(&work.connect().unwrap(), "x").unwrap(), 2);

        // A second copy discards what the previous run wrote.
        template.copy_to(&work).unwrap();
        assert_eq!(count_rows(&work.connect().unwrap(), "x").unwrap(), 1);
        assert_eq!(count_rows(&template.connect().unwrap(), "x").unwrap(), 1);
    }

    #[test]
    fn autocheckpoint_is_expressed_in_pages() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("bench.db"), Duration::from_secs(1))
            .with_wal_autocheckpoint_mib(1);
        let conn = db.connect().unwrap();
        let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0)).unwrap();
        let pages: i64 = conn
            .query_row("PRAGMA wal_autocheckpoint", [], |r| r.get(0))
            .unwrap();
        assert_eq!(pages, 1024 * 1024 / page_size);
    }
}
