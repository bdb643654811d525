//! Benchmark configuration, read from the environment.
//!
//! `SF` is the only required variable. Everything else has a default that
//! reproduces the standard run layout (`gen/sf<SF>`, `schema.sql`, log in the
//! working directory). An optional `.env` file is loaded by `main` before the
//! environment is read.

use crate::datafile::DataFormat;
use crate::query_stream::QueryMode;
use anyhow::{Context, Result};
use log::LevelFilter;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tpch_core::ScaleFactor;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub scale_factor: ScaleFactor,
    /// Directory holding `<table>.tbl` and the refresh files.
    pub data_dir: PathBuf,
    /// DDL applied before loading.
    pub schema_path: PathBuf,
    /// Freshly loaded database, copied to `database_path` before every run.
    pub template_path: PathBuf,
    /// Working database the refreshes and queries run against.
    pub database_path: PathBuf,
    /// Directory the sampler log is written to.
    pub log_dir: PathBuf,
    pub refresh_format: DataFormat,
    /// Checkpoint the WAL after loading.
    pub checkpoint: bool,
    /// Skip loading when the template already exists.
    pub reuse_database: bool,
    pub query_mode: QueryMode,
    pub busy_timeout: Duration,
    pub log_level: LevelFilter,
    pub log_file: Option<String>,
}

impl BenchConfig {
    /// Defaults for `scale_factor`, relative to the working directory.
    pub fn new(scale_factor: ScaleFactor) -> Self {
        Self {
            scale_factor,
            data_dir: PathBuf::from(format!("gen/sf{scale_factor}")),
            schema_path: PathBuf::from("schema.sql"),
            template_path: PathBuf::from(format!("tpch-sf{scale_factor}.template.db")),
            database_path: PathBuf::from(format!("tpch-sf{scale_factor}.db")),
            log_dir: PathBuf::from("."),
            refresh_format: DataFormat::Tbl,
            checkpoint: true,
            reuse_database: false,
            query_mode: QueryMode::Placeholder,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            log_level: LevelFilter::Info,
            log_file: None,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from `lookup`, which maps variable names to
    /// values the way `std::env::var` does.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let scale_factor: ScaleFactor = get("SF")
            .context("SF must be set to the TPC-H scale factor")?
            .parse()
            .context("invalid SF")?;
        let mut config = Self::new(scale_factor);

        if let Some(v) = get("TPCH_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("TPCH_SCHEMA") {
            config.schema_path = PathBuf::from(v);
        }
        if let Some(v) = get("TPCH_TEMPLATE_DATABASE") {
            config.template_path = PathBuf::from(v);
        }
        if let Some(v) = get("TPCH_DATABASE") {
            config.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("TPCH_LOG_DIR") {
            config.log_dir = PathBuf::from(v);
        }
        if let Some(v) = get("TPCH_REFRESH_FORMAT") {
            config.refresh_format = parse_var("TPCH_REFRESH_FORMAT", &v)?;
        }
        if let Some(v) = get("TPCH_CHECKPOINT") {
            config.checkpoint = parse_bool("TPCH_CHECKPOINT", &v)?;
        }
        if let Some(v) = get("TPCH_REUSE_DATABASE") {
            config.reuse_database = parse_bool("TPCH_REUSE_DATABASE", &v)?;
        }
        if let Some(v) = get("TPCH_RUN_QUERIES") {
            config.query_mode = if parse_bool("TPCH_RUN_QUERIES", &v)? {
                QueryMode::Execute
            } else {
                QueryMode::Placeholder
            };
        }
        if let Some(v) = get("TPCH_BUSY_TIMEOUT_MS") {
            config.busy_timeout = Duration::from_millis(parse_var("TPCH_BUSY_TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("TPCH_LOG_LEVEL") {
            config.log_level = parse_var("TPCH_LOG_LEVEL", &v)?;
        }
        config.log_file = get("TPCH_LOG_FILE");

        Ok(config)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid {key}={value:?}: {e}"))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => anyhow::bail!("invalid {key}={value:?}: expected a boolean"),
    }
}
