//! Readers for the data files produced by `dbgen`.
//!
//! `.tbl` files hold one row per line, fields separated by `|`, with a
//! trailing `|` after the last field. Refresh files may alternatively be
//! Parquet, in which case columns are taken positionally in schema order.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use parquet::data_type::Decimal;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use rusqlite::types::Value;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Days from 0001-01-01 (day 1 of the common era) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// On-disk format of refresh files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataFormat {
    /// Pipe-delimited text, as written by `dbgen`.
    #[default]
    Tbl,
    /// Parquet conversion of the same files.
    Parquet,
}

impl DataFormat {
    /// Suffix appended to the `dbgen` file name.
    pub fn extension(self) -> &'static str {
        match self {
            DataFormat::Tbl => "",
            DataFormat::Parquet => ".parquet",
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormat::Tbl => write!(f, "tbl"),
            DataFormat::Parquet => write!(f, "parquet"),
        }
    }
}

impl FromStr for DataFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tbl" | "csv" => Ok(DataFormat::Tbl),
            "parquet" => Ok(DataFormat::Parquet),
            other => anyhow::bail!("unknown data format {other:?}; expected tbl or parquet"),
        }
    }
}

/// Split one `.tbl` line into its fields.
///
/// A single trailing `|` terminates the row and does not start an empty
/// field. Blank lines yield no fields.
pub fn split_tbl_line(line: &str) -> Vec<&str> {
    let line = line.trim_end_matches(['\n', '\r']);
    if line.is_empty() {
        return Vec::new();
    }
    let line = line.strip_suffix('|').unwrap_or(line);
    line.split('|').collect()
}

/// Stream every row of `path` to `on_row`, returning the number of rows.
///
/// The slice passed to `on_row` is reused between rows. Errors from `on_row`
/// are reported with the row number that caused them.
pub fn for_each_row<F>(path: &Path, format: DataFormat, on_row: F) -> Result<u64>
where
    F: FnMut(&[Value]) -> Result<()>,
{
    match format {
        DataFormat::Tbl => read_tbl(path, on_row),
        DataFormat::Parquet => read_parquet(path, on_row),
    }
    .with_context(|| format!("reading {}", path.display()))
}

fn read_tbl<F>(path: &Path, mut on_row: F) -> Result<u64>
where
    F: FnMut(&[Value]) -> Result<()>,
{
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(1 << 20, file);
    let mut line = String::new();
    let mut row: Vec<Value> = Vec::new();
    let mut line_no = 0u64;
    let mut rows = 0u64;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_no += 1;

        let fields = split_tbl_line(&line);
        if fields.is_empty() {
            continue;
        }
        row.clear();
        row.extend(fields.into_iter().map(|f| Value::Text(f.to_owned())));
        on_row(&row).with_context(|| format!("line {line_no}"))?;
        rows += 1;
    }

    Ok(rows)
}

fn read_parquet<F>(path: &Path, mut on_row: F) -> Result<u64>
where
    F: FnMut(&[Value]) -> Result<()>,
{
    let file = File::open(path)?;
    let reader = SerializedFileReader::new(file)?;
    let mut row: Vec<Value> = Vec::new();
    let mut rows = 0u64;

    for record in reader.get_row_iter(None)? {
        let record = record?;
        row.clear();
        row.extend(record.get_column_iter().map(|(_, field)| field_to_value(field)));
        rows += 1;
        on_row(&row).with_context(|| format!("row {rows}"))?;
    }

    Ok(rows)
}

/// Convert a Parquet field into a value SQLite can bind.
pub fn field_to_value(field: &Field) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Integer(i64::from(*b)),
        Field::Byte(v) => Value::Integer(i64::from(*v)),
        Field::Short(v) => Value::Integer(i64::from(*v)),
        Field::Int(v) => Value::Integer(i64::from(*v)),
        Field::Long(v) => Value::Integer(*v),
        Field::UByte(v) => Value::Integer(i64::from(*v)),
        Field::UShort(v) => Value::Integer(i64::from(*v)),
        Field::UInt(v) => Value::Integer(i64::from(*v)),
        Field::ULong(v) => match i64::try_from(*v) {
            Ok(v) => Value::Integer(v),
            Err(_) => Value::Real(*v as f64),
        },
        Field::Float(v) => Value::Real(f64::from(*v)),
        Field::Double(v) => Value::Real(*v),
        Field::Decimal(d) => Value::Real(decimal_to_f64(d)),
        Field::Str(s) => Value::Text(s.clone()),
        Field::Bytes(b) => match std::str::from_utf8(b.data()) {
            Ok(s) => Value::Text(s.to_owned()),
            Err(_) => Value::Blob(b.data().to_vec()),
        },
        Field::Date(days) => Value::Text(date_from_epoch_days(*days)),
        other => Value::Text(other.to_string()),
    }
}

/// Unscaled big-endian two's-complement bytes divided by `10^scale`.
pub fn decimal_to_f64(decimal: &Decimal) -> f64 {
    let bytes = decimal.data();
    let negative = bytes.first().is_some_and(|b| b & 0x80 != 0);
    let mut unscaled: i128 = if negative { -1 } else { 0 };
    for &b in bytes {
        unscaled = (unscaled << 8) | i128::from(b);
    }
    unscaled as f64 / 10f64.powi(decimal.scale())
}

/// Format a Parquet `DATE` (days since 1970-01-01) as `YYYY-MM-DD`.
pub fn date_from_epoch_days(days: i32) -> String {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| days.to_string())
}

/// Interpret a value as an integer key, as read from a delete file.
pub fn value_as_key(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(v) => Ok(*v),
        Value::Real(v) if v.fract() == 0.0 => Ok(*v as i64),
        Value::Text(s) => s
            .trim()
            .parse()
            .with_context(|| format!("invalid key {s:?}")),
        other => anyhow::bail!("invalid key {other:?}"),
    }
}
