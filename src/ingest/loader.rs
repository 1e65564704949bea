//! CSV loading and column normalisation
//!
//! Reads the raw irradiance export, strips stray whitespace from the header
//! labels, parses the timestamp column into the row index and keeps only the
//! target and configured feature columns, in schema order.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use itertools::Itertools;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::domain::{Schema, TimeSeriesTable};
use crate::error::{Result, SchemaError};

/// Layouts tried in order when no explicit `timestamp_format` is configured
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// What to do with empty or NaN cells in the selected columns
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MissingValuePolicy {
    /// Fail on the first missing cell
    #[default]
    Reject,
    /// Copy the previous row's value; a missing first value still fails
    ForwardFill,
    /// Remove every row with at least one missing cell
    Drop,
}

/// Load and normalise the CSV named by `config.path`
pub fn load_table(config: &DataConfig) -> Result<TimeSeriesTable> {
    info!(path = %config.path.display(), "loading time series");
    let file = File::open(&config.path)?;
    read_table(BufReader::new(file), config)
}

/// Same as [`load_table`] for any reader (in-memory CSV in tests)
pub fn read_table<R: Read>(reader: R, config: &DataConfig) -> Result<TimeSeriesTable> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let records = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    normalize(&headers, &records, config)
}

/// Strip whitespace from every header label
pub fn normalize_headers(headers: &StringRecord) -> Vec<String> {
    headers.iter().map(|h| h.trim().to_string()).collect()
}

/// Build a typed table from raw CSV records.
///
/// Only the timestamp, target and feature columns are read; anything else in
/// the file is ignored.
pub fn normalize(
    headers: &StringRecord,
    records: &[StringRecord],
    config: &DataConfig,
) -> Result<TimeSeriesTable> {
    let headers = normalize_headers(headers);
    let locate = |name: &str| -> Result<usize> {
        headers.iter().position(|h| h == name).ok_or_else(|| {
            SchemaError::MissingColumn {
                column: name.to_string(),
                available: headers.iter().join(", "),
            }
            .into()
        })
    };

    let schema = Schema::new(config.target_column.clone(), &config.feature_columns)?;
    let time_idx = locate(&config.timestamp_column)?;
    let column_idx = schema
        .columns()
        .iter()
        .map(|c| locate(c))
        .collect::<Result<Vec<_>>>()?;

    if records.is_empty() {
        return Err(SchemaError::EmptyTable.into());
    }

    let mut timestamps = Vec::with_capacity(records.len());
    let mut rows: Vec<Vec<Option<f64>>> = Vec::with_capacity(records.len());

    for (i, record) in records.iter().enumerate() {
        let row = i + 1;
        if record.len() != headers.len() {
            return Err(SchemaError::RaggedRow {
                row,
                expected: headers.len(),
                found: record.len(),
            }
            .into());
        }

        let raw_time = &record[time_idx];
        let timestamp = parse_timestamp(raw_time, config.timestamp_format.as_deref()).ok_or_else(
            || SchemaError::InvalidTimestamp {
                row,
                value: raw_time.to_string(),
            },
        )?;
        timestamps.push(timestamp);

        let values = column_idx
            .iter()
            .zip(schema.columns())
            .map(|(&idx, name)| parse_cell(&record[idx], row, name))
            .collect::<Result<Vec<_>>>()?;
        rows.push(values);
    }

    let (timestamps, rows) = apply_missing_policy(
        timestamps,
        rows,
        schema.columns(),
        config.missing_values,
    )?;
    if rows.is_empty() {
        return Err(SchemaError::EmptyTable.into());
    }

    let n_rows = rows.len();
    let values = Array2::from_shape_vec((n_rows, schema.len()), rows.concat())?;
    let table = TimeSeriesTable::new(schema, timestamps, values)?;

    if !table.is_strictly_increasing() {
        warn!("timestamps are not strictly increasing; row order is kept as read");
    }
    debug!(
        rows = table.len(),
        columns = %table.schema().columns().iter().join(", "),
        "normalised table"
    );
    Ok(table)
}

/// Parse a timestamp with an explicit chrono format, or by trying common layouts
pub fn parse_timestamp(value: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(value, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(value, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            });
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|fmt| {
                NaiveDate::parse_from_str(value, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        })
}

fn is_missing(field: &str) -> bool {
    field.is_empty()
        || ["nan", "na", "n/a", "null", "none"]
            .iter()
            .any(|m| field.eq_ignore_ascii_case(m))
}

fn parse_cell(field: &str, row: usize, column: &str) -> Result<Option<f64>> {
    if is_missing(field) {
        return Ok(None);
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_nan() => Ok(None),
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(SchemaError::InvalidNumber {
            row,
            column: column.to_string(),
            value: field.to_string(),
        }
        .into()),
    }
}

fn apply_missing_policy(
    timestamps: Vec<NaiveDateTime>,
    rows: Vec<Vec<Option<f64>>>,
    columns: &[String],
    policy: MissingValuePolicy,
) -> Result<(Vec<NaiveDateTime>, Vec<Vec<f64>>)> {
    let missing = |row: usize, col: usize| SchemaError::MissingValue {
        row: row + 1,
        column: columns[col].clone(),
    };

    match policy {
        MissingValuePolicy::Reject => {
            let mut out = Vec::with_capacity(rows.len());
            for (r, row) in rows.into_iter().enumerate() {
                let filled = row
                    .into_iter()
                    .enumerate()
                    .map(|(c, v)| v.ok_or_else(|| missing(r, c)))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                out.push(filled);
            }
            Ok((timestamps, out))
        }
        MissingValuePolicy::ForwardFill => {
            let mut last: Vec<Option<f64>> = vec![None; columns.len()];
            let mut out = Vec::with_capacity(rows.len());
            let mut filled_cells = 0usize;
            for (r, row) in rows.into_iter().enumerate() {
                let mut filled = Vec::with_capacity(row.len());
                for (c, v) in row.into_iter().enumerate() {
                    let value = match v {
                        Some(v) => v,
                        None => {
                            filled_cells += 1;
                            last[c].ok_or_else(|| missing(r, c))?
                        }
                    };
                    last[c] = Some(value);
                    filled.push(value);
                }
                out.push(filled);
            }
            if filled_cells > 0 {
                info!(filled_cells, "forward-filled missing values");
            }
            Ok((timestamps, out))
        }
        MissingValuePolicy::Drop => {
            let before = rows.len();
            let (timestamps, out): (Vec<_>, Vec<_>) = timestamps
                .into_iter()
                .zip(rows)
                .filter_map(|(ts, row)| {
                    row.into_iter()
                        .collect::<Option<Vec<f64>>>()
                        .map(|row| (ts, row))
                })
                .unzip();
            let dropped = before - out.len();
            if dropped > 0 {
                info!(dropped, "dropped rows with missing values");
            }
            Ok((timestamps, out))
        }
    }
}
