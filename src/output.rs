//! Persistence of a run: the raw payload and the alert table.
//!
//! Both files share the run id derived from the capture time, e.g.
//! `gtfs_rt_sa_2023-11-14_12-00.pb` and `gtfs_rt_sa_2023-11-14_12-00.csv`.

use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::alerts::{AlertRecord, CAPTURE_FORMAT};
use crate::error::ExportError;

pub const RAW_EXTENSION: &str = "pb";
pub const TABLE_EXTENSION: &str = "csv";

/// Column order of the alert table, matching the fields of [`AlertRecord`].
pub const TABLE_COLUMNS: [&str; 5] = [
    "extraction_utc",
    "effect",
    "description",
    "start",
    "end",
];

/// Identifier shared by the files of one run: capture time as `YYYY-MM-DD_HH-MM`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunId(String);

impl RunId {
    pub fn from_capture(capture_time: DateTime<Utc>) -> Self {
        Self(capture_time.format(CAPTURE_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the capture time from a `<prefix>_<run id>.<ext>` file name.
    pub fn capture_from_file_name(path: &Path) -> Option<DateTime<Utc>> {
        let stem = path.file_stem()?.to_str()?;
        // The run id is the last 16 characters: YYYY-MM-DD_HH-MM
        let run_id = stem.get(stem.len().checked_sub(16)?..)?;
        chrono::NaiveDateTime::parse_from_str(run_id, CAPTURE_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportPaths {
    pub raw: PathBuf,
    pub table: PathBuf,
}

impl ExportPaths {
    pub fn new(dir: &Path, prefix: &str, run_id: &RunId) -> Self {
        Self {
            raw: dir.join(format!("{prefix}_{run_id}.{RAW_EXTENSION}")),
            table: dir.join(format!("{prefix}_{run_id}.{TABLE_EXTENSION}")),
        }
    }
}

/// Writes the raw payload and the alert table of one run into `dir`.
///
/// The raw file is written first and stays on disk even if the table write
/// fails afterwards.
#[tracing::instrument(skip_all, fields(dir = %dir.display(), run_id = %run_id))]
pub fn export(
    dir: &Path,
    prefix: &str,
    raw: &[u8],
    records: &[AlertRecord],
    run_id: &RunId,
) -> Result<ExportPaths, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let paths = ExportPaths::new(dir, prefix, run_id);

    write_raw(&paths.raw, raw)?;
    info!(path = %paths.raw.display(), bytes = raw.len(), "Raw feed saved");

    write_table(&paths.table, records)?;
    info!(path = %paths.table.display(), rows = records.len(), "Alert table written");

    Ok(paths)
}

/// Writes `raw` verbatim, replacing any previous file.
pub fn write_raw(path: &Path, raw: &[u8]) -> Result<(), ExportError> {
    fs::write(path, raw).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes `records` as CSV, replacing any previous file.
///
/// The header row is always written, so an empty slice still yields a
/// table with its columns.
pub fn write_table(path: &Path, records: &[AlertRecord]) -> Result<(), ExportError> {
    debug!(path = %path.display(), rows = records.len(), "Writing CSV table");
    let file = File::create(path).map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    writer
        .write_record(TABLE_COLUMNS)
        .map_err(|source| ExportError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
    for record in records {
        writer
            .serialize(record)
            .map_err(|source| ExportError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
    }
    writer.flush().map_err(|source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(())
}

/// Reads back a table written by [`write_table`].
pub fn read_records(path: &Path) -> Result<Vec<AlertRecord>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    reader.deserialize().collect()
}

/// Renders a value as pretty-printed JSON.
pub fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}
