//! Error types for each collection step.
//!
//! Every step returns its own error so the pipeline can report one line per
//! failed phase without letting anything escape as a panic.

use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("server answered with HTTP status {0}")]
    HttpStatus(u16),
    #[error("invalid feed url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("malformed GTFS-RT payload: {0}")]
    Malformed(#[from] prost::DecodeError),
}

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error("cannot create archive directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("cannot write table {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("cannot list {path}: {source}")]
    ReadDir { path: PathBuf, source: io::Error },
    #[error("archive io on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("zip error on {path}: {source}")]
    Zip {
        path: PathBuf,
        source: zip::result::ZipError,
    },
}

/// Failure of the save phase (fetch, decode, export).
#[derive(thiserror::Error, Debug)]
pub enum CollectError {
    #[error("fetching feed: {0}")]
    Fetch(#[from] FetchError),
    #[error("decoding feed: {0}")]
    Decode(#[from] DecodeError),
    #[error("exporting feed: {0}")]
    Export(#[from] ExportError),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}
