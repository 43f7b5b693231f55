//! Daily zip bundle of a run directory.
//!
//! The bundle for a day is `<YYYY-MM-DD>.zip` in the archive directory. It is
//! rebuilt from scratch every time: the container is opened with
//! create-or-truncate and filled with every file of that day found at that
//! moment, so it always mirrors the directory as of the last archive step.

use chrono::NaiveDate;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ArchiveError;

pub const ARCHIVE_EXTENSION: &str = "zip";
const DAY_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveBundle {
    pub path: PathBuf,
    pub entries: Vec<String>,
}

/// Path of the bundle for `day` inside `dir`.
pub fn bundle_path(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("{}.{ARCHIVE_EXTENSION}", day.format(DAY_FORMAT)))
}

/// Files of `dir` belonging to `day`: regular files whose name contains the
/// date and that are not archives themselves. Sorted by name.
pub fn select_day_files(dir: &Path, day: NaiveDate) -> Result<Vec<PathBuf>, ArchiveError> {
    let day_str = day.format(DAY_FORMAT).to_string();
    let read_dir_err = |source| ArchiveError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut selected = Vec::new();
    for entry in fs::read_dir(dir).map_err(read_dir_err)? {
        let entry = entry.map_err(read_dir_err)?;
        if !entry.file_type().map_err(read_dir_err)?.is_file() {
            continue;
        }

        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if name.contains(&day_str) && !name.ends_with(&format!(".{ARCHIVE_EXTENSION}")) {
            selected.push(entry.path());
        }
    }

    selected.sort();
    Ok(selected)
}

/// Writes every file of `day` found in `dir` into the day's bundle,
/// replacing whatever the bundle held before.
#[tracing::instrument(skip_all, fields(dir = %dir.display(), day = %day))]
pub fn archive_day(dir: &Path, day: NaiveDate) -> Result<ArchiveBundle, ArchiveError> {
    let files = select_day_files(dir, day)?;
    let path = bundle_path(dir, day);
    debug!(files = files.len(), bundle = %path.display(), "Files selected for bundle");

    let zip_err = |source| ArchiveError::Zip {
        path: path.clone(),
        source,
    };

    let bundle = File::create(&path).map_err(|source| ArchiveError::Io {
        path: path.clone(),
        source,
    })?;
    let mut writer = ZipWriter::new(bundle);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Vec::with_capacity(files.len());
    for file in &files {
        let name = file
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        writer.start_file(name.as_str(), options).map_err(zip_err)?;
        let mut input = File::open(file)
            .map(BufReader::new)
            .map_err(|source| ArchiveError::Io {
                path: file.clone(),
                source,
            })?;
        io::copy(&mut input, &mut writer).map_err(|source| ArchiveError::Io {
            path: file.clone(),
            source,
        })?;

        entries.push(name);
    }

    writer.finish().map_err(zip_err)?;

    info!(bundle = %path.display(), entries = entries.len(), "Daily archive written");
    Ok(ArchiveBundle { path, entries })
}

/// Entry names of an existing bundle, sorted by name.
pub fn list_entries(path: &Path) -> Result<Vec<String>, ArchiveError> {
    let file = File::open(path).map_err(|source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let archive = ZipArchive::new(file).map_err(|source| ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
    })?;

    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    Ok(names)
}
