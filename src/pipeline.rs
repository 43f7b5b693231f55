//! One collection run: the save phase followed by the archive phase.
//!
//! The two phases are isolated from each other. A failed save is reported
//! and the archive phase still runs over whatever the directory holds; a
//! failed archive never touches the files the save phase wrote.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::alerts::normalize;
use crate::archive::{ArchiveBundle, archive_day};
use crate::config::Config;
use crate::error::{ArchiveError, CollectError};
use crate::fetch::{HttpClient, fetch_feed};
use crate::output::{ExportPaths, RunId, export};
use crate::parser::decode;

#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub run_id: String,
    pub paths: ExportPaths,
    pub bytes: usize,
    pub alerts: usize,
    pub records: usize,
    pub no_alert: bool,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub save: Option<SaveReport>,
    pub save_error: Option<String>,
    pub archive: Option<ArchiveBundle>,
    pub archive_error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.save_error.is_none() && self.archive_error.is_none()
    }

    /// One line describing both phases, for the console.
    pub fn summary(&self) -> String {
        let save = match (&self.save, &self.save_error) {
            (Some(saved), _) if saved.no_alert => {
                format!("saved {} (no active alert)", saved.run_id)
            }
            (Some(saved), _) => format!(
                "saved {} ({} alerts, {} rows)",
                saved.run_id, saved.alerts, saved.records
            ),
            (None, Some(e)) => format!("save failed: {e}"),
            (None, None) => "save skipped".to_string(),
        };
        let archive = match (&self.archive, &self.archive_error) {
            (Some(bundle), _) => format!(
                "archive {} ({} files)",
                bundle.path.display(),
                bundle.entries.len()
            ),
            (None, Some(e)) => format!("archive failed: {e}"),
            (None, None) => "archive skipped".to_string(),
        };
        format!("{save}; {archive}")
    }
}

/// Fetches the feed, decodes it and writes the raw and tabular files.
#[tracing::instrument(skip_all, fields(url = %config.feed_url, capture = %capture_time))]
pub async fn save<C: HttpClient>(
    config: &Config,
    client: &C,
    capture_time: DateTime<Utc>,
) -> Result<SaveReport, CollectError> {
    let raw = fetch_feed(client, &config.feed_url, config.timeout).await?;
    let alerts = decode(&raw)?;
    let records = normalize(&alerts, capture_time);
    let no_alert = records.len() == 1 && records[0].is_no_alert();

    let run_id = RunId::from_capture(capture_time);
    let paths = export(
        &config.archive_dir,
        &config.file_prefix,
        &raw,
        &records,
        &run_id,
    )?;

    Ok(SaveReport {
        run_id: run_id.to_string(),
        paths,
        bytes: raw.len(),
        alerts: alerts.len(),
        records: records.len(),
        no_alert,
    })
}

/// Rebuilds the bundle of `day` in the configured archive directory.
pub fn archive(config: &Config, day: NaiveDate) -> Result<ArchiveBundle, ArchiveError> {
    archive_day(&config.archive_dir, day)
}

/// Runs both phases once. Errors are logged and recorded in the report,
/// never returned.
pub async fn run<C: HttpClient>(config: &Config, client: &C) -> RunReport {
    let mut report = RunReport::default();

    match save(config, client, Utc::now()).await {
        Ok(saved) => {
            info!(
                run_id = %saved.run_id,
                alerts = saved.alerts,
                records = saved.records,
                no_alert = saved.no_alert,
                "Feed saved"
            );
            report.save = Some(saved);
        }
        Err(e) => {
            error!(error = %e, "Save failed");
            report.save_error = Some(e.to_string());
        }
    }

    // The day is taken now, not from the capture time: a run straddling
    // midnight archives the new day.
    let day = Utc::now().date_naive();
    match archive(config, day) {
        Ok(bundle) => {
            info!(
                bundle = %bundle.path.display(),
                entries = bundle.entries.len(),
                "Archive updated"
            );
            report.archive = Some(bundle);
        }
        Err(e) => {
            error!(error = %e, "Archive failed");
            report.archive_error = Some(e.to_string());
        }
    }

    report
}
