//! Domain alerts and the flattened rows exported for each run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Joins the translations of a localized text.
pub const DESCRIPTION_SEPARATOR: &str = " | ";

/// Capture time format, minute precision. Also the run id of the output files.
pub const CAPTURE_FORMAT: &str = "%Y-%m-%d_%H-%M";

pub const NO_ALERT_EFFECT: &str = "NO_ALERT";
pub const NO_ALERT_DESCRIPTION: &str = "Aucune alerte active";

/// A window during which an alert applies. `None` is an open bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// An alert as decoded from one feed entity.
///
/// `id`, `cause` and `header` are only logged; the exported row carries
/// effect, description and the period.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Alert {
    pub id: String,
    pub effect: String,
    pub cause: String,
    pub header: String,
    pub description: String,
    pub active_periods: Vec<ActivePeriod>,
}

/// One exported table row: an alert paired with one of its active periods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub extraction_utc: String,
    pub effect: String,
    pub description: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AlertRecord {
    /// Row written when a run captured nothing, so the table is never empty.
    pub fn no_alert(extraction_utc: &str) -> Self {
        Self {
            extraction_utc: extraction_utc.to_string(),
            effect: NO_ALERT_EFFECT.to_string(),
            description: NO_ALERT_DESCRIPTION.to_string(),
            start: None,
            end: None,
        }
    }

    pub fn is_no_alert(&self) -> bool {
        self.effect == NO_ALERT_EFFECT
    }
}

/// Flattens `alerts` into one record per (alert, active period), in feed
/// order then period order.
///
/// Alerts without any active period produce no row. When nothing is
/// produced at all the result is the single [`AlertRecord::no_alert`] row.
pub fn normalize(alerts: &[Alert], capture_time: DateTime<Utc>) -> Vec<AlertRecord> {
    let extraction_utc = capture_time.format(CAPTURE_FORMAT).to_string();
    let stamp = &extraction_utc;

    let records: Vec<AlertRecord> = alerts
        .iter()
        .flat_map(move |alert| {
            alert.active_periods.iter().map(move |period| AlertRecord {
                extraction_utc: stamp.clone(),
                effect: alert.effect.clone(),
                description: alert.description.clone(),
                start: period.start,
                end: period.end,
            })
        })
        .collect();

    if records.is_empty() {
        vec![AlertRecord::no_alert(&extraction_utc)]
    } else {
        records
    }
}
