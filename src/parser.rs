//! Protobuf decoding of GTFS Realtime service alert feeds.

use chrono::{DateTime, Utc};
use prost::Message;
use tracing::{debug, warn};

use crate::alerts::{ActivePeriod, Alert, DESCRIPTION_SEPARATOR};
use crate::error::DecodeError;
use crate::gtfs_rt::{self, FeedMessage, TranslatedString, alert::Cause, alert::Effect};

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the bytes are not valid protobuf for
/// a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, DecodeError> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Decodes `bytes` and extracts every alert it carries.
pub fn decode(bytes: &[u8]) -> Result<Vec<Alert>, DecodeError> {
    let feed = parse_feed(bytes)?;
    Ok(extract_alerts(&feed))
}

/// Converts each entity that carries an alert, in feed order.
pub fn extract_alerts(feed: &FeedMessage) -> Vec<Alert> {
    let alerts: Vec<Alert> = feed
        .entity
        .iter()
        .filter_map(|entity| {
            entity
                .alert
                .as_ref()
                .map(|alert| convert_alert(&entity.id, alert))
        })
        .collect();

    debug!(
        entities = feed.entity.len(),
        alerts = alerts.len(),
        "Alerts extracted"
    );
    alerts
}

fn convert_alert(id: &str, alert: &gtfs_rt::Alert) -> Alert {
    let converted = Alert {
        id: id.to_string(),
        effect: effect_name(alert.effect),
        cause: cause_name(alert.cause),
        header: join_translations(alert.header_text.as_ref()),
        description: join_translations(alert.description_text.as_ref()),
        active_periods: alert
            .active_period
            .iter()
            .map(|range| ActivePeriod {
                start: epoch_to_instant(range.start),
                end: epoch_to_instant(range.end),
            })
            .collect(),
    };

    debug!(
        alert_id = %converted.id,
        effect = %converted.effect,
        cause = %converted.cause,
        header = %converted.header,
        periods = converted.active_periods.len(),
        "Alert decoded"
    );
    converted
}

/// Symbolic name of an effect code. Absent means the schema default.
pub fn effect_name(code: Option<i32>) -> String {
    match code {
        None => Effect::UnknownEffect.as_str_name().to_string(),
        Some(code) => match Effect::try_from(code) {
            Ok(effect) => effect.as_str_name().to_string(),
            Err(_) => {
                warn!(code, "Unrecognized alert effect code");
                Effect::UnknownEffect.as_str_name().to_string()
            }
        },
    }
}

/// Symbolic name of a cause code. Absent means the schema default.
pub fn cause_name(code: Option<i32>) -> String {
    match code {
        None => Cause::UnknownCause.as_str_name().to_string(),
        Some(code) => match Cause::try_from(code) {
            Ok(cause) => cause.as_str_name().to_string(),
            Err(_) => {
                warn!(code, "Unrecognized alert cause code");
                Cause::UnknownCause.as_str_name().to_string()
            }
        },
    }
}

/// Joins every translation of `text`, in order. Empty when there is none.
pub fn join_translations(text: Option<&TranslatedString>) -> String {
    text.map(|t| {
        t.translation
            .iter()
            .map(|tr| tr.text.as_str())
            .collect::<Vec<_>>()
            .join(DESCRIPTION_SEPARATOR)
    })
    .unwrap_or_default()
}

/// The wire format uses 0 for "not specified", so 0 is an open bound and
/// never the epoch.
pub fn epoch_to_instant(secs: Option<u64>) -> Option<DateTime<Utc>> {
    match secs {
        None | Some(0) => None,
        Some(secs) => {
            let instant = i64::try_from(secs)
                .ok()
                .and_then(|s| DateTime::from_timestamp(s, 0));
            if instant.is_none() {
                warn!(secs, "Active period bound out of range, treating as open");
            }
            instant
        }
    }
}
