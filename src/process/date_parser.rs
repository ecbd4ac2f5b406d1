use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::instrument;

use super::TARGET_TZ;
use crate::{Error, Result, Table, Value};

/// Parse an API timestamp as a UTC instant.
///
/// Accepts RFC 3339 (`2022-11-15T03:04:05.000Z`), the API's compact offset
/// form (`2022-11-15T03:04:05.000+0000`), naive date-times (taken as UTC)
/// and bare dates (midnight UTC).
pub fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// The instant of `value` in the target zone, or `None` for a null/blank cell.
pub fn to_target(value: &Value, field: &str) -> Result<Option<DateTime<Tz>>> {
    let malformed = |v: String| Error::MalformedTimestamp {
        field: field.to_string(),
        value: v,
    };
    match value {
        Value::Null => Ok(None),
        Value::Timestamp(ts) => Ok(Some(ts.with_timezone(&TARGET_TZ))),
        Value::Text(s) if s.trim().is_empty() => Ok(None),
        Value::Text(s) => parse_utc(s)
            .map(|dt| Some(dt.with_timezone(&TARGET_TZ)))
            .ok_or_else(|| malformed(s.clone())),
        other => Err(malformed(other.to_string())),
    }
}

/// Convert every listed column to the target zone in place.
#[instrument(level = "debug", skip(table), fields(rows = table.len()))]
pub fn normalize_timestamps(mut table: Table, fields: &[&str]) -> Result<Table> {
    for field in fields {
        let idx = table.require_column(field)?;
        for row in table.rows.iter_mut() {
            row[idx] = match to_target(&row[idx], field)? {
                Some(ts) => Value::Timestamp(ts),
                None => Value::Null,
            };
        }
    }
    Ok(table)
}
