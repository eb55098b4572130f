//! Date literal to epoch conversion for DATE/DATETIME shard keys.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

/// Converts a date or datetime literal to seconds since the Unix epoch.
pub trait EpochParser: Send + Sync {
    fn epoch_from_str(&self, literal: &str) -> Option<i64>;
}

impl<F> EpochParser for F
where
    F: Fn(&str) -> Option<i64> + Send + Sync,
{
    fn epoch_from_str(&self, literal: &str) -> Option<i64> {
        self(literal)
    }
}

/// Default parser. Naive literals are read as UTC.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChronoEpochParser;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

impl EpochParser for ChronoEpochParser {
    fn epoch_from_str(&self, literal: &str) -> Option<i64> {
        let literal = literal.trim();
        for format in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(literal, format) {
                return Some(dt.and_utc().timestamp());
            }
        }
        if let Ok(date) = NaiveDate::parse_from_str(literal, "%Y-%m-%d") {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc().timestamp());
        }
        DateTime::parse_from_rfc3339(literal)
            .ok()
            .map(|dt| dt.timestamp())
    }
}
