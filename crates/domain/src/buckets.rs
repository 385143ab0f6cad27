//! Time-bucket and dimension-key derivation.
//!
//! Bucket strings are the partition/grouping keys for every stored metric
//! row. Dimension keys are stable hashes of a small tag map, so the same
//! dimensions always land on the same aggregate row across process restarts.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use sha2::{Digest, Sha256};

/// Dimension key used for the un-dimensioned (global) aggregation of a metric.
pub const DEFAULT_DIMENSION_KEY: &str = "default";

/// Number of hex characters kept from the dimension digest.
const DIMENSION_KEY_LEN: usize = 16;

/// Day bucket identifier, e.g. `2026-08-07`.
pub fn day_bucket(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d").to_string()
}

/// Hour bucket identifier, e.g. `2026-08-07-13` (hour is zero-padded).
pub fn hour_bucket(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d-%H").to_string()
}

/// Month bucket identifier, e.g. `2026-08`.
pub fn month_bucket(t: DateTime<Utc>) -> String {
    t.format("%Y-%m").to_string()
}

/// Stable hash of a dimension map.
///
/// Dimensions are joined as `k1=v1&k2=v2` in key order (the `BTreeMap`
/// guarantees the ordering), digested with SHA-256 and truncated to 16 hex
/// characters. An empty map yields the literal [`DEFAULT_DIMENSION_KEY`] so
/// the global aggregation of a metric name has a well-known key.
pub fn dimension_key(dims: &BTreeMap<String, String>) -> String {
    if dims.is_empty() {
        return DEFAULT_DIMENSION_KEY.to_string();
    }

    let joined =
        dims.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");

    let digest = Sha256::digest(joined.as_bytes());
    let mut key = hex::encode(digest);
    key.truncate(DIMENSION_KEY_LEN);
    key
}

/// Timestamp for a given `(day_bucket, hour)` pair.
///
/// Returns `None` when the bucket string does not parse or the hour is out of
/// range. Used by the read side to turn stored rows back into time points.
pub fn bucket_hour_timestamp(day_bucket: &str, hour: u32) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(day_bucket, "%Y-%m-%d").ok()?;
    let naive = date.and_hms_opt(hour, 0, 0)?;
    Utc.from_utc_datetime(&naive).into()
}

/// Timestamp for a given `(month_bucket, day)` pair (midnight UTC).
pub fn bucket_day_timestamp(month_bucket: &str, day: u32) -> Option<DateTime<Utc>> {
    let first = NaiveDate::parse_from_str(&format!("{month_bucket}-01"), "%Y-%m-%d").ok()?;
    let date = NaiveDate::from_ymd_opt(first.year(), first.month(), day)?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Utc.from_utc_datetime(&naive).into()
}

/// Hour component of an hour-bucket string, if well-formed.
pub fn hour_of_bucket(hour_bucket: &str) -> Option<u32> {
    hour_bucket.rsplit('-').next()?.parse().ok()
}

/// Midnight (UTC) of the day containing `t`.
pub fn truncate_to_midnight(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.from_utc_datetime(
        &t.date_naive().and_hms_opt(0, 0, 0).unwrap_or_else(|| t.naive_utc()),
    )
}
