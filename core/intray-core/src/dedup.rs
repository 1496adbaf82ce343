//! Deduplication keys for grouping repeated notifications.
//!
//! A key is built from the fields selected by [`Criteria`], joined with
//! U+0000. When a time window is configured, records sharing a base key are
//! split into buckets of at most `window` measured from the newest record of
//! each bucket. Bucket 0 keeps the bare key; later buckets append U+001F and
//! the decimal bucket index.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IntrayError, Result};
use crate::notification::{parse_rfc3339, Notification};

pub const PART_SEPARATOR: char = '\u{0}';
pub const BUCKET_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criteria {
    #[default]
    Message,
    MessageLevel,
    MessageSource,
    Exact,
}

impl Criteria {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criteria::Message => "message",
            Criteria::MessageLevel => "message_level",
            Criteria::MessageSource => "message_source",
            Criteria::Exact => "exact",
        }
    }
}

/// Case-insensitive; anything unrecognised means [`Criteria::Message`].
pub fn parse_criteria(value: &str) -> Criteria {
    match value.to_ascii_lowercase().as_str() {
        "message_level" => Criteria::MessageLevel,
        "message_source" => Criteria::MessageSource,
        "exact" => Criteria::Exact,
        _ => Criteria::Message,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupOptions {
    pub criteria: Criteria,
    /// Zero disables bucketing.
    pub window: Duration,
}

impl DedupOptions {
    pub fn new(criteria: Criteria, window: Duration) -> Self {
        Self { criteria, window }
    }
}

/// Fields of a notification that take part in key derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupRecord {
    pub message: String,
    pub level: String,
    pub session: String,
    pub window: String,
    pub pane: String,
    pub state: String,
    pub timestamp: String,
}

impl From<&Notification> for DedupRecord {
    fn from(notification: &Notification) -> Self {
        Self {
            message: notification.message.clone(),
            level: notification.level.as_str().to_string(),
            session: notification.session.clone(),
            window: notification.window.clone(),
            pane: notification.pane.clone(),
            state: notification.state.as_str().to_string(),
            timestamp: notification.timestamp.clone(),
        }
    }
}

/// Returns one key per record, in input order.
pub fn build_keys(records: &[DedupRecord], options: &DedupOptions) -> Vec<String> {
    let mut keys: Vec<String> = records
        .iter()
        .map(|record| base_key(record, options.criteria))
        .collect();
    if options.window.is_zero() {
        return keys;
    }

    let buckets = assign_buckets(records, &keys, options.window);
    for (key, bucket) in keys.iter_mut().zip(buckets) {
        if bucket > 0 {
            key.push(BUCKET_SEPARATOR);
            key.push_str(&bucket.to_string());
        }
    }
    keys
}

fn base_key(record: &DedupRecord, criteria: Criteria) -> String {
    let parts: Vec<&str> = match criteria {
        Criteria::Message => return record.message.clone(),
        Criteria::MessageLevel => vec![record.message.as_str(), record.level.as_str()],
        Criteria::MessageSource => vec![
            record.message.as_str(),
            record.session.as_str(),
            record.window.as_str(),
            record.pane.as_str(),
        ],
        Criteria::Exact => vec![
            record.message.as_str(),
            record.level.as_str(),
            record.session.as_str(),
            record.window.as_str(),
            record.pane.as_str(),
            record.state.as_str(),
        ],
    };
    parts.join("\u{0}")
}

fn assign_buckets(records: &[DedupRecord], keys: &[String], window: Duration) -> Vec<usize> {
    let mut assignments = vec![0; records.len()];

    let mut grouped: HashMap<&str, Vec<(usize, Option<DateTime<Utc>>)>> = HashMap::new();
    for (idx, key) in keys.iter().enumerate() {
        let timestamp = parse_rfc3339(&records[idx].timestamp);
        grouped.entry(key.as_str()).or_default().push((idx, timestamp));
    }

    for entries in grouped.values_mut() {
        // Newest first; undated records sink to the end. `sort_by` is stable.
        entries.sort_by(|a, b| match (a.1, b.1) {
            (Some(left), Some(right)) => right.cmp(&left),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });

        let mut bucket = 0;
        let mut anchor: Option<DateTime<Utc>> = None;
        for &(idx, timestamp) in entries.iter() {
            match (timestamp, anchor) {
                // Undated records join whichever bucket is open.
                (None, _) => {}
                (Some(ts), None) => anchor = Some(ts),
                (Some(ts), Some(latest)) => {
                    let within = latest
                        .signed_duration_since(ts)
                        .to_std()
                        .map_or(true, |gap| gap <= window);
                    if !within {
                        bucket += 1;
                        anchor = Some(ts);
                    }
                }
            }
            assignments[idx] = bucket;
        }
    }
    assignments
}

/// Drops the `U+001F<bucket>` suffix, if any.
pub fn strip_bucket_suffix(key: &str) -> &str {
    match key.find(BUCKET_SEPARATOR) {
        Some(idx) => &key[..idx],
        None => key,
    }
}

/// The bucket index encoded in `key`, or `None` for unsuffixed keys.
pub fn bucket_from_key(key: &str) -> Option<usize> {
    let idx = key.find(BUCKET_SEPARATOR)?;
    key[idx + BUCKET_SEPARATOR.len_utf8()..].parse().ok()
}

/// Parses durations such as `90s`, `5m`, `1h30m` or `1.5h`.
///
/// An empty string and `0` mean zero. Negative durations also collapse to
/// zero, which disables bucketing.
pub fn parse_window(value: &str) -> Result<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    let invalid = || IntrayError::validation(format!("invalid duration '{}'", value));

    let (negative, mut rest) = match trimmed.strip_prefix('-') {
        Some(stripped) => (true, stripped),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let number: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60.0 * 1e9,
            "h" => 3600.0 * 1e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += number * scale;
    }

    if negative {
        return Ok(Duration::ZERO);
    }
    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
