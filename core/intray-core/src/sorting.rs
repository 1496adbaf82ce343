//! Stable ordering helpers for notification lists.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::notification::{parse_rfc3339, Notification};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Id,
    Timestamp,
    State,
    Level,
    Session,
    Message,
    ReadStatus,
}

impl SortField {
    /// Unknown fields fall back to timestamp.
    pub fn parse(value: &str) -> Self {
        match value {
            "id" => SortField::Id,
            "state" => SortField::State,
            "level" => SortField::Level,
            "session" => SortField::Session,
            "message" => SortField::Message,
            "read_status" => SortField::ReadStatus,
            _ => SortField::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Unknown orders fall back to descending.
    pub fn parse(value: &str) -> Self {
        match value {
            "asc" => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOptions {
    pub field: SortField,
    pub order: SortOrder,
    pub case_insensitive: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        Self {
            field: SortField::Timestamp,
            order: SortOrder::Desc,
            case_insensitive: false,
        }
    }
}

/// Returns a sorted copy. Ties keep their input order.
///
/// For `ReadStatus`, ascending puts unread first and descending puts read
/// first.
pub fn sort_notifications(notifications: &[Notification], options: SortOptions) -> Vec<Notification> {
    let mut sorted = notifications.to_vec();
    sorted.sort_by(|a, b| compare(a, b, options));
    sorted
}

/// Stable partition: unread first, then read, each side in input order.
pub fn partition_unread_first(notifications: &[Notification]) -> Vec<Notification> {
    let (unread, read): (Vec<_>, Vec<_>) = notifications
        .iter()
        .cloned()
        .partition(|notification| !notification.is_read());
    unread.into_iter().chain(read).collect()
}

/// Unread notifications first, each partition sorted by `options`.
pub fn sort_with_unread_first(
    notifications: &[Notification],
    options: SortOptions,
) -> Vec<Notification> {
    let (unread, read): (Vec<_>, Vec<_>) = notifications
        .iter()
        .cloned()
        .partition(|notification| !notification.is_read());
    let mut sorted = sort_notifications(&unread, options);
    sorted.extend(sort_notifications(&read, options));
    sorted
}

fn compare(a: &Notification, b: &Notification, options: SortOptions) -> Ordering {
    let ordering = match options.field {
        SortField::Id => a.id.cmp(&b.id),
        // By instant; unparsable timestamps sort before every valid one.
        SortField::Timestamp => parse_rfc3339(&a.timestamp)
            .cmp(&parse_rfc3339(&b.timestamp))
            .then_with(|| a.timestamp.cmp(&b.timestamp)),
        SortField::State => a.state.as_str().cmp(b.state.as_str()),
        SortField::Level => a.level.as_str().cmp(b.level.as_str()),
        SortField::Session => a.session.cmp(&b.session),
        SortField::Message if options.case_insensitive => a
            .message
            .to_lowercase()
            .cmp(&b.message.to_lowercase()),
        SortField::Message => a.message.cmp(&b.message),
        // unread < read
        SortField::ReadStatus => a.is_read().cmp(&b.is_read()),
    };
    match options.order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}
