//! Notification filters shared by storage `list` calls and front-ends.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IntrayError, Result};
use crate::notification::{parse_rfc3339, Notification, NotificationLevel, NotificationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFilter {
    Read,
    Unread,
}

impl ReadFilter {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "read" => Some(ReadFilter::Read),
            "unread" => Some(ReadFilter::Unread),
            _ => None,
        }
    }
}

/// Every field is optional; `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub state: Option<NotificationState>,
    pub level: Option<NotificationLevel>,
    pub session: Option<String>,
    pub window: Option<String>,
    pub pane: Option<String>,
    /// Keep notifications created at or before this instant.
    pub older_than: Option<DateTime<Utc>>,
    /// Keep notifications created at or after this instant.
    pub newer_than: Option<DateTime<Utc>>,
    pub read: Option<ReadFilter>,
}

impl Filter {
    pub fn active() -> Self {
        Self {
            state: Some(NotificationState::Active),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        if self.state.is_some_and(|state| notification.state != state) {
            return false;
        }
        if self.level.is_some_and(|level| notification.level != level) {
            return false;
        }
        if !matches_text(self.session.as_deref(), &notification.session)
            || !matches_text(self.window.as_deref(), &notification.window)
            || !matches_text(self.pane.as_deref(), &notification.pane)
        {
            return false;
        }
        if self.older_than.is_some() || self.newer_than.is_some() {
            let Some(created) = parse_rfc3339(&notification.timestamp) else {
                return false;
            };
            if self.older_than.is_some_and(|cutoff| created > cutoff) {
                return false;
            }
            if self.newer_than.is_some_and(|cutoff| created < cutoff) {
                return false;
            }
        }
        match self.read {
            Some(ReadFilter::Read) => notification.is_read(),
            Some(ReadFilter::Unread) => !notification.is_read(),
            None => true,
        }
    }
}

fn matches_text(expected: Option<&str>, actual: &str) -> bool {
    match expected {
        Some(expected) if !expected.is_empty() => expected == actual,
        _ => true,
    }
}

/// Returns the input untouched when the filter is empty.
pub fn filter_notifications(notifications: Vec<Notification>, filter: &Filter) -> Vec<Notification> {
    if filter.is_empty() {
        return notifications;
    }
    notifications
        .into_iter()
        .filter(|notification| filter.matches(notification))
        .collect()
}

/// Filter parameters as front-ends collect them (strings and day counts).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// `active`, `dismissed`, `all`, or empty.
    pub state: String,
    pub level: String,
    pub session: String,
    pub window: String,
    pub pane: String,
    pub older_than_days: u32,
    pub newer_than_days: u32,
    /// `read`, `unread`, or empty.
    pub read: String,
}

impl FilterOptions {
    pub fn to_filter(&self, now: DateTime<Utc>) -> Result<Filter> {
        let state = match self.state.as_str() {
            "" | "all" => None,
            value => Some(NotificationState::from_str(value).ok_or_else(|| {
                IntrayError::validation(format!(
                    "invalid state '{}', must be one of: active, dismissed, all",
                    value
                ))
            })?),
        };
        let level = match self.level.as_str() {
            "" => None,
            value => Some(NotificationLevel::parse(value)?),
        };
        let read = match self.read.as_str() {
            "" => None,
            value => Some(ReadFilter::from_str(value).ok_or_else(|| {
                IntrayError::validation(format!("invalid read filter: {}", value))
            })?),
        };

        Ok(Filter {
            state,
            level,
            session: non_empty(&self.session),
            window: non_empty(&self.window),
            pane: non_empty(&self.pane),
            older_than: days_before(now, self.older_than_days),
            newer_than: days_before(now, self.newer_than_days),
            read,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// `None` for zero days, or when the instant falls outside chrono's range.
fn days_before(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    if days == 0 {
        return None;
    }
    TimeDelta::try_days(i64::from(days)).and_then(|age| now.checked_sub_signed(age))
}
