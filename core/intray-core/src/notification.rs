//! Notification record, its enumerations, and the `add` draft.
//!
//! Timestamps are kept as the strings that were persisted so that both storage
//! backends round-trip them byte-for-byte. Newly generated timestamps use the
//! canonical `YYYY-MM-DDTHH:MM:SSZ` form.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IntrayError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationState {
    Active,
    Dismissed,
}

impl NotificationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationState::Active => "active",
            NotificationState::Dismissed => "dismissed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "active" => Some(NotificationState::Active),
            "dismissed" => Some(NotificationState::Dismissed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
            NotificationLevel::Critical => "critical",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "info" => Some(NotificationLevel::Info),
            "warning" => Some(NotificationLevel::Warning),
            "error" => Some(NotificationLevel::Error),
            "critical" => Some(NotificationLevel::Critical),
            _ => None,
        }
    }

    /// Parses user input, rejecting anything outside the enumeration.
    pub fn parse(value: &str) -> Result<Self> {
        Self::from_str(value).ok_or_else(|| {
            IntrayError::validation(format!(
                "invalid level '{}', must be one of: info, warning, error, critical",
                value
            ))
        })
    }
}

impl Default for NotificationLevel {
    fn default() -> Self {
        NotificationLevel::Info
    }
}

/// A persisted notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub timestamp: String,
    pub state: NotificationState,
    pub session: String,
    #[serde(default)]
    pub session_name: String,
    pub window: String,
    pub pane: String,
    pub message: String,
    pub pane_created: String,
    pub level: NotificationLevel,
    /// Empty means unread.
    #[serde(default)]
    pub read_timestamp: String,
}

impl Notification {
    pub fn is_read(&self) -> bool {
        !self.read_timestamp.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.state == NotificationState::Active
    }

    pub fn validate(&self) -> Result<()> {
        if self.id == 0 {
            return Err(IntrayError::validation("notification id must be positive"));
        }
        if parse_rfc3339(&self.timestamp).is_none() {
            return Err(IntrayError::validation(format!(
                "invalid timestamp format '{}', expected RFC3339 format",
                self.timestamp
            )));
        }
        if !self.read_timestamp.is_empty() && parse_rfc3339(&self.read_timestamp).is_none() {
            return Err(IntrayError::validation(format!(
                "invalid read timestamp format '{}', expected RFC3339 format",
                self.read_timestamp
            )));
        }
        validate_message(&self.message)?;
        validate_location(&self.session, &self.window, &self.pane)?;
        validate_single_line([
            ("session", self.session.as_str()),
            ("session_name", self.session_name.as_str()),
            ("window", self.window.as_str()),
            ("pane", self.pane.as_str()),
            ("pane_created", self.pane_created.as_str()),
        ])
    }
}

/// Input for `StorageBackend::add`.
///
/// `id` is only set when a dual writer replays the primary's ID into the
/// secondary; regular callers leave it empty and let the backend assign one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewNotification {
    pub id: Option<u64>,
    pub timestamp: Option<String>,
    pub message: String,
    pub session: String,
    pub session_name: String,
    pub window: String,
    pub pane: String,
    pub pane_created: String,
    pub level: NotificationLevel,
}

impl NewNotification {
    pub fn new(message: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            message: message.into(),
            level,
            ..Self::default()
        }
    }

    pub fn with_location(
        mut self,
        session: impl Into<String>,
        window: impl Into<String>,
        pane: impl Into<String>,
    ) -> Self {
        self.session = session.into();
        self.window = window.into();
        self.pane = pane.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.id == Some(0) {
            return Err(IntrayError::validation("notification id must be positive"));
        }
        validate_message(&self.message)?;
        if let Some(timestamp) = self.timestamp.as_deref() {
            if parse_rfc3339(timestamp).is_none() {
                return Err(IntrayError::validation(format!(
                    "invalid timestamp format '{}', expected RFC3339 format",
                    timestamp
                )));
            }
        }
        validate_location(&self.session, &self.window, &self.pane)?;
        validate_single_line([
            ("session", self.session.as_str()),
            ("session_name", self.session_name.as_str()),
            ("window", self.window.as_str()),
            ("pane", self.pane.as_str()),
            ("pane_created", self.pane_created.as_str()),
        ])
    }

    /// Builds the record a backend stores once an ID has been assigned.
    pub(crate) fn into_record(self, id: u64, timestamp: String) -> Notification {
        Notification {
            id,
            timestamp,
            state: NotificationState::Active,
            session: self.session,
            session_name: self.session_name,
            window: self.window,
            pane: self.pane,
            message: self.message,
            pane_created: self.pane_created,
            level: self.level,
            read_timestamp: String::new(),
        }
    }
}

fn validate_message(message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(IntrayError::validation("message cannot be empty"));
    }
    Ok(())
}

fn validate_location(session: &str, window: &str, pane: &str) -> Result<()> {
    for (name, value) in [("session", session), ("window", window), ("pane", pane)] {
        if !value.is_empty() && value.trim().is_empty() {
            return Err(IntrayError::validation(format!(
                "{} cannot be whitespace only",
                name
            )));
        }
    }
    Ok(())
}

/// Only the message is escaped on disk; every other text field must fit in a
/// single tab-separated column as-is.
fn validate_single_line(fields: [(&str, &str); 5]) -> Result<()> {
    for (name, value) in fields {
        if value.contains(['\t', '\n', '\r']) {
            return Err(IntrayError::validation(format!(
                "{} cannot contain tabs or line breaks",
                name
            )));
        }
    }
    Ok(())
}

pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Canonical persisted form: second precision, `Z` suffix.
pub fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_now() -> String {
    format_timestamp(Utc::now())
}
