//! Storage backends for notifications.
//!
//! Every backend implements [`StorageBackend`]. Calls are synchronous and
//! atomic: each backend serializes its own I/O, and a failed call leaves the
//! stored data untouched.

pub mod dual;
pub mod factory;
pub mod sqlite;
pub mod tsv;

use crate::error::{IntrayError, Result};
use crate::filter::Filter;
use crate::notification::{utc_now, NewNotification, Notification};

pub use dual::{ConsistencyReport, DualWriter, DualWriterOptions, ReadBackend, WriteMetrics};
pub use factory::open_backend;
pub use sqlite::SqliteStorage;
pub use tsv::TsvStorage;

pub trait StorageBackend: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Stores a new notification and returns its ID.
    ///
    /// A draft without an ID gets the next value of the backend's sequence.
    /// An explicit ID is stored as-is and fails with `DuplicateId` if taken.
    fn add(&self, draft: NewNotification) -> Result<u64>;

    fn mark_read_at(&self, id: u64, read_timestamp: &str) -> Result<()>;

    fn mark_unread(&self, id: u64) -> Result<()>;

    fn dismiss(&self, id: u64) -> Result<()>;

    /// Dismisses every active notification, returning how many changed.
    fn dismiss_all(&self) -> Result<usize>;

    /// Matching notifications ordered by ID ascending.
    fn list(&self, filter: &Filter) -> Result<Vec<Notification>>;

    /// Removes dismissed notifications created more than `older_than_days`
    /// ago. Zero days removes every dismissed notification. With `dry_run`
    /// nothing is removed and the count is still returned.
    fn cleanup(&self, older_than_days: u32, dry_run: bool) -> Result<usize>;

    /// Removes every notification. IDs issued so far are never reused.
    fn clear_all(&self) -> Result<usize>;

    fn mark_read(&self, id: u64) -> Result<()> {
        self.mark_read_at(id, &utc_now())
    }

    fn get(&self, id: u64) -> Result<Notification> {
        self.list(&Filter::default())?
            .into_iter()
            .find(|notification| notification.id == id)
            .ok_or(IntrayError::NotFound(id))
    }

    fn active_count(&self) -> Result<usize> {
        Ok(self.list(&Filter::active())?.len())
    }
}

/// Replays `records` into `target` through trait calls only, keeping IDs,
/// timestamps, state and read state. Records that fail validation are
/// skipped with a warning; backend errors abort the replay.
pub(crate) fn replay_records(records: &[Notification], target: &dyn StorageBackend) -> Result<usize> {
    let mut replayed = 0;
    for record in records {
        let draft = NewNotification {
            id: Some(record.id),
            timestamp: Some(record.timestamp.clone()),
            message: record.message.clone(),
            session: record.session.clone(),
            session_name: record.session_name.clone(),
            window: record.window.clone(),
            pane: record.pane.clone(),
            pane_created: record.pane_created.clone(),
            level: record.level,
        };
        match target.add(draft) {
            Ok(_) => {}
            Err(err) if err.is_validation() => {
                tracing::warn!(id = record.id, error = %err, "skipping invalid record during replay");
                continue;
            }
            Err(err) => return Err(err),
        }
        if !record.is_active() {
            target.dismiss(record.id)?;
        }
        if record.is_read() {
            if let Err(err) = target.mark_read_at(record.id, &record.read_timestamp) {
                if !err.is_validation() {
                    return Err(err);
                }
                tracing::warn!(id = record.id, error = %err, "dropping invalid read timestamp during replay");
            }
        }
        replayed += 1;
    }
    Ok(replayed)
}

fn validate_read_timestamp(read_timestamp: &str) -> Result<()> {
    if crate::notification::parse_rfc3339(read_timestamp).is_none() {
        return Err(IntrayError::validation(format!(
            "invalid read timestamp format '{}', expected RFC3339 format",
            read_timestamp
        )));
    }
    Ok(())
}

/// Cutoff for `cleanup`: `None` means every dismissed notification qualifies.
/// A cutoff before the earliest representable date clamps to it, so nothing
/// qualifies.
fn cleanup_cutoff(older_than_days: u32) -> Option<chrono::DateTime<chrono::Utc>> {
    if older_than_days == 0 {
        return None;
    }
    let cutoff = chrono::TimeDelta::try_days(i64::from(older_than_days))
        .and_then(|age| chrono::Utc::now().checked_sub_signed(age))
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MIN_UTC);
    Some(cutoff)
}

/// Whether a dismissed notification created at `timestamp` is old enough to
/// be removed. Unparsable timestamps are kept.
fn is_expired(timestamp: &str, cutoff: Option<chrono::DateTime<chrono::Utc>>) -> bool {
    match cutoff {
        None => true,
        Some(cutoff) => crate::notification::parse_rfc3339(timestamp)
            .is_some_and(|created| created < cutoff),
    }
}
