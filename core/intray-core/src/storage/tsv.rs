//! Flat-file backend: one tab-separated notification per line.
//!
//! Column order: id, timestamp, state, session, session_name, window, pane,
//! message (escaped), pane_created, level, read_timestamp. Older files without
//! `session_name` (10 columns) or also without `read_timestamp` (9 columns)
//! are still readable and are rewritten in the current layout on the next
//! mutation.
//!
//! Every mutation loads the whole file, applies the change in memory and
//! replaces the file through a temp file in the same directory, so readers
//! never observe a partial write. The highest ID ever issued lives in a
//! sibling `.seq` file, which keeps IDs unique across `clear_all`.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tempfile::NamedTempFile;

use crate::config::IntrayConfig;
use crate::error::{IntrayError, Result};
use crate::escape::{escape_message, unescape_message};
use crate::filter::{filter_notifications, Filter};
use crate::notification::{
    utc_now, NewNotification, Notification, NotificationLevel, NotificationState,
};

use super::{cleanup_cutoff, is_expired, validate_read_timestamp, StorageBackend};

const FIELD_COUNT: usize = 11;
const LEGACY_FIELD_COUNT: usize = 10;
const LEGACY_UNREAD_FIELD_COUNT: usize = 9;

type Records = BTreeMap<u64, Notification>;

pub struct TsvStorage {
    path: PathBuf,
    seq_path: PathBuf,
    lock: Mutex<()>,
}

impl TsvStorage {
    pub fn new(path: impl Into<PathBuf>, seq_path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| IntrayError::io("create state dir", err))?;
        }
        Ok(Self {
            path,
            seq_path: seq_path.into(),
            lock: Mutex::new(()),
        })
    }

    pub fn from_config(config: &IntrayConfig) -> Result<Self> {
        Self::new(config.tsv_path(), config.seq_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| IntrayError::LockPoisoned { backend: "tsv" })
    }

    /// Loads, mutates and atomically persists the record set.
    fn modify<T>(&self, op: impl FnOnce(&mut Records, &mut u64) -> Result<T>) -> Result<T> {
        let _guard = self.guard()?;
        let mut records = self.load()?;
        let mut last_id = self.read_seq()?.max(max_id(&records));
        let before = last_id;

        let result = op(&mut records, &mut last_id)?;

        self.save(&records)?;
        if last_id != before {
            self.write_seq(last_id)?;
        }
        Ok(result)
    }

    fn load(&self) -> Result<Records> {
        let content = match fs_err::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Records::new()),
            Err(err) => return Err(IntrayError::io("read notifications file", err)),
        };

        let mut records = Records::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let notification = parse_line(line).map_err(|reason| IntrayError::CorruptRecord {
                path: self.path.clone(),
                line: idx + 1,
                reason,
            })?;
            // Append-style legacy files may repeat an ID; the last line wins.
            records.insert(notification.id, notification);
        }
        Ok(records)
    }

    fn save(&self, records: &Records) -> Result<()> {
        let mut content = String::new();
        for notification in records.values() {
            content.push_str(&format_line(notification));
            content.push('\n');
        }
        write_atomic(&self.path, content.as_bytes())
    }

    fn read_seq(&self) -> Result<u64> {
        match fs_err::read_to_string(&self.seq_path) {
            Ok(content) => content.trim().parse().map_err(|_| IntrayError::CorruptRecord {
                path: self.seq_path.clone(),
                line: 1,
                reason: format!("invalid sequence value '{}'", content.trim()),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(err) => Err(IntrayError::io("read sequence file", err)),
        }
    }

    fn write_seq(&self, value: u64) -> Result<()> {
        write_atomic(&self.seq_path, format!("{}\n", value).as_bytes())
    }
}

impl StorageBackend for TsvStorage {
    fn name(&self) -> &'static str {
        "tsv"
    }

    fn add(&self, draft: NewNotification) -> Result<u64> {
        draft.validate()?;
        let id = self.modify(|records, last_id| {
            let id = match draft.id {
                Some(id) if records.contains_key(&id) => return Err(IntrayError::DuplicateId(id)),
                Some(id) => id,
                None => *last_id + 1,
            };
            *last_id = (*last_id).max(id);
            let timestamp = draft.timestamp.clone().unwrap_or_else(utc_now);
            records.insert(id, draft.into_record(id, timestamp));
            Ok(id)
        })?;
        tracing::debug!(backend = "tsv", id, "notification added");
        Ok(id)
    }

    fn mark_read_at(&self, id: u64, read_timestamp: &str) -> Result<()> {
        validate_read_timestamp(read_timestamp)?;
        self.modify(|records, _| {
            let record = records.get_mut(&id).ok_or(IntrayError::NotFound(id))?;
            record.read_timestamp = read_timestamp.to_string();
            Ok(())
        })
    }

    fn mark_unread(&self, id: u64) -> Result<()> {
        self.modify(|records, _| {
            let record = records.get_mut(&id).ok_or(IntrayError::NotFound(id))?;
            record.read_timestamp.clear();
            Ok(())
        })
    }

    fn dismiss(&self, id: u64) -> Result<()> {
        self.modify(|records, _| {
            let record = records.get_mut(&id).ok_or(IntrayError::NotFound(id))?;
            if record.state == NotificationState::Dismissed {
                return Err(IntrayError::AlreadyDismissed(id));
            }
            record.state = NotificationState::Dismissed;
            Ok(())
        })?;
        tracing::debug!(backend = "tsv", id, "notification dismissed");
        Ok(())
    }

    fn dismiss_all(&self) -> Result<usize> {
        self.modify(|records, _| {
            let mut changed = 0;
            for record in records.values_mut().filter(|r| r.is_active()) {
                record.state = NotificationState::Dismissed;
                changed += 1;
            }
            Ok(changed)
        })
    }

    fn list(&self, filter: &Filter) -> Result<Vec<Notification>> {
        let records = {
            let _guard = self.guard()?;
            self.load()?
        };
        Ok(filter_notifications(records.into_values().collect(), filter))
    }

    fn cleanup(&self, older_than_days: u32, dry_run: bool) -> Result<usize> {
        let cutoff = cleanup_cutoff(older_than_days);
        let expired = |record: &Notification| {
            record.state == NotificationState::Dismissed && is_expired(&record.timestamp, cutoff)
        };

        if dry_run {
            let records = {
                let _guard = self.guard()?;
                self.load()?
            };
            return Ok(records.values().filter(|r| expired(r)).count());
        }

        let removed = self.modify(|records, _| {
            let before = records.len();
            records.retain(|_, record| !expired(record));
            Ok(before - records.len())
        })?;
        tracing::debug!(backend = "tsv", removed, older_than_days, "cleanup finished");
        Ok(removed)
    }

    fn clear_all(&self) -> Result<usize> {
        self.modify(|records, _| {
            let removed = records.len();
            records.clear();
            Ok(removed)
        })
    }

    fn get(&self, id: u64) -> Result<Notification> {
        let _guard = self.guard()?;
        self.load()?.remove(&id).ok_or(IntrayError::NotFound(id))
    }
}

fn max_id(records: &Records) -> u64 {
    records.keys().next_back().copied().unwrap_or(0)
}

fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| IntrayError::validation(format!("path has no parent: {}", path.display())))?;
    let mut temp_file =
        NamedTempFile::new_in(parent).map_err(|err| IntrayError::io("create temp file", err))?;
    temp_file
        .write_all(content)
        .map_err(|err| IntrayError::io("write temp file", err))?;
    temp_file
        .flush()
        .map_err(|err| IntrayError::io("flush temp file", err))?;
    temp_file
        .persist(path)
        .map_err(|err| IntrayError::io(format!("replace {}", path.display()), err.error))?;
    Ok(())
}

/// Serializes a record in the current 11-column layout.
pub fn format_line(notification: &Notification) -> String {
    let id = notification.id.to_string();
    let message = escape_message(&notification.message);
    [
        id.as_str(),
        notification.timestamp.as_str(),
        notification.state.as_str(),
        notification.session.as_str(),
        notification.session_name.as_str(),
        notification.window.as_str(),
        notification.pane.as_str(),
        message.as_str(),
        notification.pane_created.as_str(),
        notification.level.as_str(),
        notification.read_timestamp.as_str(),
    ]
    .join("\t")
}

/// Parses one line in any supported layout. The error is a human-readable
/// reason; callers attach the file and line number.
pub fn parse_line(line: &str) -> std::result::Result<Notification, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    // (session_name, remaining fields from `window` onwards, read_timestamp)
    let (session_name, rest, read_timestamp) = match fields.len() {
        FIELD_COUNT => (fields[4], &fields[5..10], fields[10]),
        LEGACY_FIELD_COUNT => ("", &fields[4..9], fields[9]),
        LEGACY_UNREAD_FIELD_COUNT => ("", &fields[4..9], ""),
        count => return Err(format!("invalid field count: {}", count)),
    };

    let id: u64 = fields[0]
        .parse()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| format!("invalid id '{}'", fields[0]))?;
    let state = NotificationState::from_str(fields[2])
        .ok_or_else(|| format!("invalid state '{}'", fields[2]))?;
    let level = NotificationLevel::from_str(rest[4])
        .ok_or_else(|| format!("invalid level '{}'", rest[4]))?;

    Ok(Notification {
        id,
        timestamp: fields[1].to_string(),
        state,
        session: fields[3].to_string(),
        session_name: session_name.to_string(),
        window: rest[0].to_string(),
        pane: rest[1].to_string(),
        message: unescape_message(rest[2]),
        pane_created: rest[3].to_string(),
        level,
        read_timestamp: read_timestamp.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &Path) -> TsvStorage {
        TsvStorage::new(dir.join("notifications.tsv"), dir.join("notifications.seq"))
            .expect("open tsv storage")
    }

    fn draft(message: &str) -> NewNotification {
        NewNotification::new(message, NotificationLevel::Info).with_location("$1", "@1", "%1")
    }

    #[test]
    fn message_round_trips_byte_for_byte() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        let message = "line one\nline\ttwo \\n literal\\";
        let id = store.add(draft(message)).expect("add");

        let raw = fs_err::read_to_string(store.path()).expect("read file");
        assert_eq!(raw.lines().count(), 1);
        assert_eq!(store.get(id).expect("get").message, message);
    }

    #[test]
    fn ids_are_monotonic_across_clear_all() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        assert_eq!(store.add(draft("a")).expect("add"), 1);
        assert_eq!(store.add(draft("b")).expect("add"), 2);
        assert_eq!(store.clear_all().expect("clear"), 2);
        assert_eq!(store.add(draft("c")).expect("add"), 3);

        // A fresh handle on the same files keeps the sequence.
        let reopened = storage(temp_dir.path());
        assert_eq!(reopened.add(draft("d")).expect("add"), 4);
    }

    #[test]
    fn explicit_ids_are_kept_and_checked() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        assert_eq!(store.add(draft("a").with_id(40)).expect("add"), 40);
        assert!(matches!(
            store.add(draft("b").with_id(40)),
            Err(IntrayError::DuplicateId(40))
        ));
        assert_eq!(store.add(draft("c")).expect("add"), 41);
    }

    #[test]
    fn state_transitions_and_errors() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        let id = store.add(draft("a")).expect("add");

        store.mark_read_at(id, "2026-02-01T10:00:00Z").expect("mark read");
        assert_eq!(store.get(id).expect("get").read_timestamp, "2026-02-01T10:00:00Z");
        store.mark_unread(id).expect("mark unread");
        assert!(!store.get(id).expect("get").is_read());

        store.dismiss(id).expect("dismiss");
        assert!(matches!(store.dismiss(id), Err(IntrayError::AlreadyDismissed(_))));
        assert!(matches!(store.dismiss(99), Err(IntrayError::NotFound(99))));
        assert!(store.mark_read_at(id, "later").unwrap_err().is_validation());
    }

    #[test]
    fn validation_happens_before_any_write() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        assert!(store.add(draft("   ")).unwrap_err().is_validation());
        assert!(!store.path().exists());
    }

    #[test]
    fn rejects_column_breaking_fields_and_stays_readable() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        let kept = store.add(draft("kept")).expect("add");

        let tabbed = NewNotification::new("hi", NotificationLevel::Info).with_location("a\tb", "@1", "%1");
        assert!(store.add(tabbed).unwrap_err().is_validation());
        let mut broken_created = draft("hi");
        broken_created.pane_created = "123\n".to_string();
        assert!(store.add(broken_created).unwrap_err().is_validation());

        let listed = store.list(&Filter::default()).expect("list after rejection");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, kept);
        assert_eq!(store.add(draft("next")).expect("add"), kept + 1);
    }

    #[test]
    fn huge_cleanup_age_removes_nothing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        let id = store
            .add(draft("ancient").with_timestamp("2000-01-01T00:00:00Z"))
            .expect("add");
        store.dismiss(id).expect("dismiss");
        assert_eq!(store.cleanup(u32::MAX, true).expect("dry run"), 0);
        assert_eq!(store.cleanup(u32::MAX, false).expect("cleanup"), 0);
        assert_eq!(store.list(&Filter::default()).expect("list").len(), 1);
    }

    #[test]
    fn reads_legacy_layouts_and_collapses_duplicates() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        fs_err::write(
            store.path(),
            "1\t2026-01-01T00:00:00Z\tactive\t$1\t@1\t%1\tfirst\t123\tinfo\n\
             2\t2026-01-02T00:00:00Z\tactive\t$1\t@1\t%1\tsecond\\tpart\t123\twarning\t2026-01-03T00:00:00Z\n\
             1\t2026-01-01T00:00:00Z\tdismissed\t$1\t@1\t%1\tfirst\t123\tinfo\t\n",
        )
        .expect("write legacy file");

        let all = store.list(&Filter::default()).expect("list");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].state, NotificationState::Dismissed);
        assert_eq!(all[1].message, "second\tpart");
        assert!(all[1].is_read());
        assert_eq!(store.active_count().expect("count"), 1);

        // The next mutation rewrites in the current layout.
        assert_eq!(store.add(draft("third")).expect("add"), 3);
        let raw = fs_err::read_to_string(store.path()).expect("read file");
        assert!(raw.lines().all(|line| line.split('\t').count() == FIELD_COUNT));
    }

    #[test]
    fn corrupt_lines_are_reported_with_position() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        fs_err::write(
            store.path(),
            "1\t2026-01-01T00:00:00Z\tactive\t$1\t\t@1\t%1\tok\t\tinfo\t\n\
             2\t2026-01-01T00:00:00Z\tpending\t$1\t\t@1\t%1\tbad\t\tinfo\t\n",
        )
        .expect("write file");

        match store.list(&Filter::default()) {
            Err(IntrayError::CorruptRecord { line, reason, .. }) => {
                assert_eq!(line, 2);
                assert!(reason.contains("pending"));
            }
            other => panic!("expected corrupt record, got {:?}", other),
        }
    }

    #[test]
    fn cleanup_only_touches_old_dismissed_records() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        let old = store
            .add(draft("old").with_timestamp("2020-01-01T00:00:00Z"))
            .expect("add");
        let old_active = store
            .add(draft("old active").with_timestamp("2020-01-01T00:00:00Z"))
            .expect("add");
        let recent = store.add(draft("recent")).expect("add");
        store.dismiss(old).expect("dismiss");
        store.dismiss(recent).expect("dismiss");

        assert_eq!(store.cleanup(30, true).expect("dry run"), 1);
        assert_eq!(store.list(&Filter::default()).expect("list").len(), 3);

        assert_eq!(store.cleanup(30, false).expect("cleanup"), 1);
        let ids: Vec<u64> = store
            .list(&Filter::default())
            .expect("list")
            .iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(ids, vec![old_active, recent]);

        assert_eq!(store.cleanup(0, false).expect("cleanup all dismissed"), 1);
        assert_eq!(store.list(&Filter::default()).expect("list").len(), 1);
    }

    #[test]
    fn dismiss_all_counts_changes() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let store = storage(temp_dir.path());
        store.add(draft("a")).expect("add");
        let b = store.add(draft("b")).expect("add");
        store.dismiss(b).expect("dismiss");
        assert_eq!(store.dismiss_all().expect("dismiss all"), 1);
        assert_eq!(store.active_count().expect("count"), 0);
    }
}
