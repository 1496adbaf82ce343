use intray_core::{
    DualWriter, DualWriterOptions, Filter, IntrayError, NewNotification, Notification,
    NotificationLevel, ReadBackend, Result, SqliteStorage, StorageBackend, TsvStorage,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Wraps a real backend and fails every mutation while `broken` is set.
struct FlakyBackend {
    inner: Box<dyn StorageBackend>,
    broken: Arc<AtomicBool>,
}

impl FlakyBackend {
    fn check(&self) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(IntrayError::Io {
                context: "flaky backend".to_string(),
                source: std::io::Error::other("disk unplugged"),
            });
        }
        Ok(())
    }
}

impl StorageBackend for FlakyBackend {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn add(&self, draft: NewNotification) -> Result<u64> {
        self.check()?;
        self.inner.add(draft)
    }

    fn mark_read_at(&self, id: u64, read_timestamp: &str) -> Result<()> {
        self.check()?;
        self.inner.mark_read_at(id, read_timestamp)
    }

    fn mark_unread(&self, id: u64) -> Result<()> {
        self.check()?;
        self.inner.mark_unread(id)
    }

    fn dismiss(&self, id: u64) -> Result<()> {
        self.check()?;
        self.inner.dismiss(id)
    }

    fn dismiss_all(&self) -> Result<usize> {
        self.check()?;
        self.inner.dismiss_all()
    }

    fn list(&self, filter: &Filter) -> Result<Vec<Notification>> {
        self.inner.list(filter)
    }

    fn cleanup(&self, older_than_days: u32, dry_run: bool) -> Result<usize> {
        self.check()?;
        self.inner.cleanup(older_than_days, dry_run)
    }

    fn clear_all(&self) -> Result<usize> {
        self.check()?;
        self.inner.clear_all()
    }
}

fn flaky_dual(dir: &Path, read_backend: ReadBackend) -> (DualWriter, Arc<AtomicBool>) {
    let broken = Arc::new(AtomicBool::new(false));
    let primary = TsvStorage::new(dir.join("notifications.tsv"), dir.join("notifications.seq"))
        .expect("open tsv");
    let secondary = FlakyBackend {
        inner: Box::new(SqliteStorage::new(dir.join("notifications.db")).expect("open sqlite")),
        broken: Arc::clone(&broken),
    };
    let options = DualWriterOptions {
        read_backend,
        ..DualWriterOptions::default()
    };
    let dual = DualWriter::new(Box::new(primary), Box::new(secondary), options);
    (dual, broken)
}

#[test]
fn test_secondary_failure_is_not_returned_to_caller() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let (dual, broken) = flaky_dual(temp_dir.path(), ReadBackend::Secondary);

    let first = dual
        .add(NewNotification::new("before outage", NotificationLevel::Info))
        .expect("add while healthy");
    broken.store(true, Ordering::SeqCst);
    let second = dual
        .add(NewNotification::new("during outage", NotificationLevel::Error))
        .expect("primary result is returned");

    assert_eq!(second, first + 1);
    let metrics = dual.metrics();
    assert_eq!(metrics.write_operations, 2);
    assert_eq!(metrics.secondary_write_failures, 1);
    assert_eq!(metrics.primary_write_failures, 0);
}

#[test]
fn test_secondary_failure_switches_reads_to_primary() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let (dual, broken) = flaky_dual(temp_dir.path(), ReadBackend::Secondary);
    assert_eq!(dual.read_backend(), ReadBackend::Secondary);

    broken.store(true, Ordering::SeqCst);
    let id = dual
        .add(NewNotification::new("only in primary", NotificationLevel::Warning))
        .expect("add");

    assert_eq!(dual.read_backend(), ReadBackend::Primary);
    let visible = dual.get(id).expect("read from primary");
    assert_eq!(visible.message, "only in primary");
}

#[test]
fn test_verify_reports_missing_records_and_failures() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let (dual, broken) = flaky_dual(temp_dir.path(), ReadBackend::Primary);

    let kept = dual
        .add(NewNotification::new("mirrored", NotificationLevel::Info))
        .expect("add");
    broken.store(true, Ordering::SeqCst);
    let lost = dual
        .add(NewNotification::new("lost", NotificationLevel::Info))
        .expect("add");
    dual.dismiss(kept).expect("dismiss on primary");
    broken.store(false, Ordering::SeqCst);

    let report = dual.verify_consistency(0).expect("verify");
    assert!(!report.consistent);
    assert_eq!(report.primary_count, 2);
    assert_eq!(report.secondary_count, 1);
    assert_eq!(report.missing_in_secondary, vec![lost]);
    assert!(report.missing_in_primary.is_empty());

    let operations: Vec<&str> = report
        .secondary_failures
        .iter()
        .map(|failure| failure.operation.as_str())
        .collect();
    assert_eq!(operations, vec!["add", "dismiss"]);
    assert_eq!(report.secondary_failures[1].id, Some(kept));

    let diff = report
        .record_diffs
        .iter()
        .find(|diff| diff.id == kept)
        .expect("state diff for dismissed record");
    assert!(diff.fields.iter().any(|field| field.field == "state"));
}

#[test]
fn test_verify_does_not_modify_backends() {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let (dual, broken) = flaky_dual(temp_dir.path(), ReadBackend::Primary);

    broken.store(true, Ordering::SeqCst);
    dual.add(NewNotification::new("drift", NotificationLevel::Info))
        .expect("add");
    broken.store(false, Ordering::SeqCst);

    let before = dual.verify_consistency(0).expect("verify");
    let after = dual.verify_consistency(0).expect("verify again");
    assert_eq!(before.missing_in_secondary, after.missing_in_secondary);
    assert_eq!(before.secondary_count, after.secondary_count);
}
