//! Dual writer: keeps a second backend in step with the primary while both
//! stay live.
//!
//! The primary is authoritative. Every mutation goes to it first and its
//! result is what the caller sees. The secondary then receives the same call,
//! keyed by the primary's ID and stamped with the primary's timestamps.
//! Secondary failures are logged and recorded, never returned; they show up
//! in [`DualWriter::verify_consistency`].

use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::filter::Filter;
use crate::notification::{utc_now, NewNotification, Notification};

use super::{replay_records, StorageBackend};

const DEFAULT_SAMPLE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadBackend {
    #[default]
    Primary,
    Secondary,
}

impl ReadBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadBackend::Primary => "primary",
            ReadBackend::Secondary => "secondary",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualWriterOptions {
    /// Default number of intersecting IDs whose fields are compared.
    pub sample_size: usize,
    /// Never write the secondary; only read it when verifying.
    pub verify_only: bool,
    pub read_backend: ReadBackend,
}

impl Default for DualWriterOptions {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            verify_only: false,
            read_backend: ReadBackend::Primary,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteMetrics {
    pub write_operations: u64,
    pub primary_write_failures: u64,
    pub secondary_write_failures: u64,
    pub total_write_latency: Duration,
    pub max_write_latency: Duration,
}

impl WriteMetrics {
    pub fn average_write_latency(&self) -> Duration {
        if self.write_operations == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_write_latency.as_nanos() / u128::from(self.write_operations);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDiff {
    pub field: &'static str,
    pub primary: String,
    pub secondary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordDiff {
    pub id: u64,
    pub fields: Vec<FieldDiff>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondaryFailure {
    pub operation: String,
    pub id: Option<u64>,
    pub error: String,
    pub at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub primary_count: usize,
    pub secondary_count: usize,
    pub primary_active_count: usize,
    pub secondary_active_count: usize,
    pub missing_in_secondary: Vec<u64>,
    pub missing_in_primary: Vec<u64>,
    pub sampled_records: usize,
    pub record_diffs: Vec<RecordDiff>,
    pub secondary_failures: Vec<SecondaryFailure>,
}

pub struct DualWriter {
    primary: Box<dyn StorageBackend>,
    secondary: Box<dyn StorageBackend>,
    options: DualWriterOptions,
    read_backend: RwLock<ReadBackend>,
    metrics: Mutex<WriteMetrics>,
    failures: Mutex<Vec<SecondaryFailure>>,
}

impl DualWriter {
    pub fn new(
        primary: Box<dyn StorageBackend>,
        secondary: Box<dyn StorageBackend>,
        options: DualWriterOptions,
    ) -> Self {
        let mut read_backend = options.read_backend;
        if options.verify_only && read_backend == ReadBackend::Secondary {
            tracing::warn!(
                secondary = secondary.name(),
                "verify-only mode never writes the secondary, reading from primary"
            );
            read_backend = ReadBackend::Primary;
        }
        Self {
            primary,
            secondary,
            options,
            read_backend: RwLock::new(read_backend),
            metrics: Mutex::new(WriteMetrics::default()),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn options(&self) -> DualWriterOptions {
        self.options
    }

    pub fn read_backend(&self) -> ReadBackend {
        self.read_backend
            .read()
            .map(|guard| *guard)
            .unwrap_or(ReadBackend::Primary)
    }

    pub fn metrics(&self) -> WriteMetrics {
        self.metrics
            .lock()
            .map(|guard| *guard)
            .unwrap_or_default()
    }

    pub fn secondary_failures(&self) -> Vec<SecondaryFailure> {
        self.failures
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Copies every primary record into the secondary when the secondary is
    /// empty. Returns how many records were replayed.
    pub fn seed_secondary_if_empty(&self) -> Result<usize> {
        let secondary_count = self.secondary.list(&Filter::default())?.len();
        let records = self.primary.list(&Filter::default())?;
        if secondary_count > 0 || records.is_empty() {
            tracing::debug!(
                secondary_count,
                primary_count = records.len(),
                "skipping secondary seed"
            );
            return Ok(0);
        }

        tracing::info!(
            count = records.len(),
            from = self.primary.name(),
            to = self.secondary.name(),
            "seeding secondary backend"
        );
        replay_records(&records, self.secondary.as_ref())
    }

    /// [`DualWriter::verify_consistency`] with the configured sample size.
    pub fn verify_consistency_default(&self) -> Result<ConsistencyReport> {
        self.verify_consistency(self.options.sample_size)
    }

    /// Compares both backends without modifying either.
    ///
    /// Counts and missing IDs always cover every record. Field comparison
    /// covers the first `sample_size` IDs of the sorted intersection, or all
    /// of it when `sample_size` is zero.
    pub fn verify_consistency(&self, sample_size: usize) -> Result<ConsistencyReport> {
        let primary = index_by_id(self.primary.list(&Filter::default())?);
        let secondary = index_by_id(self.secondary.list(&Filter::default())?);

        let mut report = ConsistencyReport {
            primary_count: primary.len(),
            secondary_count: secondary.len(),
            primary_active_count: primary.values().filter(|n| n.is_active()).count(),
            secondary_active_count: secondary.values().filter(|n| n.is_active()).count(),
            missing_in_secondary: primary
                .keys()
                .filter(|id| !secondary.contains_key(id))
                .copied()
                .collect(),
            missing_in_primary: secondary
                .keys()
                .filter(|id| !primary.contains_key(id))
                .copied()
                .collect(),
            secondary_failures: self.secondary_failures(),
            ..ConsistencyReport::default()
        };

        for id in &report.missing_in_secondary {
            tracing::warn!(id, backend = self.secondary.name(), "consistency: record missing");
        }
        for id in &report.missing_in_primary {
            tracing::warn!(id, backend = self.primary.name(), "consistency: record missing");
        }

        let limit = if sample_size == 0 { usize::MAX } else { sample_size };
        let sampled: Vec<u64> = primary
            .keys()
            .filter(|id| secondary.contains_key(id))
            .take(limit)
            .copied()
            .collect();
        report.sampled_records = sampled.len();

        for id in sampled {
            let (Some(left), Some(right)) = (primary.get(&id), secondary.get(&id)) else {
                continue;
            };
            let fields = diff_fields(left, right);
            if fields.is_empty() {
                continue;
            }
            for diff in &fields {
                tracing::warn!(
                    id,
                    field = diff.field,
                    primary = %diff.primary,
                    secondary = %diff.secondary,
                    "consistency: field differs"
                );
            }
            report.record_diffs.push(RecordDiff { id, fields });
        }

        report.consistent = report.primary_count == report.secondary_count
            && report.primary_active_count == report.secondary_active_count
            && report.missing_in_secondary.is_empty()
            && report.missing_in_primary.is_empty()
            && report.record_diffs.is_empty();
        Ok(report)
    }

    fn reader(&self) -> &dyn StorageBackend {
        match self.read_backend() {
            ReadBackend::Primary => self.primary.as_ref(),
            ReadBackend::Secondary => self.secondary.as_ref(),
        }
    }

    /// Runs `primary`, then `secondary` unless in verify-only mode.
    fn write<T>(
        &self,
        operation: &str,
        id: Option<u64>,
        primary: impl FnOnce(&dyn StorageBackend) -> Result<T>,
        secondary: impl FnOnce(&dyn StorageBackend, &T) -> Result<()>,
    ) -> Result<T> {
        let start = Instant::now();
        let value = match primary(self.primary.as_ref()) {
            Ok(value) => value,
            Err(err) => {
                self.record_write(start, true, false);
                return Err(err);
            }
        };

        let mut secondary_failed = false;
        if !self.options.verify_only {
            if let Err(err) = secondary(self.secondary.as_ref(), &value) {
                secondary_failed = true;
                self.handle_secondary_failure(operation, id, &err.to_string());
            }
        }

        self.record_write(start, false, secondary_failed);
        Ok(value)
    }

    fn record_write(&self, start: Instant, primary_failed: bool, secondary_failed: bool) {
        let latency = start.elapsed();
        let Ok(mut metrics) = self.metrics.lock() else {
            return;
        };
        metrics.write_operations += 1;
        metrics.total_write_latency += latency;
        metrics.max_write_latency = metrics.max_write_latency.max(latency);
        if primary_failed {
            metrics.primary_write_failures += 1;
        }
        if secondary_failed {
            metrics.secondary_write_failures += 1;
        }
    }

    fn handle_secondary_failure(&self, operation: &str, id: Option<u64>, error: &str) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(SecondaryFailure {
                operation: operation.to_string(),
                id,
                error: error.to_string(),
                at: utc_now(),
            });
        }

        if let Ok(mut read_backend) = self.read_backend.write() {
            if *read_backend == ReadBackend::Secondary {
                *read_backend = ReadBackend::Primary;
                tracing::warn!(
                    operation,
                    id,
                    error,
                    backend = self.secondary.name(),
                    "secondary write failed, switching reads to primary"
                );
                return;
            }
        }
        tracing::warn!(
            operation,
            id,
            error,
            backend = self.secondary.name(),
            "secondary write failed, continuing with primary only"
        );
    }
}

impl StorageBackend for DualWriter {
    fn name(&self) -> &'static str {
        "dual"
    }

    fn add(&self, draft: NewNotification) -> Result<u64> {
        draft.validate()?;
        let draft = NewNotification {
            timestamp: Some(draft.timestamp.clone().unwrap_or_else(utc_now)),
            ..draft
        };
        let replay = draft.clone();
        self.write(
            "add",
            draft.id,
            |backend| backend.add(draft),
            |backend, id| backend.add(replay.with_id(*id)).map(|_| ()),
        )
    }

    fn mark_read_at(&self, id: u64, read_timestamp: &str) -> Result<()> {
        self.write(
            "mark_read",
            Some(id),
            |backend| backend.mark_read_at(id, read_timestamp),
            |backend, _| backend.mark_read_at(id, read_timestamp),
        )
    }

    fn mark_unread(&self, id: u64) -> Result<()> {
        self.write(
            "mark_unread",
            Some(id),
            |backend| backend.mark_unread(id),
            |backend, _| backend.mark_unread(id),
        )
    }

    fn dismiss(&self, id: u64) -> Result<()> {
        self.write(
            "dismiss",
            Some(id),
            |backend| backend.dismiss(id),
            |backend, _| backend.dismiss(id),
        )
    }

    fn dismiss_all(&self) -> Result<usize> {
        self.write(
            "dismiss_all",
            None,
            |backend| backend.dismiss_all(),
            |backend, _| backend.dismiss_all().map(|_| ()),
        )
    }

    fn list(&self, filter: &Filter) -> Result<Vec<Notification>> {
        self.reader().list(filter)
    }

    fn cleanup(&self, older_than_days: u32, dry_run: bool) -> Result<usize> {
        if dry_run {
            return self.primary.cleanup(older_than_days, true);
        }
        self.write(
            "cleanup",
            None,
            |backend| backend.cleanup(older_than_days, false),
            |backend, _| backend.cleanup(older_than_days, false).map(|_| ()),
        )
    }

    fn clear_all(&self) -> Result<usize> {
        self.write(
            "clear_all",
            None,
            |backend| backend.clear_all(),
            |backend, _| backend.clear_all().map(|_| ()),
        )
    }

    fn get(&self, id: u64) -> Result<Notification> {
        self.reader().get(id)
    }

    fn active_count(&self) -> Result<usize> {
        self.reader().active_count()
    }
}

fn index_by_id(records: Vec<Notification>) -> BTreeMap<u64, Notification> {
    records.into_iter().map(|n| (n.id, n)).collect()
}

fn diff_fields(primary: &Notification, secondary: &Notification) -> Vec<FieldDiff> {
    let pairs: [(&'static str, &str, &str); 10] = [
        ("timestamp", primary.timestamp.as_str(), secondary.timestamp.as_str()),
        ("state", primary.state.as_str(), secondary.state.as_str()),
        ("session", primary.session.as_str(), secondary.session.as_str()),
        ("session_name", primary.session_name.as_str(), secondary.session_name.as_str()),
        ("window", primary.window.as_str(), secondary.window.as_str()),
        ("pane", primary.pane.as_str(), secondary.pane.as_str()),
        ("message", primary.message.as_str(), secondary.message.as_str()),
        ("pane_created", primary.pane_created.as_str(), secondary.pane_created.as_str()),
        ("level", primary.level.as_str(), secondary.level.as_str()),
        ("read_timestamp", primary.read_timestamp.as_str(), secondary.read_timestamp.as_str()),
    ];
    pairs
        .into_iter()
        .filter(|(_, left, right)| left != right)
        .map(|(field, left, right)| FieldDiff {
            field,
            primary: left.to_string(),
            secondary: right.to_string(),
        })
        .collect()
}
