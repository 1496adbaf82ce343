//! SQLite backend.
//!
//! IDs come from `INTEGER PRIMARY KEY AUTOINCREMENT`, so a deleted ID is never
//! handed out again. Messages are stored raw. Each mutating call runs in its
//! own transaction.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};

use crate::config::IntrayConfig;
use crate::error::{IntrayError, Result};
use crate::filter::{Filter, ReadFilter};
use crate::notification::{
    utc_now, NewNotification, Notification, NotificationLevel, NotificationState,
};

use super::{cleanup_cutoff, is_expired, validate_read_timestamp, StorageBackend};

const SELECT_COLUMNS: &str = "id, timestamp, state, session, session_name, window, pane, \
                              message, pane_created, level, read_timestamp";

pub struct SqliteStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SqliteStorage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self {
            path: path.into(),
            lock: Mutex::new(()),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    pub fn from_config(config: &IntrayConfig) -> Result<Self> {
        Self::new(config.db_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS notifications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    state TEXT NOT NULL CHECK (state IN ('active', 'dismissed')),
                    session TEXT NOT NULL DEFAULT '',
                    session_name TEXT NOT NULL DEFAULT '',
                    window TEXT NOT NULL DEFAULT '',
                    pane TEXT NOT NULL DEFAULT '',
                    message TEXT NOT NULL,
                    pane_created TEXT NOT NULL DEFAULT '',
                    level TEXT NOT NULL CHECK (level IN ('info', 'warning', 'error', 'critical')),
                    read_timestamp TEXT NOT NULL DEFAULT '',
                    updated_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS idx_notifications_state ON notifications(state);
                 CREATE INDEX IF NOT EXISTS idx_notifications_session ON notifications(session);
                 CREATE INDEX IF NOT EXISTS idx_notifications_timestamp ON notifications(timestamp);
                 COMMIT;",
            )
            .map_err(|err| IntrayError::sqlite("create schema", err))?;
            ensure_notification_columns(conn)
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| IntrayError::LockPoisoned { backend: "sqlite" })?;
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent)
                .map_err(|err| IntrayError::io("create state dir", err))?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|err| IntrayError::sqlite("open database", err))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| IntrayError::sqlite("enable WAL", err))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|err| IntrayError::sqlite("set synchronous", err))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(|err| IntrayError::sqlite("set busy_timeout", err))?;

        Ok(conn)
    }
}

impl StorageBackend for SqliteStorage {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn add(&self, draft: NewNotification) -> Result<u64> {
        draft.validate()?;
        let explicit_id = draft.id.map(to_sql_id).transpose()?;
        let timestamp = draft.timestamp.clone().unwrap_or_else(utc_now);

        let id = self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| IntrayError::sqlite("begin add", err))?;

            if let Some(id) = explicit_id {
                let exists: Option<i64> = tx
                    .query_row("SELECT id FROM notifications WHERE id = ?1", [id], |row| {
                        row.get(0)
                    })
                    .optional()
                    .map_err(|err| IntrayError::sqlite("check notification id", err))?;
                if exists.is_some() {
                    return Err(IntrayError::DuplicateId(from_sql_id(id)));
                }
            }

            tx.execute(
                "INSERT INTO notifications \
                    (id, timestamp, state, session, session_name, window, pane, \
                     message, pane_created, level, read_timestamp, updated_at) \
                 VALUES (?1, ?2, 'active', ?3, ?4, ?5, ?6, ?7, ?8, ?9, '', ?10)",
                params![
                    explicit_id,
                    timestamp,
                    draft.session,
                    draft.session_name,
                    draft.window,
                    draft.pane,
                    draft.message,
                    draft.pane_created,
                    draft.level.as_str(),
                    utc_now()
                ],
            )
            .map_err(|err| IntrayError::sqlite("insert notification", err))?;
            let id = tx.last_insert_rowid();

            tx.commit()
                .map_err(|err| IntrayError::sqlite("commit add", err))?;
            Ok(from_sql_id(id))
        })?;
        tracing::debug!(backend = "sqlite", id, "notification added");
        Ok(id)
    }

    fn mark_read_at(&self, id: u64, read_timestamp: &str) -> Result<()> {
        validate_read_timestamp(read_timestamp)?;
        self.set_read_timestamp(id, read_timestamp)
    }

    fn mark_unread(&self, id: u64) -> Result<()> {
        self.set_read_timestamp(id, "")
    }

    fn dismiss(&self, id: u64) -> Result<()> {
        let sql_id = to_sql_id(id)?;
        self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| IntrayError::sqlite("begin dismiss", err))?;
            let state: Option<String> = tx
                .query_row(
                    "SELECT state FROM notifications WHERE id = ?1",
                    [sql_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| IntrayError::sqlite("read notification state", err))?;
            match state.as_deref() {
                None => return Err(IntrayError::NotFound(id)),
                Some("dismissed") => return Err(IntrayError::AlreadyDismissed(id)),
                Some(_) => {}
            }
            tx.execute(
                "UPDATE notifications SET state = 'dismissed', updated_at = ?2 WHERE id = ?1",
                params![sql_id, utc_now()],
            )
            .map_err(|err| IntrayError::sqlite("dismiss notification", err))?;
            tx.commit()
                .map_err(|err| IntrayError::sqlite("commit dismiss", err))
        })?;
        tracing::debug!(backend = "sqlite", id, "notification dismissed");
        Ok(())
    }

    fn dismiss_all(&self) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE notifications SET state = 'dismissed', updated_at = ?1 \
                 WHERE state = 'active'",
                [utc_now()],
            )
            .map_err(|err| IntrayError::sqlite("dismiss all notifications", err))
        })
    }

    fn list(&self, filter: &Filter) -> Result<Vec<Notification>> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(state) = filter.state {
            clauses.push("state = ?");
            values.push(state.as_str().to_string());
        }
        if let Some(level) = filter.level {
            clauses.push("level = ?");
            values.push(level.as_str().to_string());
        }
        for (column, value) in [
            ("session = ?", &filter.session),
            ("window = ?", &filter.window),
            ("pane = ?", &filter.pane),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                clauses.push(column);
                values.push(value.to_string());
            }
        }
        match filter.read {
            Some(ReadFilter::Read) => clauses.push("read_timestamp != ''"),
            Some(ReadFilter::Unread) => clauses.push("read_timestamp = ''"),
            None => {}
        }

        let mut sql = format!("SELECT {} FROM notifications", SELECT_COLUMNS);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY id ASC");

        let rows = self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|err| IntrayError::sqlite("prepare list query", err))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), row_to_notification)
                .map_err(|err| IntrayError::sqlite("list notifications", err))?;

            let mut notifications = Vec::new();
            for row in rows {
                notifications
                    .push(row.map_err(|err| IntrayError::sqlite("decode notification row", err))?);
            }
            Ok(notifications)
        })?;

        // Time bounds need parsed timestamps, so they are applied here.
        Ok(rows.into_iter().filter(|n| filter.matches(n)).collect())
    }

    fn cleanup(&self, older_than_days: u32, dry_run: bool) -> Result<usize> {
        let cutoff = cleanup_cutoff(older_than_days);
        let removed = self.with_connection(|conn| {
            let tx = conn
                .transaction()
                .map_err(|err| IntrayError::sqlite("begin cleanup", err))?;

            let candidates: Vec<(i64, String)> = {
                let mut stmt = tx
                    .prepare("SELECT id, timestamp FROM notifications WHERE state = 'dismissed'")
                    .map_err(|err| IntrayError::sqlite("prepare cleanup query", err))?;
                let rows = stmt
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                    .map_err(|err| IntrayError::sqlite("select cleanup candidates", err))?;
                let mut candidates = Vec::new();
                for row in rows {
                    candidates
                        .push(row.map_err(|err| IntrayError::sqlite("decode cleanup row", err))?);
                }
                candidates
            };

            let expired: Vec<i64> = candidates
                .into_iter()
                .filter(|(_, timestamp)| is_expired(timestamp, cutoff))
                .map(|(id, _)| id)
                .collect();
            if dry_run {
                return Ok(expired.len());
            }

            for id in &expired {
                tx.execute("DELETE FROM notifications WHERE id = ?1", [id])
                    .map_err(|err| IntrayError::sqlite("delete expired notification", err))?;
            }
            tx.commit()
                .map_err(|err| IntrayError::sqlite("commit cleanup", err))?;
            Ok(expired.len())
        })?;
        if !dry_run {
            tracing::debug!(backend = "sqlite", removed, older_than_days, "cleanup finished");
        }
        Ok(removed)
    }

    fn clear_all(&self) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM notifications", [])
                .map_err(|err| IntrayError::sqlite("clear notifications", err))
        })
    }

    fn get(&self, id: u64) -> Result<Notification> {
        let sql_id = to_sql_id(id)?;
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM notifications WHERE id = ?1", SELECT_COLUMNS),
                [sql_id],
                row_to_notification,
            )
            .optional()
            .map_err(|err| IntrayError::sqlite("get notification", err))?
            .ok_or(IntrayError::NotFound(id))
        })
    }

    fn active_count(&self) -> Result<usize> {
        let count: i64 = self.with_connection(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE state = 'active'",
                [],
                |row| row.get(0),
            )
            .map_err(|err| IntrayError::sqlite("count active notifications", err))
        })?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl SqliteStorage {
    fn set_read_timestamp(&self, id: u64, read_timestamp: &str) -> Result<()> {
        let sql_id = to_sql_id(id)?;
        let changed = self.with_connection(|conn| {
            conn.execute(
                "UPDATE notifications SET read_timestamp = ?2, updated_at = ?3 WHERE id = ?1",
                params![sql_id, read_timestamp, utc_now()],
            )
            .map_err(|err| IntrayError::sqlite("update read state", err))
        })?;
        if changed == 0 {
            return Err(IntrayError::NotFound(id));
        }
        Ok(())
    }
}

fn ensure_notification_columns(conn: &Connection) -> Result<()> {
    let mut stmt = conn
        .prepare("PRAGMA table_info(notifications)")
        .map_err(|err| IntrayError::sqlite("read notifications schema", err))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|err| IntrayError::sqlite("read notifications schema rows", err))?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|err| IntrayError::sqlite("decode schema row", err))?);
    }

    if !columns.iter().any(|name| name == "session_name") {
        conn.execute(
            "ALTER TABLE notifications ADD COLUMN session_name TEXT NOT NULL DEFAULT ''",
            [],
        )
        .map_err(|err| IntrayError::sqlite("add session_name column", err))?;
        tracing::info!("added session_name column to notifications table");
    }

    if !columns.iter().any(|name| name == "read_timestamp") {
        conn.execute(
            "ALTER TABLE notifications ADD COLUMN read_timestamp TEXT NOT NULL DEFAULT ''",
            [],
        )
        .map_err(|err| IntrayError::sqlite("add read_timestamp column", err))?;
    }

    if !columns.iter().any(|name| name == "updated_at") {
        conn.execute(
            "ALTER TABLE notifications ADD COLUMN updated_at TEXT NOT NULL DEFAULT ''",
            [],
        )
        .map_err(|err| IntrayError::sqlite("add updated_at column", err))?;
    }

    Ok(())
}

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let state: String = row.get(2)?;
    let level: String = row.get(9)?;
    Ok(Notification {
        id: from_sql_id(row.get(0)?),
        timestamp: row.get(1)?,
        state: NotificationState::from_str(&state)
            .ok_or_else(|| conversion_error(2, format!("invalid state '{}'", state)))?,
        session: row.get(3)?,
        session_name: row.get(4)?,
        window: row.get(5)?,
        pane: row.get(6)?,
        message: row.get(7)?,
        pane_created: row.get(8)?,
        level: NotificationLevel::from_str(&level)
            .ok_or_else(|| conversion_error(9, format!("invalid level '{}'", level)))?,
        read_timestamp: row.get(10)?,
    })
}

fn conversion_error(column: usize, reason: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, reason.into())
}

fn to_sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| IntrayError::validation(format!("notification id out of range: {}", id)))
}

fn from_sql_id(id: i64) -> u64 {
    u64::try_from(id).unwrap_or(0)
}
