//! Backend selection from configuration.

use std::path::Path;

use crate::config::{IntrayConfig, StorageBackendKind};
use crate::error::Result;
use crate::filter::Filter;

use super::{replay_records, DualWriter, SqliteStorage, StorageBackend, TsvStorage};

/// Opens the configured backend.
///
/// SQLite and dual modes fall back to the flat file when the database cannot
/// be opened, so a broken database never locks users out of their
/// notifications.
pub fn open_backend(config: &IntrayConfig) -> Result<Box<dyn StorageBackend>> {
    tracing::debug!(
        backend = config.storage_backend.as_str(),
        state_dir = %config.state_dir().display(),
        "opening storage backend"
    );
    match config.storage_backend {
        StorageBackendKind::Tsv => Ok(Box::new(TsvStorage::from_config(config)?)),
        StorageBackendKind::Sqlite => match open_sqlite(config) {
            Ok(sqlite) => Ok(Box::new(sqlite)),
            Err(err) => {
                tracing::warn!(error = %err, "sqlite backend unavailable, falling back to tsv");
                Ok(Box::new(TsvStorage::from_config(config)?))
            }
        },
        StorageBackendKind::Dual => match open_dual(config) {
            Ok(dual) => Ok(Box::new(dual)),
            Err(err) => {
                tracing::warn!(error = %err, "dual writer unavailable, using tsv only");
                Ok(Box::new(TsvStorage::from_config(config)?))
            }
        },
    }
}

/// Flat file as primary, SQLite as secondary. An empty secondary is seeded
/// from the primary; a failed seed is logged and left to verification.
pub fn open_dual(config: &IntrayConfig) -> Result<DualWriter> {
    let tsv = TsvStorage::from_config(config)?;
    let sqlite = SqliteStorage::from_config(config)?;
    let dual = DualWriter::new(Box::new(tsv), Box::new(sqlite), config.dual_options());
    if let Err(err) = dual.seed_secondary_if_empty() {
        tracing::warn!(error = %err, "seeding secondary backend failed");
    }
    Ok(dual)
}

/// Opens the database, importing the flat file when the database is new.
pub fn open_sqlite(config: &IntrayConfig) -> Result<SqliteStorage> {
    let db_path = config.db_path();
    let fresh = !db_path.exists();
    let sqlite = SqliteStorage::from_config(config)?;
    if !fresh || !config.tsv_path().exists() {
        return Ok(sqlite);
    }

    let records = TsvStorage::from_config(config)?.list(&Filter::default())?;
    if records.is_empty() {
        return Ok(sqlite);
    }

    tracing::info!(count = records.len(), "importing flat-file notifications into sqlite");
    match replay_records(&records, &sqlite) {
        Ok(imported) => {
            tracing::info!(imported, skipped = records.len() - imported, "sqlite import complete");
            Ok(sqlite)
        }
        Err(err) => {
            drop(sqlite);
            remove_database(&db_path);
            Err(err)
        }
    }
}

/// Removes a partially imported database so the next open retries the import.
fn remove_database(db_path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let mut path = db_path.as_os_str().to_owned();
        path.push(suffix);
        if let Err(err) = fs_err::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %err, "failed to remove partial sqlite import");
            }
        }
    }
}
