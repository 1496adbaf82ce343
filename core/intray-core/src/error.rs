//! Error types for intray-core operations.

use std::path::PathBuf;

/// All errors that can occur in intray-core operations.
///
/// Validation errors are raised before any storage write. Everything else is a
/// backend error: fatal on a primary backend, recorded (never raised) on the
/// secondary of a dual writer.
#[derive(Debug, thiserror::Error)]
pub enum IntrayError {
    // ─────────────────────────────────────────────────────────────────────
    // Validation Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("validation error: {0}")]
    Validation(String),

    // ─────────────────────────────────────────────────────────────────────
    // Record Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("notification not found: id {0}")]
    NotFound(u64),

    #[error("notification already dismissed: id {0}")]
    AlreadyDismissed(u64),

    #[error("notification id already exists: {0}")]
    DuplicateId(u64),

    // ─────────────────────────────────────────────────────────────────────
    // Backend Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("corrupt record in {path} at line {line}: {reason}")]
    CorruptRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {context}: {source}")]
    Sqlite {
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{backend} storage lock poisoned")]
    LockPoisoned { backend: &'static str },

    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    #[error("Home directory not found")]
    HomeDirNotFound,
}

impl IntrayError {
    pub fn validation(message: impl Into<String>) -> Self {
        IntrayError::Validation(message.into())
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        IntrayError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn sqlite(context: impl Into<String>, source: rusqlite::Error) -> Self {
        IntrayError::Sqlite {
            context: context.into(),
            source,
        }
    }

    /// True for malformed input rejected before touching storage.
    pub fn is_validation(&self) -> bool {
        matches!(self, IntrayError::Validation(_))
    }
}

/// Convenience type alias for Results using IntrayError.
pub type Result<T> = std::result::Result<T, IntrayError>;

// Conversion for string error compatibility
impl From<IntrayError> for String {
    fn from(err: IntrayError) -> String {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_distinguished_from_backend_errors() {
        assert!(IntrayError::validation("message cannot be empty").is_validation());
        assert!(!IntrayError::NotFound(3).is_validation());
        assert!(!IntrayError::io("read", std::io::Error::other("boom")).is_validation());
    }

    #[test]
    fn messages_carry_context() {
        let err = IntrayError::CorruptRecord {
            path: PathBuf::from("/tmp/notifications.tsv"),
            line: 4,
            reason: "invalid field count: 3".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "corrupt record in /tmp/notifications.tsv at line 4: invalid field count: 3"
        );
    }
}
