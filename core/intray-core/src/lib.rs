//! # intray-core
//!
//! Storage, deduplication and grouping core for the tmux notification tray.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime. Every storage call blocks until done.
//! - **Backends behind a trait**: Flat file, SQLite and the dual writer all
//!   implement [`StorageBackend`]; callers never depend on a concrete type.
//! - **No global state**: [`IntrayConfig`] is loaded once and passed in.
//! - **Pure views**: Dedup keys, grouping, filtering and sorting never touch
//!   storage.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use intray_core::{open_backend, IntrayConfig, NewNotification, NotificationLevel};
//!
//! let config = IntrayConfig::load(None)?;
//! let storage = open_backend(&config)?;
//! let id = storage.add(NewNotification::new("build finished", NotificationLevel::Info))?;
//! storage.mark_read(id)?;
//! ```

// Public modules
pub mod config;
pub mod dedup;
pub mod error;
pub mod escape;
pub mod filter;
pub mod grouping;
pub mod notification;
pub mod search;
pub mod sorting;
pub mod storage;

// Re-export commonly used items at crate root
pub use config::{IntrayConfig, StorageBackendKind};
pub use dedup::{build_keys, parse_criteria, parse_window, Criteria, DedupOptions, DedupRecord};
pub use error::{IntrayError, Result};
pub use filter::{filter_notifications, Filter, FilterOptions, ReadFilter};
pub use grouping::{group_counts, group_notifications, Group, GroupByMode, GroupResult};
pub use notification::{NewNotification, Notification, NotificationLevel, NotificationState};
pub use search::{
    search_notifications, RegexSearch, SearchField, SearchOptions, SearchProvider,
    SubstringSearch, TokenSearch,
};
pub use sorting::{
    partition_unread_first, sort_notifications, sort_with_unread_first, SortField, SortOptions,
    SortOrder,
};
pub use storage::{
    open_backend, ConsistencyReport, DualWriter, DualWriterOptions, ReadBackend, SqliteStorage,
    StorageBackend, TsvStorage, WriteMetrics,
};
