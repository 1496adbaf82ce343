//! Runtime configuration.
//!
//! Resolution order: built-in defaults, then the TOML file, then
//! `TMUX_INTRAY_*` environment variables. Environment lookups are injected so
//! that tests never touch the process environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dedup::{parse_criteria, parse_window, DedupOptions};
use crate::error::{IntrayError, Result};
use crate::storage::dual::{DualWriterOptions, ReadBackend};

pub const CONFIG_PATH_ENV: &str = "TMUX_INTRAY_CONFIG_PATH";
pub const STATE_DIR_ENV: &str = "TMUX_INTRAY_STATE_DIR";
pub const STORAGE_BACKEND_ENV: &str = "TMUX_INTRAY_STORAGE_BACKEND";
pub const AUTO_CLEANUP_DAYS_ENV: &str = "TMUX_INTRAY_AUTO_CLEANUP_DAYS";
pub const DEDUP_CRITERIA_ENV: &str = "TMUX_INTRAY_DEDUP_CRITERIA";
pub const DEDUP_WINDOW_ENV: &str = "TMUX_INTRAY_DEDUP_WINDOW";

const APP_DIR: &str = "tmux-intray";
const CONFIG_FILE: &str = "config.toml";
const TSV_FILE: &str = "notifications.tsv";
const SEQ_FILE: &str = "notifications.seq";
const DB_FILE: &str = "notifications.db";
const LOG_DIR: &str = "logs";

const DEFAULT_AUTO_CLEANUP_DAYS: u32 = 30;
const DEFAULT_SAMPLE_SIZE: usize = 25;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Tsv,
    Sqlite,
    Dual,
}

impl StorageBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackendKind::Tsv => "tsv",
            StorageBackendKind::Sqlite => "sqlite",
            StorageBackendKind::Dual => "dual",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tsv" => Some(StorageBackendKind::Tsv),
            "sqlite" => Some(StorageBackendKind::Sqlite),
            "dual" => Some(StorageBackendKind::Dual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub criteria: String,
    /// Go-style duration; empty disables bucketing.
    pub window: String,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            criteria: "message".to_string(),
            window: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DualConfig {
    pub read_backend: ReadBackend,
    pub verify_only: bool,
    pub sample_size: usize,
}

impl Default for DualConfig {
    fn default() -> Self {
        Self {
            read_backend: ReadBackend::Primary,
            verify_only: false,
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrayConfig {
    /// Empty until resolved by [`IntrayConfig::load`].
    pub state_dir: PathBuf,
    pub storage_backend: StorageBackendKind,
    pub auto_cleanup_days: u32,
    pub dedup: DedupConfig,
    pub dual: DualConfig,
}

impl Default for IntrayConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::new(),
            storage_backend: StorageBackendKind::Tsv,
            auto_cleanup_days: DEFAULT_AUTO_CLEANUP_DAYS,
            dedup: DedupConfig::default(),
            dual: DualConfig::default(),
        }
    }
}

impl IntrayConfig {
    /// Defaults rooted at `state_dir`. Mostly useful for tests and tools.
    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            ..Self::default()
        }
    }

    /// Loads configuration using the process environment.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<F>(path: Option<PathBuf>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = match path {
            Some(path) => path,
            None => default_config_path(&env)?,
        };

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .map_err(|err| IntrayError::io("read config", err))?;
            toml::from_str::<IntrayConfig>(&content).map_err(|err| {
                IntrayError::ConfigMalformed {
                    path: config_path.clone(),
                    details: err.to_string(),
                }
            })?
        } else {
            tracing::debug!(path = %config_path.display(), "config file missing, using defaults");
            IntrayConfig::default()
        };

        if let Err(err) = parse_window(&config.dedup.window) {
            return Err(IntrayError::ConfigMalformed {
                path: config_path,
                details: format!("dedup.window: {}", err),
            });
        }

        config.apply_env(&env);
        if config.state_dir.as_os_str().is_empty() {
            config.state_dir = default_state_dir(&env)?;
        }
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = non_empty_env(env, STATE_DIR_ENV) {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(value) = non_empty_env(env, STORAGE_BACKEND_ENV) {
            match StorageBackendKind::from_str(&value) {
                Some(kind) => self.storage_backend = kind,
                None => tracing::warn!(
                    value = %value,
                    fallback = self.storage_backend.as_str(),
                    "unknown storage backend in environment, ignoring"
                ),
            }
        }
        if let Some(value) = non_empty_env(env, AUTO_CLEANUP_DAYS_ENV) {
            match value.parse() {
                Ok(days) => self.auto_cleanup_days = days,
                Err(_) => tracing::warn!(value = %value, "invalid auto cleanup days in environment, ignoring"),
            }
        }
        if let Some(value) = non_empty_env(env, DEDUP_CRITERIA_ENV) {
            self.dedup.criteria = value;
        }
        if let Some(value) = env(DEDUP_WINDOW_ENV) {
            match parse_window(&value) {
                Ok(_) => self.dedup.window = value,
                Err(err) => tracing::warn!(
                    value = %value,
                    error = %err,
                    fallback = %self.dedup.window,
                    "invalid dedup window in environment, ignoring"
                ),
            }
        }
    }

    pub fn tsv_path(&self) -> PathBuf {
        self.state_dir.join(TSV_FILE)
    }

    pub fn seq_path(&self) -> PathBuf {
        self.state_dir.join(SEQ_FILE)
    }

    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join(DB_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join(LOG_DIR)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn dedup_options(&self) -> Result<DedupOptions> {
        Ok(DedupOptions::new(
            parse_criteria(&self.dedup.criteria),
            parse_window(&self.dedup.window)?,
        ))
    }

    pub fn dual_options(&self) -> DualWriterOptions {
        DualWriterOptions {
            sample_size: self.dual.sample_size,
            verify_only: self.dual.verify_only,
            read_backend: self.dual.read_backend,
        }
    }
}

fn non_empty_env<F>(env: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    env(key).filter(|value| !value.trim().is_empty())
}

fn xdg_dir<F>(env: &F, key: &str, fallback: &[&str]) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = non_empty_env(env, key) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().ok_or(IntrayError::HomeDirNotFound)?;
    Ok(fallback.iter().fold(home, |path, part| path.join(part)))
}

/// `$TMUX_INTRAY_CONFIG_PATH`, else `$XDG_CONFIG_HOME/tmux-intray/config.toml`.
pub fn default_config_path<F>(env: &F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = non_empty_env(env, CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    Ok(xdg_dir(env, "XDG_CONFIG_HOME", &[".config"])?
        .join(APP_DIR)
        .join(CONFIG_FILE))
}

/// `$XDG_STATE_HOME/tmux-intray`, falling back to `~/.local/state/tmux-intray`.
pub fn default_state_dir<F>(env: &F) -> Result<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(xdg_dir(env, "XDG_STATE_HOME", &[".local", "state"])?.join(APP_DIR))
}
