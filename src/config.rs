use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

const TRASH_DIR_ENV: &str = "BROWSEY_TRASH_DIR";
const LOG_DIR_ENV: &str = "BROWSEY_LOG_DIR";
const PROGRESS_INTERVAL_ENV: &str = "BROWSEY_PROGRESS_INTERVAL_MS";

pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 100;
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 1024 * 1024;
pub const DEFAULT_MAX_KEEP_BOTH_ATTEMPTS: u32 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub trash_dir: PathBuf,
    pub log_dir: PathBuf,
    pub progress_interval_ms: u64,
    pub copy_buffer_size: usize,
    pub max_keep_both_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trash_dir: default_data_dir().join("trash"),
            log_dir: default_data_dir().join("logs"),
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
            max_keep_both_attempts: DEFAULT_MAX_KEEP_BOTH_ATTEMPTS,
        }
    }
}

impl EngineConfig {
    /// Defaults with `BROWSEY_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parses a JSON settings document; absent fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|e| format!("Invalid engine config: {e}"))
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Some(dir) = env_path(TRASH_DIR_ENV) {
            self.trash_dir = dir;
        }
        if let Some(dir) = env_path(LOG_DIR_ENV) {
            self.log_dir = dir;
        }
        if let Ok(raw) = std::env::var(PROGRESS_INTERVAL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.progress_interval_ms = ms,
                Err(e) => warn!(
                    var = PROGRESS_INTERVAL_ENV,
                    value = %raw,
                    error = %e,
                    "ignoring invalid progress interval override"
                ),
            }
        }
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub(crate) fn buffer_size(&self) -> usize {
        self.copy_buffer_size.max(4096)
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn default_data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("browsey")
}
