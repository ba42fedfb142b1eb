//! Engine configuration.
//!
//! Loaded from RON. Every field has a default, so a partial file (or an empty
//! `()`) is valid:
//!
//! ```ron
//! (
//!     database: Some("novel.db"),
//!     history_depth: 20,
//!     coalesce_window_ms: 3000,
//!     dialogue_open: "「",
//!     dialogue_close: "」",
//!     duplicate_suffix: " (copy)",
//! )
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite file. `None` keeps everything in an in-memory database.
    pub database: Option<PathBuf>,
    /// Maximum entries on each of the undo and redo stacks.
    pub history_depth: usize,
    /// Edits to the same block closer together than this share one undo step.
    pub coalesce_window_ms: u64,
    /// Marker a dialogue block starts with (after trimming).
    pub dialogue_open: String,
    /// Marker a dialogue block ends with (after trimming).
    pub dialogue_close: String,
    /// Appended to the title of a duplicated outline node.
    pub duplicate_suffix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: None,
            history_depth: 20,
            coalesce_window_ms: 3000,
            dialogue_open: "「".to_string(),
            dialogue_close: "」".to_string(),
            duplicate_suffix: " (copy)".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron(&text)
    }

    /// The coalescing window as a [`Duration`].
    pub fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }
}

/// Error type for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_ron("()").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.history_depth, 20);
        assert_eq!(config.coalesce_window(), Duration::from_millis(3000));
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = EngineConfig::from_ron(r#"(history_depth: 5, dialogue_open: "“", dialogue_close: "”")"#).unwrap();
        assert_eq!(config.history_depth, 5);
        assert_eq!(config.dialogue_open, "“");
        assert_eq!(config.duplicate_suffix, " (copy)");
    }

    #[test]
    fn test_bad_ron_is_reported() {
        let err = EngineConfig::from_ron("(history_depth: \"lots\")").unwrap_err();
        assert!(matches!(err, ConfigError::Ron(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.ron");
        std::fs::write(&path, r#"(database: Some("novel.db"), coalesce_window_ms: 500)"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.database, Some(PathBuf::from("novel.db")));
        assert_eq!(config.coalesce_window_ms, 500);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = EngineConfig::load("/definitely/not/here.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
