//! Runtime configuration.
//!
//! Every field has a default so a config file only needs to mention what
//! it changes.

use crate::error::{Result, SyncError};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default quiet interval between the first event of a burst and processing.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Settings shared by the reconciler and the watch loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Debounce window in milliseconds.
    pub debounce_ms: u64,

    /// Follow symbolic links when walking the source tree.
    pub follow_symlinks: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            follow_symlinks: false,
        }
    }
}

impl MirrorConfig {
    /// Loads a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| SyncError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw).map_err(|e| match e {
            SyncError::Config { reason, .. } => SyncError::Config {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    /// Parses a config from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| SyncError::Config {
            path: Default::default(),
            reason: e.to_string(),
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = MirrorConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert!(!config.follow_symlinks);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = MirrorConfig::from_json(r#"{ "follow_symlinks": true }"#).unwrap();
        assert!(config.follow_symlinks);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = MirrorConfig::from_json(r#"{ "debounce": 10 }"#).unwrap_err();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.json");
        std::fs::write(&path, "not json").unwrap();

        match MirrorConfig::load(&path) {
            Err(SyncError::Config { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected config error, got {:?}", other),
        }
    }
}
