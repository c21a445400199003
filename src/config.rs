//! Configuration for the sync job
//!
//! This module centralizes the tunable constants used throughout the
//! application and the on-disk JSON configuration document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::SyncError;

// ============================================================================
// Sync Configuration
// ============================================================================

/// Maximum rows per append call imposed by the spreadsheet service
pub const APPEND_CHUNK_ROWS: usize = 100;

/// Pause between append chunks to stay under the service rate limit
pub const APPEND_CHUNK_PAUSE: Duration = Duration::from_secs(1);

/// Default number of runs extracted per batch
///
/// Batching bounds memory and drives progress reporting; it has no effect on
/// the produced rows.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Backoff after an unexpected tick failure before polling resumes
pub const TICK_FAILURE_BACKOFF: Duration = Duration::from_secs(60);

/// Spreadsheet-service ceiling on tabs per spreadsheet
pub const MAX_TAB_COUNT: usize = 100;

/// Number of runs sampled for dynamic header discovery
pub const DYNAMIC_HEADER_SAMPLE: usize = 1;

/// Number of fixed leading columns (run id, timestamp, owner name)
pub const FIXED_COLUMN_COUNT: usize = 3;

// ============================================================================
// Formats
// ============================================================================

/// Timestamp rendering for row cells
///
/// Fixed-width and zero-padded so the lexicographic descending sort in the
/// append path is also chronological.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp suffix embedded in generated tab titles
pub const TAB_SUFFIX_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Summary key carrying the run completion time (epoch seconds)
pub const TIMESTAMP_FIELD: &str = "_timestamp";

// ============================================================================
// HTTP Configuration
// ============================================================================

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Refresh the sheets bearer token when it is within this margin of expiry
pub const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

// ============================================================================
// File Configuration
// ============================================================================

/// On-disk configuration document.
///
/// Keys are SCREAMING_SNAKE_CASE in the file; that spelling is the external
/// contract and is preserved here through serde renames. Loaded once at
/// process start and passed by parameter from there on.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Path to the Google service-account key file
    #[serde(rename = "GCP_JSON")]
    pub gcp_json: PathBuf,

    /// Ordered list of always-present columns; the first three are the run
    /// id, the completion timestamp and the owner name
    #[serde(rename = "FIXED_HEADERS")]
    pub fixed_headers: Vec<String>,

    /// Tracking-service API key; the ambient login is used when absent
    #[serde(rename = "API_KEY", default)]
    pub api_key: Option<String>,

    #[serde(rename = "TEAM_NAME", default)]
    pub team_name: Option<String>,

    #[serde(rename = "PROJECT_NAME", default)]
    pub project_name: Option<String>,

    #[serde(rename = "SPREADSHEET_NAME", default)]
    pub spreadsheet_name: Option<String>,

    /// Owner-identity remap table (raw tracking identity -> display name)
    #[serde(rename = "NAME", default)]
    pub name_map: HashMap<String, String>,
}

impl SyncConfig {
    /// Load and validate the configuration document.
    ///
    /// All validation happens here, before any network call. A missing file,
    /// malformed JSON or missing required key is a configuration error.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config: SyncConfig = serde_json::from_str(&raw).map_err(|e| {
            SyncError::Config(format!("malformed config file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SyncError> {
        if self.fixed_headers.len() < FIXED_COLUMN_COUNT {
            return Err(SyncError::Config(format!(
                "FIXED_HEADERS must list at least the {FIXED_COLUMN_COUNT} fixed columns, got {}",
                self.fixed_headers.len()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_full_config() {
        let file = write_config(
            r#"{
                "GCP_JSON": "/secrets/sa.json",
                "FIXED_HEADERS": ["run_id", "_timestamp", "name", "lr"],
                "API_KEY": "k",
                "TEAM_NAME": "ml-team",
                "PROJECT_NAME": "vision",
                "SPREADSHEET_NAME": "experiments",
                "NAME": {"alice-ml": "Alice"}
            }"#,
        );

        let config = SyncConfig::load(file.path()).unwrap();
        assert_eq!(config.gcp_json, PathBuf::from("/secrets/sa.json"));
        assert_eq!(config.fixed_headers.len(), 4);
        assert_eq!(config.team_name.as_deref(), Some("ml-team"));
        assert_eq!(config.name_map.get("alice-ml").unwrap(), "Alice");
    }

    #[test]
    fn test_load_minimal_config() {
        let file = write_config(
            r#"{"GCP_JSON": "sa.json", "FIXED_HEADERS": ["run_id", "_timestamp", "name"]}"#,
        );

        let config = SyncConfig::load(file.path()).unwrap();
        assert!(config.api_key.is_none());
        assert!(config.name_map.is_empty());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = SyncConfig::load(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_malformed_json_is_config_error() {
        let file = write_config("{not json");
        let err = SyncConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_missing_required_key_is_config_error() {
        let file = write_config(r#"{"FIXED_HEADERS": ["run_id", "_timestamp", "name"]}"#);
        let err = SyncConfig::load(file.path()).unwrap_err();
        match err {
            SyncError::Config(msg) => assert!(msg.contains("GCP_JSON"), "{msg}"),
            other => panic!("expected config error, got {other}"),
        }
    }

    #[test]
    fn test_short_fixed_headers_rejected() {
        let file = write_config(r#"{"GCP_JSON": "sa.json", "FIXED_HEADERS": ["run_id"]}"#);
        let err = SyncConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }
}
