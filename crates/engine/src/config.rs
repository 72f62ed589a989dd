//! Tablet configuration via `tablet.toml`
//!
//! On first open of a tablet directory, a default `tablet.toml` is created.
//! To change settings, edit the file and reopen the tablet.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tablet_core::{TabletError, TabletResult, MIB};

/// Config file name placed in the tablet directory.
pub const CONFIG_FILE_NAME: &str = "tablet.toml";

/// Tablet configuration loaded from `tablet.toml`.
///
/// # Example
///
/// ```toml
/// # Maximum memory held by in-flight transactions, in MiB (-1 = unlimited)
/// transaction_memory_limit_mb = 64
///
/// # How often a blocked drain logs the transactions it is waiting on
/// drain_complain_interval_ms = 1000
///
/// # drain_timeout_ms = 30000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TabletConfig {
    /// Transaction memory limit in MiB. Negative means unlimited.
    #[serde(default = "default_memory_limit_mb")]
    pub transaction_memory_limit_mb: i64,
    /// Interval between drain complaints, in milliseconds. Must be positive.
    #[serde(default = "default_complain_interval_ms")]
    pub drain_complain_interval_ms: u64,
    /// Upper bound on how long `close` waits for in-flight transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drain_timeout_ms: Option<u64>,
}

fn default_memory_limit_mb() -> i64 {
    64
}

fn default_complain_interval_ms() -> u64 {
    1000
}

impl Default for TabletConfig {
    fn default() -> Self {
        Self {
            transaction_memory_limit_mb: default_memory_limit_mb(),
            drain_complain_interval_ms: default_complain_interval_ms(),
            drain_timeout_ms: None,
        }
    }
}

impl TabletConfig {
    /// Memory limit in bytes, or `None` when unlimited.
    pub fn memory_limit_bytes(&self) -> Option<u64> {
        u64::try_from(self.transaction_memory_limit_mb)
            .ok()
            .map(|mb| mb.saturating_mul(MIB))
    }

    /// Interval between drain complaints.
    pub fn complain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_complain_interval_ms)
    }

    /// Drain timeout used by `close`, if any.
    pub fn drain_timeout(&self) -> Option<Duration> {
        self.drain_timeout_ms.map(Duration::from_millis)
    }

    /// Check field values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the offending field.
    pub fn validate(&self) -> TabletResult<()> {
        self.field_problem()
            .map_or(Ok(()), |problem| Err(TabletError::invalid_input(problem)))
    }

    fn field_problem(&self) -> Option<String> {
        if self.drain_complain_interval_ms == 0 {
            return Some(
                "drain_complain_interval_ms must be greater than 0; a closing tablet \
                 reports its outstanding transactions at this interval"
                    .to_string(),
            );
        }
        None
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Tablet configuration
#
# Maximum memory held by in-flight transactions, in MiB (default: 64).
# Transactions that would push consumption past this are rejected.
# A negative value disables the limit; consumption is still tracked.
transaction_memory_limit_mb = 64

# While closing, log the outstanding transactions this often (default: 1000).
drain_complain_interval_ms = 1000

# Give up closing after this many milliseconds (default: wait forever).
# drain_timeout_ms = 30000
"#
    }

    /// Read, parse and validate a `tablet.toml`.
    ///
    /// # Errors
    ///
    /// - `Internal` if the file cannot be read
    /// - `InvalidInput` if it is not valid TOML for this schema, or a field
    ///   value is out of range; the message names the file and the field
    pub fn from_file(path: &Path) -> TabletResult<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| file_error("read", path, e))?;
        let config: TabletConfig = toml::from_str(&content).map_err(|e| {
            TabletError::invalid_input(format!(
                "Tablet config '{}' is malformed: {}",
                path.display(),
                e
            ))
        })?;
        if let Some(problem) = config.field_problem() {
            return Err(TabletError::invalid_input(format!(
                "Tablet config '{}': {}",
                path.display(),
                problem
            )));
        }
        Ok(config)
    }

    /// Write the commented default `tablet.toml` unless one exists.
    pub fn write_default_if_missing(path: &Path) -> TabletResult<()> {
        if path.exists() {
            return Ok(());
        }
        std::fs::write(path, Self::default_toml()).map_err(|e| file_error("write", path, e))
    }

    /// Write this config to `path` as TOML.
    pub fn write_to_file(&self, path: &Path) -> TabletResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            TabletError::internal(format!("Failed to encode tablet config: {}", e))
        })?;
        std::fs::write(path, content).map_err(|e| file_error("write", path, e))
    }
}

fn file_error(action: &str, path: &Path, e: std::io::Error) -> TabletError {
    TabletError::internal(format!(
        "Failed to {} tablet config '{}': {}",
        action,
        path.display(),
        e
    ))
}
