//! Warden configuration.
//!
//! Loaded from `~/.config/warden/config.toml` unless a path is given. Every
//! section falls back to its defaults when omitted.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 15;
const DEFAULT_APPROVAL_DURATION_HOURS: u32 = 8;
const DEFAULT_MAX_APPROVAL_DURATION_HOURS: u32 = 7 * 24;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const MIN_SWEEP_INTERVAL_SECS: u64 = 10;
const MAX_CONNECT_TIMEOUT_SECS: u64 = 600;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub database: DatabaseConfig,
    pub connection: ConnectionSettings,
    pub approval: ApprovalSettings,
    pub policy: PolicySettings,
    pub recording: RecordingSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// redb file; defaults to `<data dir>/warden/warden.db`
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Upper bound on connection establishment
    pub connect_timeout_secs: u64,
    pub keepalive_interval_secs: u64,
    /// OpenSSH client binary
    pub ssh_binary: String,
    /// Directory for ControlMaster sockets; defaults to the system temp dir
    pub control_dir: Option<PathBuf>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            ssh_binary: "ssh".to_string(),
            control_dir: None,
        }
    }
}

impl ConnectionSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalSettings {
    /// Lifetime of a new approval request
    pub default_duration_hours: u32,
    /// Longest lifetime a requester may ask for
    pub max_duration_hours: u32,
    /// How often PENDING requests past their expiry are swept
    pub sweep_interval_secs: u64,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self {
            default_duration_hours: DEFAULT_APPROVAL_DURATION_HOURS,
            max_duration_hours: DEFAULT_MAX_APPROVAL_DURATION_HOURS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// IANA zone in which weekdays and time windows are evaluated
    pub timezone: String,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

impl PolicySettings {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Invalid policy timezone '{}': {}", self.timezone, e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub enabled: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl WardenConfig {
    /// Load configuration from the default path, or defaults if absent.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: WardenConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("warden").join("config.toml"))
    }

    /// Resolve the database path, creating its parent directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        let path = match &self.database.path {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
                .join("warden")
                .join("warden.db"),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.connection.connect_timeout_secs == 0
            || self.connection.connect_timeout_secs > MAX_CONNECT_TIMEOUT_SECS
        {
            return Err(anyhow::anyhow!(
                "Connect timeout must be between 1 and {} seconds",
                MAX_CONNECT_TIMEOUT_SECS
            ));
        }

        if self.connection.ssh_binary.trim().is_empty() {
            return Err(anyhow::anyhow!("SSH binary must not be empty"));
        }

        if self.approval.default_duration_hours == 0 {
            return Err(anyhow::anyhow!(
                "Approval duration must be at least 1 hour"
            ));
        }

        if self.approval.max_duration_hours < self.approval.default_duration_hours {
            return Err(anyhow::anyhow!(
                "Maximum approval duration ({}h) is shorter than the default ({}h)",
                self.approval.max_duration_hours,
                self.approval.default_duration_hours
            ));
        }

        if self.approval.sweep_interval_secs < MIN_SWEEP_INTERVAL_SECS {
            return Err(anyhow::anyhow!(
                "Approval sweep interval must be at least {} seconds",
                MIN_SWEEP_INTERVAL_SECS
            ));
        }

        self.policy.tz()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = WardenConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.approval.default_duration_hours, 8);
        assert_eq!(config.policy.tz().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[policy]\ntimezone = \"Europe/Berlin\"\n\n[approval]\ndefault_duration_hours = 2\n",
        )
        .unwrap();

        let config = WardenConfig::load_from_path(&path).unwrap();
        assert_eq!(config.policy.tz().unwrap(), chrono_tz::Europe::Berlin);
        assert_eq!(config.approval.default_duration_hours, 2);
        assert_eq!(config.approval.sweep_interval_secs, 300);
        assert_eq!(config.connection.ssh_binary, "ssh");
    }

    #[test]
    fn test_rejects_bad_timezone() {
        let mut config = WardenConfig::default();
        config.policy.timezone = "Mars/Olympus".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = WardenConfig::default();
        config.connection.connect_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_max_duration_below_default() {
        let mut config = WardenConfig::default();
        config.approval.max_duration_hours = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_fast_sweep() {
        let mut config = WardenConfig::default();
        config.approval.sweep_interval_secs = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[connection\nconnect_timeout_secs = ").unwrap();
        assert!(WardenConfig::load_from_path(&path).is_err());
    }
}
