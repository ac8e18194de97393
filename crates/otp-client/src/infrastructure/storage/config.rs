//! TOML configuration for the verification client.
//!
//! ```toml
//! [otp]
//! otpd_rp = "/var/run/otpd/socket"
//! allow_sync = true
//! allow_async = false
//! challenge_delay = 30
//! io_timeout_secs = 0
//! reconnect_delay_ms = 0
//!
//! [log]
//! level = "info"
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a file that names
//! only the settings it changes is complete, and an absent file behaves
//! like an empty one.  The policy keys are [`VerifyPolicy`] itself,
//! flattened into `[otp]`, and take its defaults.  `challenge_delay` is the
//! daemon's `int`, so a value above `i32::MAX` is a parse error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use otp_core::protocol::messages::VerifyPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::Endpoint;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error other than "not found".
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub otp: OtpSettings,
    #[serde(default)]
    pub log: LogSettings,
}

/// Daemon endpoint, request policy and socket behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtpSettings {
    /// Path of otpd's Unix-domain socket.
    #[serde(default = "default_otpd_rp")]
    pub otpd_rp: PathBuf,
    /// `allow_sync`, `allow_async`, `challenge_delay` and `resync`, read
    /// from the same `[otp]` table.
    #[serde(flatten)]
    pub policy: VerifyPolicy,
    /// Read/write deadline on daemon sockets, in seconds.  `0` disables it.
    #[serde(default)]
    pub io_timeout_secs: u64,
    /// Pause before reconnecting after the daemon hung up, in milliseconds.
    #[serde(default)]
    pub reconnect_delay_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogSettings {
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_otpd_rp() -> PathBuf {
    PathBuf::from("/var/run/otpd/socket")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            otpd_rp: default_otpd_rp(),
            policy: VerifyPolicy::default(),
            io_timeout_secs: 0,
            reconnect_delay_ms: 0,
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl OtpSettings {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(&self.otpd_rp)
    }

    /// Policy flags for every request.  `resync` is always requested,
    /// whatever the file says.
    pub fn policy(&self) -> VerifyPolicy {
        VerifyPolicy {
            resync: true,
            ..self.policy
        }
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_secs > 0).then(|| Duration::from_secs(self.io_timeout_secs))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: AppConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_points_at_standard_otpd_socket() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.otp.otpd_rp, PathBuf::from("/var/run/otpd/socket"));
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_default_policy_matches_daemon_defaults() {
        let policy = OtpSettings::default().policy();
        assert_eq!(policy, VerifyPolicy::default());
    }

    #[test]
    fn test_default_disables_timeout_and_reconnect_delay() {
        let otp = OtpSettings::default();
        assert_eq!(otp.io_timeout(), None);
        assert_eq!(otp.reconnect_delay(), Duration::ZERO);
    }

    // ── Parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_otp_section_overrides_only_named_fields() {
        // Arrange
        let toml_str = r#"
[otp]
otpd_rp = "/tmp/otpd.sock"
allow_async = true
io_timeout_secs = 5
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.otp.endpoint(), Endpoint::new("/tmp/otpd.sock"));
        assert!(cfg.otp.policy.allow_async);
        assert!(cfg.otp.policy.allow_sync);
        assert_eq!(cfg.otp.policy.challenge_delay, 30);
        assert_eq!(cfg.otp.io_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_policy_fields_reach_the_request_policy() {
        // Arrange
        let toml_str = r#"
[otp]
allow_sync = false
allow_async = true
challenge_delay = 0
resync = false
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize policy");
        let policy = cfg.otp.policy();

        // Assert
        assert!(!policy.allow_sync);
        assert!(policy.allow_async);
        assert_eq!(policy.challenge_delay, 0);
        assert!(policy.resync, "resync is always requested");
    }

    #[test]
    fn test_challenge_delay_must_fit_the_wire_int() {
        let toml_str = "[otp]\nchallenge_delay = 3000000000\n";

        let result: Result<AppConfig, toml::de::Error> = toml::from_str(toml_str);

        assert!(result.is_err());
    }

    #[test]
    fn test_challenge_delay_at_int_max_is_accepted() {
        let toml_str = format!("[otp]\nchallenge_delay = {}\n", i32::MAX);

        let cfg: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg.otp.policy().challenge_delay, i32::MAX);
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    // ── load_config ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = PathBuf::from("/nonexistent/path/that/cannot/exist/config.toml");

        let cfg = load_config(&path).expect("missing file is not an error");

        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_config_reads_file_from_temp_dir() {
        // Arrange
        let dir = std::env::temp_dir().join(format!("otp_config_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[otp]\nreconnect_delay_ms = 250\n[log]\nlevel = \"debug\"\n")
            .unwrap();

        // Act
        let cfg = load_config(&path).expect("load");

        // Assert
        assert_eq!(cfg.otp.reconnect_delay(), Duration::from_millis(250));
        assert_eq!(cfg.log.level, "debug");

        // Cleanup
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_reports_parse_error_for_bad_file() {
        let dir = std::env::temp_dir().join(format!("otp_config_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[otp]\nchallenge_delay = \"soon\"\n").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_reports_io_error_for_directory() {
        let dir = std::env::temp_dir().join(format!("otp_config_test_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        let result = load_config(&dir);

        assert!(matches!(result, Err(ConfigError::Io { .. })));
        std::fs::remove_dir_all(&dir).ok();
    }
}
