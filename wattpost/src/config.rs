//! Upload configuration.
//!
//! Loaded once at startup and immutable thereafter — a settings change means
//! building a new uploader, not mutating one in place. The shape mirrors the
//! device's JSON configuration blob; everything except `table` has a
//! default.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Token in the device-name template replaced by the runtime identity.
const DEVICE_TOKEN: &str = "$device";

/// Schema name that is omitted from endpoint paths.
const DEFAULT_SCHEMA: &str = "public";

/// Immutable configuration for one uploader instance.
///
/// # Example
///
/// ```rust
/// use wattpost::config::UploadConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = UploadConfig::from_json_str(
///     r#"{"table": "readings", "interval": 60, "bulk_send": 5}"#,
/// )?;
/// assert_eq!(config.effective_schema(), "public");
/// assert_eq!(config.resolve_device_name("iw42"), "iw42");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Target table name. Required.
    pub table: String,

    /// Database schema name. Empty normalizes to `"public"`.
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Device-name template. A literal `$device` is replaced with the
    /// device's runtime identity; an empty template falls back to the raw
    /// identity.
    #[serde(default = "default_device_name")]
    pub device_name: String,

    /// Bearer token for the remote, if it requires authentication.
    #[serde(default)]
    pub jwt_token: Option<String>,

    /// Spacing between uploaded rows, seconds.
    #[serde(default = "default_interval")]
    pub interval: u32,

    /// How many intervals' worth of rows are batched per upload attempt.
    #[serde(default = "default_bulk_send")]
    pub bulk_send: u32,

    /// Output buffer capacity, bytes. Encoding stops once the batch reaches
    /// this size even if the window has more data.
    #[serde(default = "default_buffer_limit")]
    pub buffer_limit: usize,

    /// Do not upload rows earlier than this, epoch seconds. `0` means no
    /// cutoff.
    #[serde(default)]
    pub start_date: u32,

    /// CPU-time budget per scheduler tick for the encoding loop.
    #[serde(with = "duration_serde", default = "default_cpu_budget")]
    pub cpu_budget: Duration,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_device_name() -> String {
    DEVICE_TOKEN.to_string()
}

fn default_interval() -> u32 {
    60
}

fn default_bulk_send() -> u32 {
    1
}

fn default_buffer_limit() -> usize {
    4096
}

fn default_cpu_budget() -> Duration {
    Duration::from_millis(10)
}

impl UploadConfig {
    /// Loads a configuration from a JSON string and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the JSON does not parse or validation
    /// fails.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse { source: e })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a JSON file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, the JSON does not
    /// parse, or validation fails.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.table.is_empty() {
            return Err(ConfigError::MissingTable.into());
        }
        if self.interval == 0 {
            return Err(ConfigError::InvalidInterval {
                seconds: self.interval,
            }
            .into());
        }
        if self.bulk_send == 0 {
            return Err(ConfigError::InvalidBulkSend {
                count: self.bulk_send,
            }
            .into());
        }
        if self.buffer_limit == 0 {
            return Err(ConfigError::InvalidBufferLimit {
                bytes: self.buffer_limit,
            }
            .into());
        }
        Ok(())
    }

    /// Schema name with the empty string normalized to `"public"`.
    pub fn effective_schema(&self) -> &str {
        if self.schema.is_empty() {
            DEFAULT_SCHEMA
        } else {
            &self.schema
        }
    }

    /// Endpoint path for the target table.
    ///
    /// The default schema is omitted; any other schema is spelled
    /// `/<schema>.<table>`.
    pub fn endpoint_path(&self) -> String {
        let schema = self.effective_schema();
        if schema == DEFAULT_SCHEMA {
            format!("/{}", self.table)
        } else {
            format!("/{}.{}", schema, self.table)
        }
    }

    /// Applies the device-name template to the runtime identity.
    pub fn resolve_device_name(&self, identity: &str) -> String {
        if self.device_name.is_empty() {
            return identity.to_string();
        }
        self.device_name.replace(DEVICE_TOKEN, identity)
    }
}

/// Serde support for the `cpu_budget` field.
///
/// Budgets are serialized as total seconds (f64) for human readability in
/// JSON configuration files.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WattpostError;

    fn minimal() -> UploadConfig {
        UploadConfig::from_json_str(r#"{"table": "readings"}"#).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = minimal();
        assert_eq!(config.schema, "public");
        assert_eq!(config.device_name, "$device");
        assert_eq!(config.jwt_token, None);
        assert_eq!(config.interval, 60);
        assert_eq!(config.bulk_send, 1);
        assert_eq!(config.buffer_limit, 4096);
        assert_eq!(config.start_date, 0);
        assert_eq!(config.cpu_budget, Duration::from_millis(10));
    }

    #[test]
    fn test_table_required() {
        let result = UploadConfig::from_json_str(r#"{"table": ""}"#);
        assert!(matches!(
            result,
            Err(WattpostError::Config(ConfigError::MissingTable))
        ));
        assert!(UploadConfig::from_json_str("{}").is_err());
    }

    #[test]
    fn test_validation_bounds() {
        let mut config = minimal();
        config.interval = 0;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.bulk_send = 0;
        assert!(config.validate().is_err());

        let mut config = minimal();
        config.buffer_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_schema_normalizes_to_public() {
        let mut config = minimal();
        config.schema = String::new();
        assert_eq!(config.effective_schema(), "public");
        assert_eq!(config.endpoint_path(), "/readings");
    }

    #[test]
    fn test_endpoint_path_schema_prefix() {
        let mut config = minimal();
        assert_eq!(config.endpoint_path(), "/readings");

        config.schema = "sensors".to_string();
        assert_eq!(config.endpoint_path(), "/sensors.readings");
    }

    #[test]
    fn test_device_name_substitution() {
        let mut config = minimal();
        config.device_name = "$device-main".to_string();
        assert_eq!(config.resolve_device_name("iw42"), "iw42-main");

        config.device_name = "fixed".to_string();
        assert_eq!(config.resolve_device_name("iw42"), "fixed");

        config.device_name = String::new();
        assert_eq!(config.resolve_device_name("iw42"), "iw42");
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.json");
        std::fs::write(
            &path,
            r#"{"table": "readings", "schema": "sensors", "jwt_token": "tok", "cpu_budget": 0.02}"#,
        )
        .unwrap();

        let config = UploadConfig::from_path(&path).unwrap();
        assert_eq!(config.table, "readings");
        assert_eq!(config.schema, "sensors");
        assert_eq!(config.jwt_token.as_deref(), Some("tok"));
        assert_eq!(config.cpu_budget, Duration::from_millis(20));

        assert!(UploadConfig::from_path(dir.path().join("missing.json")).is_err());
    }
}
