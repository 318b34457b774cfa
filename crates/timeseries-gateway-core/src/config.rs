//! Gateway configuration for response processing.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Default header carrying the backend's response context.
pub const DEFAULT_RESPONSE_CONTEXT_HEADER: &str = "X-Druid-Response-Context";

/// Default document field holding the HTTP status code.
pub const DEFAULT_STATUS_CODE_FIELD: &str = "status-code";

/// Settings shared by the response strategies and processors.
///
/// JSON layout example (every field optional):
///
/// ```json
/// {
///   "response_context_header": "X-Druid-Response-Context",
///   "status_code_field": "status-code",
///   "success_status": 200
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Header whose JSON value carries completeness metadata. Also used as the
    /// document key the header is nested under.
    pub response_context_header: String,

    /// Top-level document field holding the backend HTTP status code.
    pub status_code_field: String,

    /// Status code treated as success by the partial-data stage.
    pub success_status: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            response_context_header: DEFAULT_RESPONSE_CONTEXT_HEADER.to_string(),
            status_code_field: DEFAULT_STATUS_CODE_FIELD.to_string(),
            success_status: 200,
        }
    }
}

/// Errors loading a [`GatewayConfig`].
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// Config file could not be read.
    #[snafu(display("Failed to read gateway config at {path}: {source}"))]
    ReadConfig {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Config text is not valid JSON or has unknown fields.
    #[snafu(display("Invalid gateway config: {source}"))]
    ParseConfig {
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

impl GatewayConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).context(ParseConfigSnafu)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).context(ReadConfigSnafu {
            path: path.display().to_string(),
        })?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg = GatewayConfig::from_json_str("{}").expect("parse");
        assert_eq!(cfg, GatewayConfig::default());
        assert_eq!(cfg.response_context_header, "X-Druid-Response-Context");
        assert_eq!(cfg.status_code_field, "status-code");
        assert_eq!(cfg.success_status, 200);
    }

    #[test]
    fn overrides_apply() {
        let cfg = GatewayConfig::from_json_str(r#"{"success_status": 203}"#).expect("parse");
        assert_eq!(cfg.success_status, 203);
        assert_eq!(cfg.status_code_field, DEFAULT_STATUS_CODE_FIELD);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = GatewayConfig::from_json_str(r#"{"retries": 3}"#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseConfig { .. }));
    }

    #[test]
    fn load_reads_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{"status_code_field": "status"}}"#)?;

        let cfg = GatewayConfig::load(file.path())?;
        assert_eq!(cfg.status_code_field, "status");
        Ok(())
    }

    #[test]
    fn load_reports_missing_file() {
        let err = GatewayConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadConfig { .. }));
    }
}
