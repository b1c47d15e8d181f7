//! Controller configuration
//!
//! Loaded from an optional YAML file; every field has a default so an empty
//! file (or no file at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::annotations;
use crate::error::{CoreError, Result};

/// Certificates expiring sooner than this are reissued
pub const DEFAULT_RENEWAL_WINDOW: Duration = Duration::from_secs(24 * 3600);

/// Lifetime of newly issued certificates
pub const DEFAULT_CERTIFICATE_VALIDITY: Duration = Duration::from_secs(365 * 24 * 3600);

/// Upper bound between two checks of the same service
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(3600);

/// Delay before a failed reconciliation is retried
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControllerConfig {
    /// Annotation naming the Secret that holds a service's keypair
    pub secret_name_annotation: String,

    /// Prefix of annotations contributing extra DNS names
    pub dns_name_annotation_prefix: String,

    /// Reissue certificates expiring within this window
    #[serde(with = "humantime_serde")]
    pub renewal_window: Duration,

    /// Validity of newly issued certificates
    #[serde(with = "humantime_serde")]
    pub certificate_validity: Duration,

    /// Restrict Service and Secret watches to one namespace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Requeue delay after a failed reconciliation
    #[serde(with = "humantime_serde")]
    pub error_requeue: Duration,

    /// Maximum delay before a healthy service is checked again
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            secret_name_annotation: annotations::SECRET_NAME.to_string(),
            dns_name_annotation_prefix: annotations::DNS_NAME_PREFIX.to_string(),
            renewal_window: DEFAULT_RENEWAL_WINDOW,
            certificate_validity: DEFAULT_CERTIFICATE_VALIDITY,
            namespace: None,
            error_requeue: DEFAULT_ERROR_REQUEUE,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Reject values that cannot produce a usable controller
    pub fn validate(&self) -> Result<()> {
        if self.secret_name_annotation.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "secretNameAnnotation must not be empty".to_string(),
            });
        }
        if self.dns_name_annotation_prefix.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "dnsNameAnnotationPrefix must not be empty".to_string(),
            });
        }
        if self.certificate_validity <= self.renewal_window {
            return Err(CoreError::InvalidConfig {
                message: format!(
                    "certificateValidity ({}) must exceed renewalWindow ({})",
                    humantime::format_duration(self.certificate_validity),
                    humantime::format_duration(self.renewal_window),
                ),
            });
        }
        if self.resync_interval.is_zero() {
            return Err(CoreError::InvalidConfig {
                message: "resyncInterval must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse a duration flag value, for use as a clap `value_parser`
pub fn duration_arg(value: &str) -> std::result::Result<Duration, String> {
    humantime::parse_duration(value).map_err(|e| format!("invalid duration '{value}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_snapshot() {
        let yaml = ControllerConfig::default().to_yaml().unwrap();
        insta::assert_snapshot!(yaml);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ControllerConfig::from_yaml("").unwrap(), ControllerConfig::default());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ControllerConfig::from_yaml("renewalWindow: 48h\nnamespace: webhooks\n").unwrap();
        assert_eq!(config.renewal_window, Duration::from_secs(48 * 3600));
        assert_eq!(config.namespace.as_deref(), Some("webhooks"));
        assert_eq!(config.secret_name_annotation, annotations::SECRET_NAME);
        assert_eq!(config.certificate_validity, DEFAULT_CERTIFICATE_VALIDITY);
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let result = ControllerConfig::from_yaml("renewalWindow: soon\n");
        assert!(matches!(result, Err(CoreError::YamlParse(_))));
    }

    #[test]
    fn test_validity_must_exceed_window() {
        let result = ControllerConfig::from_yaml("renewalWindow: 10d\ncertificateValidity: 5d\n");
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certsync.yaml");
        std::fs::write(&path, "secretNameAnnotation: example.com/tls-secret\n").unwrap();

        let config = ControllerConfig::load_from(&path).unwrap();
        assert_eq!(config.secret_name_annotation, "example.com/tls-secret");
    }

    #[test]
    fn test_duration_arg() {
        assert_eq!(duration_arg("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(duration_arg("365d"), Ok(DEFAULT_CERTIFICATE_VALIDITY));
        assert!(duration_arg("later").is_err());
    }

    #[test]
    fn test_durations_render_in_humantime_form() {
        let config = ControllerConfig {
            renewal_window: Duration::from_secs(2 * 86_400),
            error_requeue: Duration::from_secs(90),
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert!(yaml.contains("renewalWindow: 2days"));
        assert!(yaml.contains("errorRequeue: 1m 30s"));
        assert_eq!(ControllerConfig::from_yaml(&yaml).unwrap(), config);
    }
}
