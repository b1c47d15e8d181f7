//! CLI commands

pub mod config;
pub mod run;
pub mod status;

use std::path::PathBuf;
use std::time::Duration;

use certsync_core::ControllerConfig;
use certsync_core::config::duration_arg;
use clap::Args;

use crate::error::Result;

/// Configuration file plus per-field overrides
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// YAML configuration file
    #[arg(long, env = "CERTSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Annotation naming a service's TLS secret
    #[arg(long, env = "CERTSYNC_SECRET_NAME_ANNOTATION")]
    pub secret_name_annotation: Option<String>,

    /// Prefix of annotations adding DNS names
    #[arg(long, env = "CERTSYNC_DNS_NAME_PREFIX")]
    pub dns_name_prefix: Option<String>,

    /// Reissue certificates expiring within this window (e.g. 24h)
    #[arg(long, env = "CERTSYNC_RENEWAL_WINDOW", value_parser = duration_arg)]
    pub renewal_window: Option<Duration>,

    /// Validity of issued certificates (e.g. 365d)
    #[arg(long, env = "CERTSYNC_CERTIFICATE_VALIDITY", value_parser = duration_arg)]
    pub certificate_validity: Option<Duration>,

    /// Only watch Services and Secrets in this namespace
    #[arg(short, long, env = "CERTSYNC_NAMESPACE")]
    pub namespace: Option<String>,

    /// Retry delay after a failed reconciliation
    #[arg(long, env = "CERTSYNC_ERROR_REQUEUE", value_parser = duration_arg)]
    pub error_requeue: Option<Duration>,

    /// Maximum delay between two checks of a healthy service
    #[arg(long, env = "CERTSYNC_RESYNC_INTERVAL", value_parser = duration_arg)]
    pub resync_interval: Option<Duration>,
}

impl ConfigArgs {
    /// Load the file (if any), apply flag overrides, then validate
    pub fn resolve(&self) -> Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::load_from(path)?,
            None => ControllerConfig::default(),
        };

        if let Some(v) = &self.secret_name_annotation {
            config.secret_name_annotation = v.clone();
        }
        if let Some(v) = &self.dns_name_prefix {
            config.dns_name_annotation_prefix = v.clone();
        }
        if let Some(v) = self.renewal_window {
            config.renewal_window = v;
        }
        if let Some(v) = self.certificate_validity {
            config.certificate_validity = v;
        }
        if let Some(v) = &self.namespace {
            config.namespace = Some(v.clone());
        }
        if let Some(v) = self.error_requeue {
            config.error_requeue = v;
        }
        if let Some(v) = self.resync_interval {
            config.resync_interval = v;
        }

        config.validate()?;
        Ok(config)
    }
}
