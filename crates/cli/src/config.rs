//! Configuration loading and validation for the `envelope` binary.
//!
//! All values are read from `ENVELOPE_`-prefixed environment variables at
//! startup. The process exits with a clear error message if any required
//! variable is missing or invalid.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use common::KmsProvider;

use crate::commands::Command;

const ENV_PREFIX: &str = "ENVELOPE";

/// Validated `envelope` configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Which KMS wraps the data keys. Case-insensitive; empty means GCP.
    #[serde(default)]
    pub kms_provider: KmsProvider,

    /// Full master key identifier. Required for AWS (key id, ARN or alias).
    /// For GCP it overrides the resource name built from the parts below.
    #[serde(default)]
    pub key_name: String,

    /// GCP project holding the key ring.
    #[serde(default)]
    pub project_id: String,

    /// GCP location of the key ring (e.g. `"global"`, `"europe-west1"`).
    #[serde(default)]
    pub location_id: String,

    /// GCP key ring name.
    #[serde(default)]
    pub key_ring_id: String,

    /// GCP crypto key name.
    #[serde(default)]
    pub crypto_key_id: String,

    /// AWS region the KMS client talks to.
    #[serde(default = "default_aws_region")]
    pub aws_region: String,

    /// Optional AWS KMS endpoint override (LocalStack, VPC endpoint).
    #[serde(default)]
    pub aws_endpoint_url: Option<String>,

    /// Base URL of the Cloud KMS REST API.
    #[serde(default = "default_gcp_endpoint")]
    pub gcp_endpoint: String,

    /// OAuth2 bearer token for Cloud KMS. **Required** for GCP.
    #[serde(default)]
    pub gcp_access_token: String,

    /// Upper bound (seconds) on a single KMS call.
    #[serde(default = "default_kms_timeout")]
    pub kms_timeout_secs: u64,

    /// File to read. Defaults depend on the command.
    #[serde(default)]
    pub source_path: Option<PathBuf>,

    /// File to write. Defaults depend on the command.
    #[serde(default)]
    pub target_path: Option<PathBuf>,

    /// Emit the envelope as one line instead of 40-character lines.
    #[serde(default)]
    pub single_line: bool,

    /// Keep the source file instead of zero-filling and removing it.
    #[serde(default)]
    pub retain_source: bool,

    /// Decrypt to stdout instead of the target file.
    #[serde(default)]
    pub to_stdout: bool,

    /// Decrypt only to prove the envelope opens; write and erase nothing.
    #[serde(default)]
    pub validate_only: bool,

    /// Tracing log level (e.g. `"warn"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,
}

fn default_aws_region() -> String {
    "eu-west-1".into()
}
fn default_gcp_endpoint() -> String {
    "https://cloudkms.googleapis.com/v1".into()
}
fn default_kms_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "warn".into()
}

impl Settings {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::with_prefix(ENV_PREFIX))
    }

    fn load(env: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(env)
            .build()
            .context("failed to build configuration from environment")?;

        let s: Settings = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        s.validate()?;
        Ok(s)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        self.key_identifier()?;
        match self.kms_provider {
            KmsProvider::Aws => ensure_non_empty(&self.aws_region, "ENVELOPE_AWS_REGION")?,
            KmsProvider::Gcp => {
                ensure_non_empty(&self.gcp_endpoint, "ENVELOPE_GCP_ENDPOINT")?;
                ensure_non_empty(&self.gcp_access_token, "ENVELOPE_GCP_ACCESS_TOKEN")?;
            }
        }
        if self.kms_timeout_secs == 0 {
            anyhow::bail!("ENVELOPE_KMS_TIMEOUT_SECS must be > 0");
        }
        if self.validate_only && self.to_stdout {
            anyhow::bail!("ENVELOPE_VALIDATE_ONLY and ENVELOPE_TO_STDOUT are mutually exclusive");
        }
        Ok(())
    }

    /// The master key name passed to the KMS.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `key_name` nor (for GCP) the full set of
    /// resource parts is configured.
    pub fn key_identifier(&self) -> Result<String> {
        if !self.key_name.trim().is_empty() {
            return Ok(self.key_name.trim().to_owned());
        }
        match self.kms_provider {
            KmsProvider::Aws => {
                anyhow::bail!("ENVELOPE_KEY_NAME is required for the aws provider")
            }
            KmsProvider::Gcp => {
                ensure_non_empty(&self.project_id, "ENVELOPE_PROJECT_ID")?;
                ensure_non_empty(&self.location_id, "ENVELOPE_LOCATION_ID")?;
                ensure_non_empty(&self.key_ring_id, "ENVELOPE_KEY_RING_ID")?;
                ensure_non_empty(&self.crypto_key_id, "ENVELOPE_CRYPTO_KEY_ID")?;
                Ok(format!(
                    "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
                    self.project_id.trim(),
                    self.location_id.trim(),
                    self.key_ring_id.trim(),
                    self.crypto_key_id.trim()
                ))
            }
        }
    }

    /// File the command reads.
    pub fn source_for(&self, command: Command) -> PathBuf {
        self.source_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(command.default_source()))
    }

    /// File the command writes. Re-encryption defaults to replacing its source.
    pub fn target_for(&self, command: Command) -> PathBuf {
        match (&self.target_path, command) {
            (Some(path), _) => path.clone(),
            (None, Command::Reencrypt) => self.source_for(command),
            (None, _) => PathBuf::from(command.default_target()),
        }
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

/// GCP settings with every optional flag off, for tests across the crate.
#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        kms_provider: KmsProvider::Gcp,
        key_name: String::new(),
        project_id: "acme".into(),
        location_id: "europe-west1".into(),
        key_ring_id: "ring".into(),
        crypto_key_id: "files".into(),
        aws_region: default_aws_region(),
        aws_endpoint_url: None,
        gcp_endpoint: default_gcp_endpoint(),
        gcp_access_token: "ya29.token".into(),
        kms_timeout_secs: default_kms_timeout(),
        source_path: None,
        target_path: None,
        single_line: false,
        retain_source: false,
        to_stdout: false,
        validate_only: false,
        log_level: default_log_level(),
        log_json: false,
    }
}
