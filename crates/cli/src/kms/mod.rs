//! KMS provider clients behind [`envelope::KeyManagementClient`].

pub mod aws;
pub mod gcp;

use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use common::KmsProvider;
use envelope::KeyManagementClient;

use crate::config::Settings;

/// Build the client for the configured provider.
///
/// # Errors
///
/// Returns an error if the provider SDK or HTTP client cannot be initialised.
pub fn build_client(cfg: &Settings) -> Result<Box<dyn KeyManagementClient>> {
    let timeout = Duration::from_secs(cfg.kms_timeout_secs);
    debug!(
        provider = %cfg.kms_provider,
        timeout_secs = cfg.kms_timeout_secs,
        "building KMS client"
    );

    Ok(match cfg.kms_provider {
        KmsProvider::Aws => Box::new(aws::AwsKms::init(
            &cfg.aws_region,
            cfg.aws_endpoint_url.as_deref(),
            timeout,
        )?),
        KmsProvider::Gcp => Box::new(gcp::GcpKms::new(
            &cfg.gcp_endpoint,
            &cfg.gcp_access_token,
            timeout,
        )?),
    })
}
