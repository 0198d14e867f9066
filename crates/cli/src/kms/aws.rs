//! AWS KMS client.
//!
//! The SDK is async; the engine is not. Each call is driven to completion on
//! a private current-thread runtime owned by [`AwsKms`].

use std::time::Duration;

use anyhow::{Context, Result};
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_kms::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_kms::primitives::Blob;
use tracing::debug;
use zeroize::Zeroizing;

use common::{EnvelopeError, RejectionKind};
use envelope::KeyManagementClient;

/// Wraps and unwraps data keys with `Encrypt` / `Decrypt` on a KMS key.
///
/// Credentials come from the standard AWS credential chain.
pub struct AwsKms {
    runtime: tokio::runtime::Runtime,
    client: aws_sdk_kms::Client,
}

impl AwsKms {
    /// Initialise the SDK client for `region`, optionally at a custom endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be started.
    pub fn init(region: &str, endpoint_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start runtime for the AWS SDK")?;

        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_owned()))
                .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build())
                .load(),
        );

        let mut builder = aws_sdk_kms::config::Builder::from(&sdk_config);
        if let Some(url) = endpoint_url {
            builder = builder.endpoint_url(url);
        }
        let client = aws_sdk_kms::Client::from_conf(builder.build());

        debug!(region, endpoint = endpoint_url.unwrap_or("default"), "AWS KMS client ready");
        Ok(Self { runtime, client })
    }
}

impl KeyManagementClient for AwsKms {
    fn wrap_key(&self, key_id: &str, plaintext_key: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let resp = self
            .runtime
            .block_on(
                self.client
                    .encrypt()
                    .key_id(key_id)
                    .plaintext(Blob::new(plaintext_key.to_vec()))
                    .send(),
            )
            .map_err(classify)?;

        let blob = resp.ciphertext_blob().ok_or_else(|| {
            EnvelopeError::rejected(
                RejectionKind::Other,
                "KMS encrypt response contained no ciphertext",
            )
        })?;
        Ok(blob.as_ref().to_vec())
    }

    fn unwrap_key(
        &self,
        key_id: &str,
        wrapped_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        let resp = self
            .runtime
            .block_on(
                self.client
                    .decrypt()
                    .key_id(key_id)
                    .ciphertext_blob(Blob::new(wrapped_key.to_vec()))
                    .send(),
            )
            .map_err(classify)?;

        let plaintext = resp.plaintext().ok_or_else(|| {
            EnvelopeError::rejected(
                RejectionKind::Other,
                "KMS decrypt response contained no plaintext",
            )
        })?;
        Ok(Zeroizing::new(plaintext.as_ref().to_vec()))
    }
}

fn classify<E, R>(err: SdkError<E, R>) -> EnvelopeError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    match err.as_service_error() {
        Some(service_err) => classify_code(service_err.code(), detail),
        // Timeouts, dispatch and response failures never reached a decision.
        None => EnvelopeError::KeyServiceUnavailable(detail),
    }
}

/// Map a KMS error code to the envelope error taxonomy.
fn classify_code(code: Option<&str>, detail: String) -> EnvelopeError {
    match code {
        Some("InvalidCiphertextException" | "IncorrectKeyException") => {
            EnvelopeError::rejected(RejectionKind::InvalidCiphertext, detail)
        }
        Some("AccessDeniedException" | "InvalidGrantTokenException") => {
            EnvelopeError::rejected(RejectionKind::PermissionDenied, detail)
        }
        Some("NotFoundException" | "DisabledException" | "KMSInvalidStateException") => {
            EnvelopeError::rejected(RejectionKind::NotFound, detail)
        }
        Some(
            "DependencyTimeoutException"
            | "KMSInternalException"
            | "KeyUnavailableException"
            | "ThrottlingException"
            | "LimitExceededException",
        ) => EnvelopeError::KeyServiceUnavailable(detail),
        _ => EnvelopeError::rejected(RejectionKind::Other, detail),
    }
}
