//! GCP Cloud KMS client over the REST API.
//!
//! `POST {endpoint}/{key}:encrypt` and `:decrypt`, JSON bodies with base64
//! payloads, bearer token auth.

use std::time::Duration;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

use common::{EnvelopeError, RejectionKind};
use envelope::KeyManagementClient;

#[derive(Serialize)]
struct EncryptRequest<'a> {
    plaintext: &'a str,
}

#[derive(Deserialize)]
struct EncryptResponse {
    ciphertext: String,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    ciphertext: &'a str,
}

#[derive(Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// Wraps and unwraps data keys with a Cloud KMS symmetric crypto key.
pub struct GcpKms {
    http: reqwest::blocking::Client,
    endpoint: String,
    access_token: String,
}

impl GcpKms {
    /// Build a client for the REST API at `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: &str, access_token: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build Cloud KMS HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            access_token: access_token.trim().to_owned(),
        })
    }

    fn url(&self, key_name: &str, method: &str) -> String {
        format!("{}/{}:{method}", self.endpoint, key_name.trim_start_matches('/'))
    }

    fn call<Req, Resp>(&self, url: &str, body: &Req) -> Result<Resp, EnvelopeError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        debug!(url, "calling Cloud KMS");
        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .map_err(|e| {
                EnvelopeError::KeyServiceUnavailable(format!("Cloud KMS request failed: {e}"))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(classify_status(status.as_u16(), &text));
        }
        resp.json::<Resp>().map_err(|e| {
            EnvelopeError::rejected(
                RejectionKind::Other,
                format!("unexpected Cloud KMS response: {e}"),
            )
        })
    }
}

impl KeyManagementClient for GcpKms {
    fn wrap_key(&self, key_id: &str, plaintext_key: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
        let encoded = Zeroizing::new(STANDARD.encode(plaintext_key));
        let resp: EncryptResponse = self.call(
            &self.url(key_id, "encrypt"),
            &EncryptRequest {
                plaintext: &encoded,
            },
        )?;

        STANDARD.decode(resp.ciphertext.as_bytes()).map_err(|e| {
            EnvelopeError::rejected(
                RejectionKind::Other,
                format!("Cloud KMS returned invalid base64 ciphertext: {e}"),
            )
        })
    }

    fn unwrap_key(
        &self,
        key_id: &str,
        wrapped_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EnvelopeError> {
        let encoded = STANDARD.encode(wrapped_key);
        let mut resp: DecryptResponse = self.call(
            &self.url(key_id, "decrypt"),
            &DecryptRequest {
                ciphertext: &encoded,
            },
        )?;

        let decoded = STANDARD.decode(resp.plaintext.as_bytes());
        resp.plaintext.zeroize();
        decoded.map(Zeroizing::new).map_err(|e| {
            EnvelopeError::rejected(
                RejectionKind::Other,
                format!("Cloud KMS returned invalid base64 plaintext: {e}"),
            )
        })
    }
}

/// Map a non-success HTTP status to the envelope error taxonomy.
fn classify_status(status: u16, body: &str) -> EnvelopeError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_owned());
    let detail = format!("Cloud KMS returned HTTP {status}: {message}");

    match status {
        400 => EnvelopeError::rejected(RejectionKind::InvalidCiphertext, detail),
        401 | 403 => EnvelopeError::rejected(RejectionKind::PermissionDenied, detail),
        404 => EnvelopeError::rejected(RejectionKind::NotFound, detail),
        408 | 429 | 500..=599 => EnvelopeError::KeyServiceUnavailable(detail),
        _ => EnvelopeError::rejected(RejectionKind::Other, detail),
    }
}
