//! HTTPS + JSON activation authority.
//!
//! Endpoints, relative to the configured base URL:
//! - `POST /api/activation/redeem`
//! - `POST /api/activation/check`
//!
//! Both take `{"key", "machineId"}` and answer with
//! `{"valid", "activationType", "expiresAt", "error"}`.

use crate::authority::{ActivationAuthority, RejectionKind, RemoteEntitlement};
use crate::clock::parse_server_timestamp;
use crate::config::AuthorityConfig;
use crate::error::{ActivationError, ActivationResult};
use crate::key::{ActivationKey, ActivationType};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const REDEEM_PATH: &str = "/api/activation/redeem";
const CHECK_PATH: &str = "/api/activation/check";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EntitlementRequest<'a> {
    key: &'a str,
    machine_id: &'a str,
}

// Refusals may carry a null type or an error code this client does not
// know yet; neither may turn a refusal into a decode failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntitlementResponse {
    valid: bool,
    #[serde(default)]
    activation_type: Option<ActivationType>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Activation authority reached over HTTP.
pub struct HttpAuthority {
    config: AuthorityConfig,
    client: Client,
}

impl HttpAuthority {
    /// Creates a client with the configured per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ActivationError::Config`] if the HTTP client cannot be built.
    pub fn new(config: AuthorityConfig) -> ActivationResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ActivationError::Config(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Returns the base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn call(
        &self,
        path: &str,
        key: &ActivationKey,
        machine_id: &str,
    ) -> ActivationResult<RemoteEntitlement> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), path);
        debug!("POST {} key={} request_id={}", url, key.masked(), request_id);

        let mut request = self
            .client
            .post(&url)
            .header("X-Request-Id", &request_id)
            .json(&EntitlementRequest {
                key: key.as_str(),
                machine_id,
            });
        if let Some(token) = &self.config.api_key {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ActivationError::Network(format!("{path} timed out"))
            } else {
                ActivationError::Network(format!("{path} failed: {e}"))
            }
        })?;

        let status = response.status();
        if let Some(kind) = rejection_for_status(status) {
            debug!("Authority refused key {} with {}", key.masked(), status);
            return Ok(RemoteEntitlement::rejected(kind));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Authority returned {} for {}: {}", status, path, body);
            return Err(ActivationError::Network(format!(
                "authority returned {status}"
            )));
        }

        let body: EntitlementResponse = response.json().await.map_err(|e| {
            ActivationError::Network(format!("failed to parse authority response: {e}"))
        })?;
        into_entitlement(body)
    }
}

fn rejection_for_status(status: StatusCode) -> Option<RejectionKind> {
    match status {
        StatusCode::NOT_FOUND => Some(RejectionKind::InvalidKey),
        StatusCode::CONFLICT => Some(RejectionKind::AlreadyActivatedElsewhere),
        StatusCode::FORBIDDEN | StatusCode::GONE => Some(RejectionKind::Inactive),
        _ => None,
    }
}

fn rejection_for_code(code: &str) -> RejectionKind {
    match code {
        "invalid_key" => RejectionKind::InvalidKey,
        "already_activated_elsewhere" => RejectionKind::AlreadyActivatedElsewhere,
        "inactive" => RejectionKind::Inactive,
        other => {
            warn!("Unrecognized refusal code from authority: {other}");
            RejectionKind::Inactive
        }
    }
}

fn into_entitlement(body: EntitlementResponse) -> ActivationResult<RemoteEntitlement> {
    let activation_type = body.activation_type.unwrap_or_default();
    let expires_at = body.expires_at.as_deref().map(|raw| (raw, parse_server_timestamp(raw)));

    if !body.valid {
        // The expiry is clamped on refusal anyway; a bad one must not void it.
        return Ok(RemoteEntitlement {
            valid: false,
            activation_type,
            expires_at: expires_at.and_then(|(_, parsed)| parsed),
            error_kind: body.error.as_deref().map(rejection_for_code),
        });
    }

    // An unreadable expiry must not be mistaken for "never expires".
    let expires_at = match expires_at {
        None => None,
        Some((raw, parsed)) => Some(parsed.ok_or_else(|| {
            ActivationError::Network(format!("authority sent an unreadable expiresAt: {raw}"))
        })?),
    };
    Ok(RemoteEntitlement::granted(activation_type, expires_at))
}

#[async_trait]
impl ActivationAuthority for HttpAuthority {
    async fn redeem(
        &self,
        key: &ActivationKey,
        machine_id: &str,
    ) -> ActivationResult<RemoteEntitlement> {
        self.call(REDEEM_PATH, key, machine_id).await
    }

    async fn check_entitlement(
        &self,
        key: &ActivationKey,
        machine_id: &str,
    ) -> ActivationResult<RemoteEntitlement> {
        self.call(CHECK_PATH, key, machine_id).await
    }
}
