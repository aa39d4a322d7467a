//! HTTP delivery target.

use std::time::Duration;

use serde_json::json;
use tracing::{debug, warn};

use super::types::{AttendanceRecord, DeliveryError, DeliveryTarget};

/// Configuration for the HTTP delivery target.
#[derive(Debug, Clone)]
pub struct HttpDeliveryConfig {
    /// Endpoint receiving `POST` batches.
    pub endpoint: String,
    /// Optional bearer token for the `Authorization` header.
    pub bearer_token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Delivers attendance batches to an HTTP endpoint as JSON.
#[derive(Debug)]
pub struct HttpDeliveryTarget {
    http: reqwest::Client,
    config: HttpDeliveryConfig,
}

impl HttpDeliveryTarget {
    /// Build the target, installing the rustls provider and constructing the
    /// HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Permanent` if the HTTP client cannot be
    /// built.
    pub fn new(config: HttpDeliveryConfig) -> Result<Self, DeliveryError> {
        // Install ring as the default crypto provider (no-op if already installed).
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::Permanent(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }
}

impl DeliveryTarget for HttpDeliveryTarget {
    async fn deliver(&self, batch: &[AttendanceRecord]) -> Result<(), DeliveryError> {
        let mut request = self
            .http
            .post(&self.config.endpoint)
            .json(&json!({ "records": batch }));

        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(count = batch.len(), "Attendance batch delivered");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        let prefix: String = body.chars().take(200).collect();
        warn!(status = status.as_u16(), body = %prefix, "Upstream rejected attendance batch");

        if status.is_client_error() {
            Err(DeliveryError::Permanent(format!("{status}: {prefix}")))
        } else {
            Err(DeliveryError::Transient(format!("{status}: {prefix}")))
        }
    }
}
