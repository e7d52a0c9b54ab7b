//! HTTP export transport.
//!
//! Each delivery is `POST {target.url}/{kind}` with a JSON body
//! `{ "kind": ..., "entity_id": ..., "entity": {...} }` and HTTP basic auth.
//! Responses are classified into delivered, transient (retry with backoff)
//! and permanent (give up) outcomes.

use async_trait::async_trait;
use reqwest::StatusCode;
use skywatch_core::domain::{DeliveryOutcome, ExportPayload, ExportTarget};
use skywatch_core::error::{AppError, Result};
use skywatch_core::port::ExportTransport;
use std::time::Duration;
use tracing::{debug, warn};

/// Whole-request timeout; keep below the dispatcher's claim lease
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body excerpt kept in `last_error`
const MAX_BODY_EXCERPT: usize = 200;

/// Classify a non-transport HTTP response
///
/// 2xx is delivered. Statuses that mean the payload or the credentials are
/// wrong are permanent; everything else (5xx, 408, 429, ...) is transient.
pub fn classify_status(status: StatusCode, body: &str) -> DeliveryOutcome {
    if status.is_success() {
        return DeliveryOutcome::Delivered;
    }

    let mut excerpt: String = body.chars().take(MAX_BODY_EXCERPT).collect();
    if body.chars().count() > MAX_BODY_EXCERPT {
        excerpt.push_str("...");
    }
    let reason = format!("HTTP {}: {}", status.as_u16(), excerpt.trim());

    match status.as_u16() {
        400 | 401 | 403 | 413 | 422 => DeliveryOutcome::Permanent(reason),
        _ => DeliveryOutcome::Transient(reason),
    }
}

pub struct HttpExportTransport {
    client: reqwest::Client,
}

impl HttpExportTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .user_agent(concat!("skywatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn endpoint(target: &ExportTarget, payload: &ExportPayload) -> String {
        format!("{}/{}", target.url.trim_end_matches('/'), payload.kind)
    }
}

#[async_trait]
impl ExportTransport for HttpExportTransport {
    async fn push(&self, target: &ExportTarget, payload: &ExportPayload) -> DeliveryOutcome {
        let endpoint = Self::endpoint(target, payload);

        let response = self
            .client
            .post(&endpoint)
            .basic_auth(&target.user, Some(&target.password))
            .json(payload)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                let outcome = classify_status(status, &body);
                debug!(endpoint = %endpoint, status = status.as_u16(), "Export response");
                outcome
            }
            // a malformed target URL will not fix itself
            Err(err) if err.is_builder() => {
                warn!(endpoint = %endpoint, error = %err, "Invalid export target");
                DeliveryOutcome::Permanent(format!("invalid target: {err}"))
            }
            Err(err) => {
                let kind = if err.is_timeout() {
                    "timed out"
                } else if err.is_connect() {
                    "connection failed"
                } else {
                    "request failed"
                };
                debug!(endpoint = %endpoint, error = %err, "Export request {}", kind);
                DeliveryOutcome::Transient(format!("{kind}: {err}"))
            }
        }
    }
}
