use std::future::Future;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use aegis_types::models::Channel;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transient channel failure, retried per the dispatcher policy.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Credentials or endpoint misconfigured. Fatal for the current batch,
    /// never retried.
    #[error("gateway configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The gateway accepted the message for delivery.
    Sent,
    /// The gateway confirmed delivery synchronously.
    Delivered,
}

/// Outbound messaging seam. One capability: push a payload to an address
/// over a channel. Implementations must be cheap to call concurrently.
pub trait NotificationGateway: Send + Sync + 'static {
    fn send(
        &self,
        channel: Channel,
        address: &str,
        payload: &str,
    ) -> impl Future<Output = Result<SendOutcome, GatewayError>> + Send;
}

/// HTTP webhook gateway: POSTs `{channel, address, payload}` to a single
/// configured endpoint (an SMS/email provider bridge).
pub struct WebhookGateway {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WebhookGateway {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }

    pub fn from_env() -> Self {
        let url = std::env::var("AEGIS_GATEWAY_URL").unwrap_or_default();
        let token = std::env::var("AEGIS_GATEWAY_TOKEN").ok();
        Self::new(url, token)
    }
}

impl NotificationGateway for WebhookGateway {
    async fn send(
        &self,
        channel: Channel,
        address: &str,
        payload: &str,
    ) -> Result<SendOutcome, GatewayError> {
        if self.url.is_empty() {
            return Err(GatewayError::Configuration(
                "AEGIS_GATEWAY_URL is not set".into(),
            ));
        }

        let mut req = self.client.post(&self.url).json(&serde_json::json!({
            "channel": channel.as_str(),
            "address": address,
            "payload": payload,
        }));
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GatewayError::Delivery(e.to_string()))?;

        debug!("Gateway responded {} for {} send", resp.status(), channel);

        match resp.status() {
            // 200 means the provider confirmed delivery in-band; 202 means
            // it was queued downstream.
            StatusCode::OK => Ok(SendOutcome::Delivered),
            s if s.is_success() => Ok(SendOutcome::Sent),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GatewayError::Configuration(
                format!("gateway rejected credentials ({})", resp.status()),
            )),
            s => Err(GatewayError::Delivery(format!("gateway returned {}", s))),
        }
    }
}
