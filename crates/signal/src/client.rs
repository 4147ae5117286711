use std::time::Duration;

use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::debug;
use whatsignal_common::{BridgeError, SignalGateway, SignalInboundMessage, StagedMedia};

use crate::config::SignalConfig;
use crate::errors::{SignalError, SignalResult};

/// HTTP client for the Signal RPC gateway: send by destination number,
/// long-poll receive (§6, §4.I).
pub struct SignalClient {
    http_client: Client,
    config: SignalConfig,
}

#[derive(Serialize)]
struct SendBody<'a> {
    message: &'a str,
    number: &'a str,
    recipients: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    base64_attachments: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quote_timestamp: Option<i64>,
}

#[derive(Deserialize)]
struct SendResponse {
    timestamp: i64,
}

#[derive(Deserialize)]
struct QuotedMessage {
    timestamp: i64,
}

#[derive(Deserialize)]
struct ReceivedMessage {
    sender: String,
    message: String,
    timestamp: i64,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    attachments: Vec<String>,
    #[serde(rename = "quotedMessage", default)]
    quoted_message: Option<QuotedMessage>,
}

impl SignalClient {
    pub fn new(config: SignalConfig) -> SignalResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("whatsignal-signal/0.1")
            .build()
            .map_err(|e| SignalError::ConfigurationError(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { http_client, config })
    }

    /// Verifies the gateway is reachable. Used at startup; the caller
    /// decides whether a failure here is fatal (`strict_init`) or just a
    /// warning.
    pub async fn ping(&self) -> SignalResult<()> {
        let url = format!("{}/v1/about", self.config.base_url);
        let response = self.http_client.get(url).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SignalError::ApiError { status: response.status().as_u16(), message: "gateway unreachable".into() })
        }
    }

    async fn retrying_send(&self, body: &SendBody<'_>) -> SignalResult<i64> {
        let mut last_err = None;
        for attempt in 1..=self.config.max_retry_attempts {
            debug!(attempt, "Signal send attempt");
            let response = self.http_client.post(self.config.send_url()).json(body).send().await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await?;
                    if status.is_success() {
                        let parsed: SendResponse = serde_json::from_str(&text)?;
                        return Ok(parsed.timestamp);
                    }
                    let err = SignalError::ApiError { status: status.as_u16(), message: text };
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
                Err(e) => {
                    let err = SignalError::HttpError(e);
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    last_err = Some(err);
                }
            }
            if attempt < self.config.max_retry_attempts {
                let delay_ms = self.config.initial_retry_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                sleep(Duration::from_millis(delay_ms.min(self.config.max_retry_delay_ms))).await;
            }
        }
        Err(last_err.unwrap_or(SignalError::ApiError { status: 0, message: "retries exhausted".into() }))
    }
}

#[async_trait::async_trait]
impl SignalGateway for SignalClient {
    async fn send_text(
        &self,
        destination: &str,
        text: &str,
        reply_to_timestamp: Option<i64>,
    ) -> Result<i64, BridgeError> {
        let body = SendBody {
            message: text,
            number: &self.config.account_number,
            recipients: vec![destination],
            base64_attachments: vec![],
            quote_timestamp: reply_to_timestamp,
        };
        self.retrying_send(&body).await.map_err(BridgeError::from)
    }

    async fn send_attachment(
        &self,
        destination: &str,
        media: &StagedMedia,
        caption: Option<&str>,
        reply_to_timestamp: Option<i64>,
    ) -> Result<i64, BridgeError> {
        let bytes = tokio::fs::read(&media.local_path)
            .await
            .map_err(|e| BridgeError::MediaPolicy(format!("failed to read staged media: {e}")))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let attachment = format!("data:{};filename={};base64,{}", media.mime_type, media.filename, encoded);

        let body = SendBody {
            message: caption.unwrap_or(""),
            number: &self.config.account_number,
            recipients: vec![destination],
            base64_attachments: vec![attachment],
            quote_timestamp: reply_to_timestamp,
        };
        self.retrying_send(&body).await.map_err(BridgeError::from)
    }

    async fn receive(&self, timeout_secs: u64) -> Result<Vec<SignalInboundMessage>, BridgeError> {
        let url = format!("{}?timeout={}", self.config.receive_url(), timeout_secs);
        let response = self
            .http_client
            .get(url)
            .timeout(Duration::from_secs(timeout_secs + self.config.request_timeout_seconds))
            .send()
            .await
            .map_err(|e| BridgeError::from(SignalError::HttpError(e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| BridgeError::from(SignalError::HttpError(e)))?;
        if !status.is_success() {
            let err = SignalError::ApiError { status: status.as_u16(), message: text };
            return Err(BridgeError::from(err));
        }

        let messages: Vec<ReceivedMessage> = serde_json::from_str(&text)
            .map_err(|e| BridgeError::from(SignalError::SerializationError(e)))?;

        if !messages.is_empty() {
            debug!(count = messages.len(), "received Signal messages");
        }

        Ok(messages
            .into_iter()
            .map(|m| SignalInboundMessage {
                sender: m.sender,
                message: m.message,
                timestamp: m.timestamp,
                attachments: m
                    .attachments
                    .into_iter()
                    .map(|id| format!("{}/v1/attachments/{id}", self.config.base_url))
                    .collect(),
                quoted_timestamp: m.quoted_message.map(|q| q.timestamp),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn received_message_parses_spec_shape() {
        let json = r#"[{"messageId":"1","sender":"+15550200","message":"world","timestamp":1700000000,"type":"text","attachments":[],"quotedMessage":{"timestamp":1699999999}}]"#;
        let parsed: Vec<ReceivedMessage> = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].sender, "+15550200");
        assert_eq!(parsed[0].quoted_message.as_ref().unwrap().timestamp, 1699999999);
    }

    #[test]
    fn received_message_tolerates_missing_optional_fields() {
        let json = r#"[{"sender":"+15550200","message":"hi","timestamp":1}]"#;
        let parsed: Vec<ReceivedMessage> = serde_json::from_str(json).unwrap();
        assert!(parsed[0].quoted_message.is_none());
        assert!(parsed[0].attachments.is_empty());
    }
}
