use std::num::NonZeroU32;
use std::time::Duration;

use base64::Engine;
use governor::{clock::DefaultClock, state::{InMemoryState, NotKeyed}, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use whatsignal_common::{BridgeError, ContactProfile, StagedMedia, WhatsAppGateway};

use crate::config::WahaConfig;
use crate::errors::{WahaError, WahaResult};
use crate::validation::{validate_caption, validate_chat_id, validate_text_message};

/// HTTP client for a WAHA-style WhatsApp gateway. Message-type agnostic at
/// the transport level: each public method builds its own request body and
/// shares one retrying, rate-limited `send` path.
pub struct WahaClient {
    http_client: Client,
    config: WahaConfig,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

#[derive(Serialize)]
struct SendTextBody<'a> {
    session: &'a str,
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
}

#[derive(Serialize)]
struct MediaFile<'a> {
    mimetype: &'a str,
    filename: &'a str,
    data: String,
}

#[derive(Serialize)]
struct SendMediaBody<'a> {
    session: &'a str,
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    file: MediaFile<'a>,
}

#[derive(Serialize)]
struct ChatMsgBody<'a> {
    session: &'a str,
    #[serde(rename = "chatId")]
    chat_id: &'a str,
    #[serde(rename = "messageId")]
    message_id: &'a str,
}

#[derive(Serialize)]
struct ReactionBody<'a> {
    session: &'a str,
    #[serde(rename = "messageId")]
    message_id: &'a str,
    reaction: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Deserialize)]
struct SessionStatusResponse {
    status: String,
}

#[derive(Deserialize, Clone)]
struct WahaContact {
    id: String,
    name: Option<String>,
    #[serde(rename = "pushname")]
    push_name: Option<String>,
    #[serde(rename = "shortName")]
    short_name: Option<String>,
    #[serde(rename = "isMyContact", default)]
    is_my_contact: bool,
}

impl WahaClient {
    pub fn new(config: WahaConfig) -> WahaResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .user_agent("whatsignal-waha/0.1")
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.max_concurrent_requests)
            .build()
            .map_err(|e| WahaError::ConfigurationError(format!("failed to create HTTP client: {e}")))?;

        let per_minute = NonZeroU32::new(config.rate_limit_per_minute)
            .ok_or_else(|| WahaError::ConfigurationError("rate_limit_per_minute must be > 0".into()))?;
        let burst = NonZeroU32::new(config.rate_limit_burst)
            .ok_or_else(|| WahaError::ConfigurationError("rate_limit_burst must be > 0".into()))?;
        let quota = Quota::per_minute(per_minute).allow_burst(burst);
        let rate_limiter = RateLimiter::direct(quota);

        info!(base_url = %config.base_url, rate_limit = config.rate_limit_per_minute, "WAHA client initialized");

        Ok(Self { http_client, config, rate_limiter })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let mut req = self.http_client.request(method, url);
        if let Some(key) = &self.config.api_key {
            req = req.header("X-Api-Key", key);
        }
        req
    }

    /// Shared retrying/rate-limited send path for every WAHA call that must
    /// not be silently swallowed.
    async fn send_with_retry<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&T>,
    ) -> WahaResult<R> {
        let mut last_err = None;
        for attempt in 1..=self.config.max_retry_attempts {
            self.rate_limiter.until_ready().await;
            debug!(attempt, path, "WAHA request attempt");

            let mut req = self.request(method.clone(), path);
            if let Some(body) = body {
                req = req.json(body);
            }

            match self.send_once::<R>(req).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    warn!(attempt, %err, "WAHA request failed, will retry if attempts remain");
                    if attempt < self.config.max_retry_attempts {
                        let delay_ms = self.config.initial_retry_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
                        let delay_ms = delay_ms.min(self.config.max_retry_delay_ms);
                        sleep(Duration::from_millis(delay_ms)).await;
                    }
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or(WahaError::MaxRetriesExceeded {
            attempts: self.config.max_retry_attempts,
            operation: path.to_string(),
        }))
    }

    async fn send_once<R: for<'de> Deserialize<'de>>(&self, req: reqwest::RequestBuilder) -> WahaResult<R> {
        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(WahaError::SerializationError)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(WahaError::AuthenticationError(text))
        } else {
            Err(WahaError::ApiError { status: status.as_u16(), message: text })
        }
    }

    /// Like `send_with_retry` but swallows every failure, per §4.G's
    /// "optional endpoints' failures MUST NOT fail the send" rule.
    async fn send_best_effort<T: Serialize>(&self, method: reqwest::Method, path: &str, body: &T) {
        let req = self.request(method, path).json(body);
        if let Err(err) = self.send_once::<serde_json::Value>(req).await {
            debug!(path, %err, "best-effort WAHA call failed, ignoring");
        }
    }
}

#[async_trait::async_trait]
impl WhatsAppGateway for WahaClient {
    async fn send_text(
        &self,
        session: &str,
        chat_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String, BridgeError> {
        validate_chat_id(chat_id).map_err(BridgeError::from)?;
        validate_text_message(text).map_err(BridgeError::from)?;

        let body = SendTextBody { session, chat_id, text, reply_to };
        let response: SendResponse = self
            .send_with_retry(reqwest::Method::POST, "/api/sendText", Some(&body))
            .await
            .map_err(BridgeError::from)?;
        Ok(response.id)
    }

    async fn send_media(
        &self,
        session: &str,
        chat_id: &str,
        media: &StagedMedia,
        caption: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<String, BridgeError> {
        validate_chat_id(chat_id).map_err(BridgeError::from)?;
        if let Some(caption) = caption {
            validate_caption(caption).map_err(BridgeError::from)?;
        }

        let bytes = tokio::fs::read(&media.local_path)
            .await
            .map_err(|e| BridgeError::MediaPolicy(format!("failed to read staged media: {e}")))?;
        let data = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let endpoint = media_endpoint(&media.mime_type);
        let body = SendMediaBody {
            session,
            chat_id,
            caption,
            reply_to,
            file: MediaFile { mimetype: &media.mime_type, filename: &media.filename, data },
        };
        let response: SendResponse = self
            .send_with_retry(reqwest::Method::POST, endpoint, Some(&body))
            .await
            .map_err(BridgeError::from)?;
        Ok(response.id)
    }

    async fn send_seen(&self, session: &str, chat_id: &str, msg_id: &str) {
        let body = ChatMsgBody { session, chat_id, message_id: msg_id };
        self.send_best_effort(reqwest::Method::POST, "/api/sendSeen", &body).await;
    }

    async fn start_typing(&self, session: &str, chat_id: &str) {
        let body = ChatMsgBody { session, chat_id, message_id: "" };
        self.send_best_effort(reqwest::Method::POST, "/api/startTyping", &body).await;
    }

    async fn stop_typing(&self, session: &str, chat_id: &str) {
        let body = ChatMsgBody { session, chat_id, message_id: "" };
        self.send_best_effort(reqwest::Method::POST, "/api/stopTyping", &body).await;
    }

    async fn send_reaction(&self, session: &str, msg_id: &str, reaction: &str) -> Result<(), BridgeError> {
        let body = ReactionBody { session, message_id: msg_id, reaction };
        self.send_with_retry::<_, serde_json::Value>(reqwest::Method::PUT, "/api/reaction", Some(&body))
            .await
            .map_err(BridgeError::from)?;
        Ok(())
    }

    async fn delete_message(&self, session: &str, chat_id: &str, msg_id: &str) -> Result<(), BridgeError> {
        let path = format!("/api/{session}/chats/{chat_id}/messages/{msg_id}");
        self.send_with_retry::<(), serde_json::Value>(reqwest::Method::DELETE, &path, None)
            .await
            .map_err(BridgeError::from)?;
        Ok(())
    }

    async fn list_contacts(&self, session: &str) -> Result<Vec<ContactProfile>, BridgeError> {
        let path = format!("/api/{session}/contacts/all");
        let contacts: Vec<WahaContact> = self
            .send_with_retry::<(), _>(reqwest::Method::GET, &path, None)
            .await
            .map_err(BridgeError::from)?;
        Ok(contacts.into_iter().map(|c| to_profile(session, c, false)).collect())
    }

    async fn list_groups(&self, session: &str) -> Result<Vec<ContactProfile>, BridgeError> {
        let path = format!("/api/{session}/groups");
        let groups: Vec<WahaContact> = self
            .send_with_retry::<(), _>(reqwest::Method::GET, &path, None)
            .await
            .map_err(BridgeError::from)?;
        Ok(groups.into_iter().map(|c| to_profile(session, c, true)).collect())
    }

    async fn session_status(&self, session: &str) -> Result<String, BridgeError> {
        let path = format!("/api/sessions/{session}");
        let status: SessionStatusResponse = self
            .send_with_retry::<(), _>(reqwest::Method::GET, &path, None)
            .await
            .map_err(BridgeError::from)?;
        Ok(status.status)
    }

    async fn restart_session(&self, session: &str) -> Result<(), BridgeError> {
        let path = format!("/api/sessions/{session}/restart");
        self.send_with_retry::<(), serde_json::Value>(reqwest::Method::POST, &path, None)
            .await
            .map_err(BridgeError::from)?;
        Ok(())
    }
}

fn to_profile(session: &str, contact: WahaContact, is_group: bool) -> ContactProfile {
    let now = chrono::Utc::now();
    ContactProfile {
        session_name: session.to_string(),
        gateway_id: contact.id,
        name: contact.name,
        push_name: contact.push_name,
        short_name: contact.short_name,
        is_group,
        is_my_contact: contact.is_my_contact,
        cached_at: now,
        updated_at: now,
    }
}

fn media_endpoint(mime_type: &str) -> &'static str {
    if mime_type.starts_with("image/") {
        "/api/sendImage"
    } else if mime_type.starts_with("audio/") {
        "/api/sendVoice"
    } else if mime_type.starts_with("video/") {
        "/api/sendVideo"
    } else {
        "/api/sendFile"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_endpoint_routes_by_mime_prefix() {
        assert_eq!(media_endpoint("image/png"), "/api/sendImage");
        assert_eq!(media_endpoint("audio/ogg"), "/api/sendVoice");
        assert_eq!(media_endpoint("video/mp4"), "/api/sendVideo");
        assert_eq!(media_endpoint("application/pdf"), "/api/sendFile");
    }
}
