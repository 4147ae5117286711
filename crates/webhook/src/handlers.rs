use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use whatsignal_bridge::{IncomingWhatsAppAck, IncomingWhatsAppDelete, IncomingWhatsAppEdit, IncomingWhatsAppMessage, IncomingWhatsAppReaction};
use whatsignal_common::SessionState;

use crate::error::WebhookError;
use crate::security;
use crate::state::AppState;
use crate::types::WebhookEvent;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `POST /webhook/whatsapp` (§4.J, §4.H). Verifies the signature, parses
/// the envelope, and dispatches by `event`.
pub async fn handle_webhook(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Result<impl IntoResponse, WebhookError> {
    if let Some(secret) = state.config.webhook_secret.as_deref() {
        let hmac_header = header_str(&headers, "x-webhook-hmac");
        let timestamp_header = header_str(&headers, "x-webhook-timestamp");
        security::verify_gateway_signature(&body, secret, hmac_header, timestamp_header, state.config.hmac_skew_sec)?;
    }

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(|_| WebhookError::MalformedBody)?;
    dispatch(&state, event).await?;
    Ok(axum::http::StatusCode::OK)
}

async fn dispatch(state: &AppState, event: WebhookEvent) -> Result<(), WebhookError> {
    let session = event.session;
    let payload = event.payload;

    match event.event.as_str() {
        "message" => {
            let msg = IncomingWhatsAppMessage {
                session,
                chat_id: payload.from.ok_or(WebhookError::MalformedBody)?,
                msg_id: payload.id.ok_or(WebhookError::MalformedBody)?,
                sender: String::new(),
                body: payload.body,
                media: payload.media.map(|m| whatsignal_bridge::SourceMedia { url: m.url, mime_type: m.mime_type, filename: m.filename }),
                reply_to: payload.reply_to,
                from_me: payload.from_me,
            };
            state.messages.handle_whatsapp_message(msg).await.map_err(WebhookError::from)
        }
        "reaction" => {
            let reaction = payload.reaction.ok_or(WebhookError::MalformedBody)?;
            let msg_id = reaction.message_id.ok_or(WebhookError::MalformedBody)?;
            state
                .messages
                .handle_whatsapp_reaction(IncomingWhatsAppReaction { session, msg_id, reactor: payload.from.unwrap_or_default(), text: reaction.text })
                .await
                .map_err(WebhookError::from)
        }
        "edited" => {
            let msg_id = payload.edited_message_id.or(payload.id).ok_or(WebhookError::MalformedBody)?;
            state
                .messages
                .handle_whatsapp_edit(IncomingWhatsAppEdit { session, msg_id, new_body: payload.body })
                .await
                .map_err(WebhookError::from)
        }
        "ack" => {
            let msg_id = payload.id.ok_or(WebhookError::MalformedBody)?;
            let ack = payload.ack.ok_or(WebhookError::MalformedBody)?;
            state.messages.handle_whatsapp_ack(IncomingWhatsAppAck { session, msg_id, ack }).await.map_err(WebhookError::from)
        }
        "revoke" => {
            let msg_id = payload.id.ok_or(WebhookError::MalformedBody)?;
            state.messages.handle_whatsapp_delete(IncomingWhatsAppDelete { session, msg_id }).await.map_err(WebhookError::from)
        }
        "waiting" => {
            tracing::debug!(session = %session, "gateway reported waiting state, ignored");
            Ok(())
        }
        other => {
            tracing::debug!(event = %other, session = %session, "ignored unrecognized webhook event");
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    name: String,
    version: String,
    build_time: String,
    commit: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthBody {
        status: "ok",
        name: state.info.name.clone(),
        version: state.info.version.clone(),
        build_time: state.info.build_time.clone(),
        commit: state.info.commit.clone(),
    })
}

#[derive(Serialize)]
struct SessionStatusEntry {
    session: String,
    state: &'static str,
    healthy: bool,
}

/// `GET /session/status` (§6). Returns one entry per configured session;
/// a gateway failure on any one session is reported inline, not as a 503,
/// since one session being down shouldn't hide the others' status.
pub async fn session_status(State(state): State<AppState>) -> impl IntoResponse {
    let mut entries = Vec::new();
    for session in state.channels.sessions() {
        let observed = match state.whatsapp.session_status(session).await {
            Ok(raw) => SessionState::from_gateway_status(&raw),
            Err(e) => {
                tracing::warn!(session = %session, error = %e, "session status check failed");
                SessionState::Unknown
            }
        };
        entries.push(SessionStatusEntry { session: session.to_string(), state: state_label(observed), healthy: observed.is_healthy() });
    }
    Json(entries)
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Unknown => "unknown",
        SessionState::Starting => "starting",
        SessionState::Working => "working",
        SessionState::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_label_covers_every_variant() {
        assert_eq!(state_label(SessionState::Unknown), "unknown");
        assert_eq!(state_label(SessionState::Starting), "starting");
        assert_eq!(state_label(SessionState::Working), "working");
        assert_eq!(state_label(SessionState::Failed), "failed");
    }
}
