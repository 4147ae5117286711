use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::net::SocketAddr;

use crate::error::WebhookError;
use crate::state::AppState;

/// Rate-limits `POST /webhook/whatsapp` per source address (§4.J ambient
/// addition). Health and status endpoints are never wrapped in this layer.
pub async fn rate_limit(State(state): State<AppState>, ConnectInfo(addr): ConnectInfo<SocketAddr>, request: Request, next: Next) -> Result<Response, WebhookError> {
    if !state.rate_limiter.allow(&addr.ip().to_string()).await {
        return Err(WebhookError::RateLimited);
    }
    Ok(next.run(request).await)
}

/// Rejects any webhook body not declared as JSON (§4.J). The gateway
/// always sends `application/json`; anything else is either a
/// misconfigured producer or a probe.
pub async fn require_json_content_type(request: Request, next: Next) -> Result<Response, WebhookError> {
    let content_type = request.headers().get(axum::http::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).unwrap_or("");
    if !content_type.starts_with("application/json") {
        return Err(WebhookError::UnsupportedContentType);
    }
    Ok(next.run(request).await)
}
