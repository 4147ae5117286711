use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use whatsignal_common::BridgeError;

/// HTTP-layer error shape (§4.J item 4). Signature/body failures never
/// reach `BridgeError` since they happen before a domain operation starts.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing signature headers")]
    MissingSignature,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("timestamp outside allowed skew")]
    TimestampSkew,
    #[error("malformed request body")]
    MalformedBody,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("unsupported content type")]
    UnsupportedContentType,
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    reason: Option<&'static str>,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, reason) = match &self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature | WebhookError::TimestampSkew => {
                (StatusCode::UNAUTHORIZED, None)
            }
            WebhookError::MalformedBody | WebhookError::UnsupportedContentType => (StatusCode::BAD_REQUEST, None),
            WebhookError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, None),
            WebhookError::Bridge(BridgeError::Validation { reason, .. }) => (StatusCode::BAD_REQUEST, Some(*reason)),
            WebhookError::Bridge(BridgeError::UnknownChannel(_)) => (StatusCode::BAD_REQUEST, None),
            WebhookError::Bridge(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        };
        let body = ErrorBody { error: self.to_string(), reason };
        (status, axum::Json(body)).into_response()
    }
}
