use thiserror::Error;
use whatsignal_common::BridgeError;

/// Error taxonomy for the WAHA HTTP client.
#[derive(Error, Debug)]
pub enum WahaError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("WAHA returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("authentication failed: {0}")]
    AuthenticationError(String),

    #[error("failed to serialize request: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("invalid session name: {0}")]
    InvalidSession(String),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("operation timed out after {seconds} seconds")]
    TimeoutError { seconds: u64 },

    #[error("maximum retry attempts ({attempts}) exceeded for operation: {operation}")]
    MaxRetriesExceeded { attempts: u32, operation: String },
}

impl WahaError {
    /// Whether a retry loop should try this request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            WahaError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            WahaError::TimeoutError { .. } => true,
            WahaError::ApiError { status, .. } => *status == 429 || (*status >= 500 && *status < 600),
            WahaError::AuthenticationError(_)
            | WahaError::InvalidSession(_)
            | WahaError::ConfigurationError(_)
            | WahaError::SerializationError(_)
            | WahaError::MaxRetriesExceeded { .. } => false,
        }
    }
}

/// Folds the client's narrow taxonomy into the shared bridge taxonomy at
/// the crate boundary. Auth/validation failures are permanent; everything
/// `is_retryable` reports true for becomes a transient upstream error.
impl From<WahaError> for BridgeError {
    fn from(err: WahaError) -> Self {
        if err.is_retryable() {
            BridgeError::TransientUpstream(err.to_string())
        } else {
            BridgeError::PermanentUpstream(err.to_string())
        }
    }
}

pub type WahaResult<T> = Result<T, WahaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = WahaError::ApiError { status: 503, message: "busy".into() };
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        let err = WahaError::ApiError { status: 404, message: "not found".into() };
        assert!(!err.is_retryable());
    }

    #[test]
    fn auth_failures_fold_into_permanent_upstream() {
        let err = WahaError::AuthenticationError("bad key".into());
        assert!(matches!(BridgeError::from(err), BridgeError::PermanentUpstream(_)));
    }

    #[test]
    fn retryable_errors_fold_into_transient_upstream() {
        let err = WahaError::ApiError { status: 500, message: "oops".into() };
        assert!(matches!(BridgeError::from(err), BridgeError::TransientUpstream(_)));
    }
}
