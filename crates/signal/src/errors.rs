use thiserror::Error;
use whatsignal_common::BridgeError;

/// Error taxonomy for the Signal RPC gateway client.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Signal gateway returned {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("failed to (de)serialize payload: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("operation timed out after {seconds} seconds")]
    TimeoutError { seconds: u64 },
}

impl SignalError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SignalError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SignalError::TimeoutError { .. } => true,
            SignalError::ApiError { status, .. } => *status == 429 || (*status >= 500 && *status < 600),
            SignalError::SerializationError(_) | SignalError::ConfigurationError(_) => false,
        }
    }
}

impl From<SignalError> for BridgeError {
    fn from(err: SignalError) -> Self {
        if err.is_retryable() {
            BridgeError::TransientUpstream(err.to_string())
        } else {
            BridgeError::PermanentUpstream(err.to_string())
        }
    }
}

pub type SignalResult<T> = Result<T, SignalError>;
