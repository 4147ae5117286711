use thiserror::Error;

/// Error taxonomy shared by the bridge engine components (§4.G–§4.M).
/// Gateway and store crates define their own narrower error types and
/// fold into this one at the crate boundary via `#[from]`.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    /// Malformed input at a trust boundary. Maps to HTTP 400 at the
    /// webhook and is never retried.
    #[error("validation failed ({reason}): {message}")]
    Validation { reason: &'static str, message: String },

    /// Startup configuration is invalid; fatal, non-retryable.
    #[error("configuration error: {0}")]
    Config(String),

    /// The referenced session or destination is not in the configured
    /// channel set.
    #[error("unknown channel for {0}")]
    UnknownChannel(String),

    /// Network or upstream failure classified as transient; the caller
    /// should retry per §4.A.
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// Upstream rejected the request permanently (4xx other than auth).
    #[error("permanent upstream error: {0}")]
    PermanentUpstream(String),

    /// Durable store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A unique-key conflict on insert, treated as a success path
    /// (duplicate forward already recorded).
    #[error("storage conflict: {0}")]
    StorageConflict(String),

    /// Media exceeded configured size or type policy; converted to a
    /// textual fallback notice rather than propagated as a failure.
    #[error("media rejected by policy: {0}")]
    MediaPolicy(String),

    /// Operation was cancelled via the shared cancellation token.
    /// Propagated without error-level logging.
    #[error("operation cancelled")]
    Cancelled,
}

impl BridgeError {
    pub fn validation(reason: &'static str, message: impl Into<String>) -> Self {
        BridgeError::Validation { reason, message: message.into() }
    }

    /// Whether a generic retry loop driven by §4.A should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::TransientUpstream(_) | BridgeError::Storage(_))
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
