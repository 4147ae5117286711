use thiserror::Error;
use whatsignal_common::BridgeError;

/// Store-specific error taxonomy (§7: Storage). Transient failures are
/// retryable; constraint violations are not and a duplicate-key conflict
/// is folded into the success path by the caller.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("mapping already exists for session {session} / whatsapp id {whatsapp_msg_id}")]
    Conflict { session: String, whatsapp_msg_id: String },

    #[error("illegal delivery status transition: {from:?} -> {to:?}")]
    IllegalTransition { from: String, to: String },

    #[error("no mapping found for session {session} / id {id}")]
    NotFound { session: String, id: String },
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database(e) => !matches!(
                e,
                sqlx::Error::Database(db_err) if db_err.is_unique_violation() || db_err.is_check_violation()
            ),
            StoreError::Conflict { .. } => false,
            StoreError::IllegalTransition { .. } => false,
            StoreError::NotFound { .. } => false,
        }
    }
}

impl From<StoreError> for BridgeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { session, whatsapp_msg_id } => {
                BridgeError::StorageConflict(format!("{session}/{whatsapp_msg_id}"))
            }
            other => BridgeError::Storage(other.to_string()),
        }
    }
}
