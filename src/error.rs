use crate::domain::credential::Provider;
use crate::domain::payment_request::RequestStatus;
use crate::domain::{PaymentRequestId, UserId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PayoutError>;

/// Error taxonomy for the payout subsystem.
///
/// Only `Transient` is safe to retry; the idempotency guard in the engine
/// makes such retries free of duplicate-transfer risk.
#[derive(Error, Debug)]
pub enum PayoutError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("authorization error: {0}")]
    Authorization(String),

    #[error("cannot {action} a payment request in status '{from}'")]
    InvalidTransition {
        from: RequestStatus,
        action: &'static str,
    },

    #[error("payment request not found: {0}")]
    NotFound(PaymentRequestId),

    #[error("user {user_id} has no valid {provider} credential; authorization required")]
    NeedsAuthorization { user_id: UserId, provider: Provider },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("transfer rejected by provider [{code}]: {message}")]
    Rejected { code: String, message: String },

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("encryption error: {0}")]
    Encryption(String),
}

impl PayoutError {
    /// Whether the caller may safely re-invoke the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayoutError::Transient(_))
    }
}
