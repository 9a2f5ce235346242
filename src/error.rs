use crate::ledger::{StoreError, TransferError};
use thiserror::Error;

/// Specialisation of `std::Result`.
pub type Result<T, E = PaymentError> = std::result::Result<T, E>;
pub type Error = PaymentError;

#[derive(Error, Debug)]
/// error variants.
pub enum PaymentError {
    #[error("client is not authorized to call {0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    MissingInput(&'static str),

    #[error("failed to decode {what}: {reason}")]
    Encoding { what: &'static str, reason: String },

    #[error("issuer key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("token not paid. please call DebitMyAccount first")]
    NotPaid,

    #[error("debit operation can be only done once for one blinded token")]
    AlreadyDebited,

    #[error("credit operation can be only done once for one blinded token")]
    AlreadyCredited,

    #[error("signature verification failed")]
    InvalidSignature,

    #[error("underlying transfer failed: {0}")]
    Transfer(#[from] TransferError),

    #[error("settlement account is not configured. please call SetBankAccount first")]
    AccountNotConfigured,

    #[error("failed to blind the message: {0}")]
    BlindingFailed(String),

    #[error("an error occured when signing: {0}")]
    Signing(String),

    #[error("ledger store error: {0}")]
    Store(#[from] StoreError),

    #[error("rsa error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("invalid issuer configuration: {0}")]
    Config(String),
}

impl PaymentError {
    pub(crate) fn encoding(what: &'static str, reason: impl ToString) -> Self {
        Self::Encoding {
            what,
            reason: reason.to_string(),
        }
    }

    /// True for failures that mean the token or blinded message is permanently spent.
    pub fn is_spent(&self) -> bool {
        matches!(self, Self::AlreadyDebited | Self::AlreadyCredited)
    }

    /// True for failures the caller can fix by resubmitting corrected input.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Encoding { .. } | Self::MissingInput(_))
    }
}
