use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Currency, ListingStatus, Network, TokenAddress};

pub type Result<T> = std::result::Result<T, EscrowError>;

#[derive(Error, Debug)]
pub enum EscrowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: ListingStatus,
        to: ListingStatus,
    },

    #[error("Listing not found: {0}")]
    ListingNotFound(Uuid),

    #[error("Listing {id} is not active (status: {status})")]
    ListingNotActive { id: Uuid, status: ListingStatus },

    #[error("Active listing already exists for token {token} on {network}")]
    DuplicateActiveListing {
        token: TokenAddress,
        network: Network,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Anchor does not custody token {token} (balance: {balance})")]
    InsufficientCustody { token: TokenAddress, balance: i64 },

    #[error("Insufficient funds: required {required}, available {available} {currency}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
        currency: Currency,
    },

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Submission rejected by ledger: {0}")]
    SubmissionRejected(String),

    #[error("Listing store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Conflicting state for listing {id}: expected {expected}, found {actual}")]
    ConflictingState {
        id: Uuid,
        expected: ListingStatus,
        actual: ListingStatus,
    },

    #[error("No listing record attributes custody of token {token} on {network}")]
    UnattributedCustody {
        token: TokenAddress,
        network: Network,
    },

    #[error(
        "Pending settlement fault for listing {listing_id} at step {step}: {detail} \
         (payment {payment_reference})"
    )]
    SettlementFault {
        listing_id: Uuid,
        step: &'static str,
        payment_reference: String,
        detail: String,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EscrowError {
    /// Whether the caller may retry with the same idempotency key.
    ///
    /// Precondition errors are retryable only after the caller corrects the
    /// precondition; they are not listed here. Settlement faults are never
    /// retryable: the actual outcome must be re-verified via reconciliation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EscrowError::LedgerUnavailable(_)
                | EscrowError::StoreUnavailable(_)
                | EscrowError::PaymentFailed(_)
        )
    }
}
