//! Domain Error Types
//!
//! Pure ledger errors that don't depend on the web layer. Every failed
//! operation reports one of these kinds; nothing is collapsed into a
//! generic failure.

use rust_decimal::Decimal;
use thiserror::Error;

use super::ids::AccountId;

/// Errors produced by ledger operations.
///
/// The deterministic kinds (`AccountNotFound` through `SameAccount`) are
/// business-rule rejections and must never be retried as-is. `Timeout` and
/// `StoreConflict` are transient: the whole operation is safe to retry
/// because it either committed fully or not at all.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LedgerError {
    /// No account exists with this identifier
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Account is closed and accepts no further debit or credit
    #[error("Account is closed: {0}")]
    AccountClosed(AccountId),

    /// Balance too low for the requested debit
    #[error("Insufficient funds on account {account}: requested {requested}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        requested: Decimal,
        available: Decimal,
    },

    /// Amount failed validation (non-positive, malformed, out of range)
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Source and destination of a transfer are the same account
    #[error("Cannot transfer to the same account")]
    SameAccount,

    /// Caller-supplied deadline expired before the operation committed
    #[error("Operation deadline expired before commit")]
    Timeout,

    /// Transient contention in the store (serialization failure, deadlock
    /// abort); the caller may retry the whole operation with backoff
    #[error("Transient store conflict")]
    StoreConflict,

    /// The store rejected or dropped the operation for a non-transient
    /// reason; fatal for this call, not for the process
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    /// Create an insufficient funds error
    pub fn insufficient_funds(
        account: AccountId,
        requested: Decimal,
        available: Decimal,
    ) -> Self {
        Self::InsufficientFunds {
            account,
            requested,
            available,
        }
    }

    /// Check if this is a deterministic rejection (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_)
                | Self::AccountClosed(_)
                | Self::InsufficientFunds { .. }
                | Self::InvalidAmount(_)
                | Self::SameAccount
        )
    }

    /// Check if the whole operation is safe to retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::StoreConflict)
    }
}

/// SQLSTATE codes the store raises on transient contention.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if matches!(
                db_err.code().as_deref(),
                Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED)
            ) {
                return LedgerError::StoreConflict;
            }
        }
        LedgerError::StoreUnavailable(err.to_string())
    }
}

impl From<super::amount::AmountError> for LedgerError {
    fn from(err: super::amount::AmountError) -> Self {
        LedgerError::InvalidAmount(err.to_string())
    }
}

/// Check whether a store error is a unique constraint violation. Used where
/// a collision has a dedicated recovery path (account number regeneration,
/// idempotency key races).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}
