//! bank_ledger Library
//!
//! Re-exports modules for integration testing and external use.

pub mod api;
pub mod domain;
pub mod engine;
pub mod idempotency;
pub mod journal;
pub mod ledger;
pub mod query;

// Private modules (used only by the binary and the HTTP layer)
pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{
    AccountId, Amount, AmountError, LedgerError, OperationContext, TransactionId, UserId,
    EXTERNAL_ACCOUNT,
};
