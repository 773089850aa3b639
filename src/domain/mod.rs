//! Domain primitives
//!
//! Validated value types, identifiers and the ledger error taxonomy.

pub mod amount;
pub mod context;
pub mod error;
pub mod ids;

pub use amount::{Amount, AmountError};
pub use context::OperationContext;
pub use error::LedgerError;
pub use ids::{AccountId, TransactionId, UserId, EXTERNAL_ACCOUNT};
