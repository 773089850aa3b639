//! Identifier newtypes
//!
//! Account, transaction and user identifiers are opaque integers assigned
//! by the store (BIGSERIAL). The newtypes keep them from being mixed up at
//! call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a ledger account.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AccountId(pub i64);

/// Identifier of a committed transfer record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TransactionId(pub i64);

/// Identifier of an account owner, supplied by the external identity
/// provider. Stored for audit only, never validated locally.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Sentinel source account for cash deposits.
///
/// Seeded by the initial migration with `closed = TRUE`, so it can never be
/// the source or destination of a regular transfer. Deposits reference it
/// in the journal without touching its balance.
pub const EXTERNAL_ACCOUNT: AccountId = AccountId(1);

impl AccountId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl TransactionId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl UserId {
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<i64> for TransactionId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_ordering() {
        assert!(AccountId(2) < AccountId(10));
        assert_eq!(AccountId(5), AccountId(5));
    }

    #[test]
    fn test_external_account_is_first_row() {
        assert_eq!(EXTERNAL_ACCOUNT.as_i64(), 1);
    }

    #[test]
    fn test_ids_serialize_transparently() {
        let id = TransactionId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: TransactionId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }
}
