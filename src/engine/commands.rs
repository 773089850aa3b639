//! Command definitions
//!
//! Commands represent validated intentions to move money. Amounts travel
//! as strings so decimal precision survives the transport layer; the
//! engine parses them into `Amount` before anything else.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{AccountId, TransactionId};

/// Command to move money between two real accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account: AccountId,
    pub to_account: AccountId,
    /// Amount to transfer (as string for precise decimal)
    pub amount: String,
}

impl TransferCommand {
    pub fn new(from_account: AccountId, to_account: AccountId, amount: String) -> Self {
        Self {
            from_account,
            to_account,
            amount,
        }
    }
}

/// Command to inject cash from outside the modeled account set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCashCommand {
    pub to_account: AccountId,
    /// Amount to deposit (as string for precise decimal)
    pub amount: String,
}

impl DepositCashCommand {
    pub fn new(to_account: AccountId, amount: String) -> Self {
        Self { to_account, amount }
    }
}

/// Result of a committed transfer or deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transaction_id: TransactionId,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}
