//! Query Service
//!
//! Read-only views over accounts and the transaction journal. Every read
//! is a single SQL statement, so it observes a store-level snapshot: a
//! transfer's debit is never visible without its credit and journal row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::domain::{AccountId, LedgerError, UserId};
use crate::journal::{JournalCursor, Transaction, TransactionLog};
use crate::ledger::{Account, AccountLedger};

/// Read-only queries over ledger state and transfer history.
#[derive(Debug, Clone)]
pub struct QueryService {
    ledger: AccountLedger,
    log: TransactionLog,
    pool: PgPool,
}

impl QueryService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: AccountLedger::new(pool.clone()),
            log: TransactionLog::new(pool.clone()),
            pool,
        }
    }

    /// All accounts owned by `user_id`, closed ones included.
    pub async fn list_accounts_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Account>, LedgerError> {
        let rows: Vec<(i64, i64, Decimal, bool, i64)> = sqlx::query_as(
            r#"
            SELECT id, number, balance, closed, user_id
            FROM accounts
            WHERE user_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(user_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Account::from_row).collect())
    }

    /// A single account row, closed or not. This is the audit read:
    /// closure hides an account from transfer logic, not from inspection.
    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, LedgerError> {
        let row: Option<(i64, i64, Decimal, bool, i64)> = sqlx::query_as(
            r#"
            SELECT id, number, balance, closed, user_id
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::from_row)
            .ok_or(LedgerError::AccountNotFound(account_id))
    }

    /// Usable balance of an open account. Delegates to the ledger, so
    /// closed accounts are refused the same way transfer logic refuses
    /// them.
    pub async fn get_balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        self.ledger.balance(account_id).await
    }

    /// Transfer history within `[start, end]` inclusive, oldest first.
    pub async fn list_transactions(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.log.query_by_date_range(start, end).await
    }

    /// One page of transfer history, resuming after `cursor` when given.
    pub async fn list_transactions_page(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cursor: Option<JournalCursor>,
        limit: i64,
    ) -> Result<Vec<Transaction>, LedgerError> {
        self.log.page_by_date_range(start, end, cursor, limit).await
    }
}
