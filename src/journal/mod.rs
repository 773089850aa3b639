//! Transaction Journal
//!
//! Append-only record of committed transfers. Rows are created only by
//! `TransferEngine` inside its atomic unit of work and are never updated
//! or deleted afterwards. The store assigns both the identifier and the
//! creation timestamp at insert time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};

use crate::domain::{AccountId, Amount, LedgerError, TransactionId};

/// A committed transfer record.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: Decimal,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn from_row(row: (i64, Decimal, i64, i64, DateTime<Utc>)) -> Self {
        let (id, amount, from_account, to_account, created_at) = row;
        Self {
            id: TransactionId(id),
            amount,
            from_account: AccountId(from_account),
            to_account: AccountId(to_account),
            created_at,
        }
    }
}

/// A transfer about to be journaled.
#[derive(Debug)]
pub(crate) struct NewTransfer<'a> {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: &'a Amount,
}

/// Continuation point for paged history reads: the `(created_at, id)` of
/// the last row already consumed.
#[derive(Debug, Clone, Copy)]
pub struct JournalCursor {
    pub created_at: DateTime<Utc>,
    pub id: TransactionId,
}

/// Append-only journal of transfers.
#[derive(Debug, Clone)]
pub struct TransactionLog {
    pool: PgPool,
}

impl TransactionLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a record inside the caller's store transaction.
    ///
    /// Crate-internal: only `TransferEngine` journals transfers, and only
    /// as part of the same commit that moves the money.
    pub(crate) async fn append(
        db: &mut sqlx::Transaction<'_, Postgres>,
        transfer: &NewTransfer<'_>,
    ) -> Result<(TransactionId, DateTime<Utc>), LedgerError> {
        let (id, created_at): (i64, DateTime<Utc>) = sqlx::query_as(
            r#"
            INSERT INTO transactions (amount, from_account, to_account)
            VALUES ($1, $2, $3)
            RETURNING id, created_at
            "#,
        )
        .bind(transfer.amount.value())
        .bind(transfer.from.as_i64())
        .bind(transfer.to.as_i64())
        .fetch_one(&mut **db)
        .await?;

        Ok((TransactionId(id), created_at))
    }

    /// All transfers with `created_at` in `[start, end]` inclusive,
    /// ordered by creation time ascending, ties broken by id ascending.
    pub async fn query_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let rows: Vec<(i64, Decimal, i64, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, amount, from_account, to_account, created_at
            FROM transactions
            WHERE created_at BETWEEN $1 AND $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Transaction::from_row).collect())
    }

    /// One page of the same range scan, resuming after `cursor` when
    /// given. Repeated calls with the last row's cursor walk the whole
    /// range lazily and restartably.
    pub async fn page_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        cursor: Option<JournalCursor>,
        limit: i64,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let (after_created_at, after_id) = match cursor {
            Some(cursor) => (Some(cursor.created_at), Some(cursor.id.as_i64())),
            None => (None, None),
        };

        let rows: Vec<(i64, Decimal, i64, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, amount, from_account, to_account, created_at
            FROM transactions
            WHERE created_at BETWEEN $1 AND $2
              AND ($3::timestamptz IS NULL OR (created_at, id) > ($3, $4))
            ORDER BY created_at ASC, id ASC
            LIMIT $5
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(after_created_at)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Transaction::from_row).collect())
    }
}
