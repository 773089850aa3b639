//! Idempotency keys
//!
//! Callers needing exactly-once transfer semantics supply a UUID key. The
//! key is recorded in the same store transaction as the transfer itself,
//! so a replay observes either nothing (and re-runs safely) or the
//! committed transfer (and returns it without re-applying effects).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Postgres;
use uuid::Uuid;

use crate::domain::error::is_unique_violation;
use crate::domain::{LedgerError, TransactionId};
use crate::journal::Transaction;

/// Repository for transfer idempotency keys.
#[derive(Debug, Clone)]
pub struct IdempotencyRepository;

impl IdempotencyRepository {
    /// Look up the transfer a key was already committed with, if any.
    pub(crate) async fn find(
        db: &mut sqlx::Transaction<'_, Postgres>,
        key: Uuid,
    ) -> Result<Option<Transaction>, LedgerError> {
        let row: Option<(i64, Decimal, i64, i64, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT t.id, t.amount, t.from_account, t.to_account, t.created_at
            FROM idempotency_keys k
            JOIN transactions t ON t.id = k.transaction_id
            WHERE k.key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&mut **db)
        .await?;

        Ok(row.map(Transaction::from_row))
    }

    /// Record a key against the transfer being committed in `db`.
    ///
    /// Two in-flight calls with the same key both pass `find` before
    /// either commits; the unique constraint makes the loser surface
    /// `StoreConflict`, and its retry replays the winner's result.
    pub(crate) async fn record(
        db: &mut sqlx::Transaction<'_, Postgres>,
        key: Uuid,
        transaction_id: TransactionId,
    ) -> Result<(), LedgerError> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO idempotency_keys (key, transaction_id)
            VALUES ($1, $2)
            "#,
        )
        .bind(key)
        .bind(transaction_id.as_i64())
        .execute(&mut **db)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(LedgerError::StoreConflict),
            Err(e) => Err(e.into()),
        }
    }
}
