//! Account Ledger
//!
//! Owns account rows and every balance mutation. All writes go through the
//! guarded primitives here; no other component touches the `accounts`
//! table directly. Balance checks and mutations happen as one
//! compare-and-mutate statement under a row lock, so there is no
//! check-then-act window.

use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres};

use crate::domain::error::is_unique_violation;
use crate::domain::{AccountId, Amount, LedgerError, OperationContext, UserId};

mod number;

/// How many fresh display numbers to try before giving up on a collision
/// streak.
const MAX_NUMBER_ATTEMPTS: u32 = 5;

/// An account row as stored.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Account {
    pub id: AccountId,
    /// Customer-facing display number, unique
    pub number: i64,
    pub balance: Decimal,
    pub closed: bool,
    /// Owner reference from the external identity provider, audit only
    pub user_id: UserId,
}

impl Account {
    pub(crate) fn from_row(row: (i64, i64, Decimal, bool, i64)) -> Self {
        let (id, number, balance, closed, user_id) = row;
        Self {
            id: AccountId(id),
            number,
            balance,
            closed,
            user_id: UserId(user_id),
        }
    }
}

/// An account row held under `FOR UPDATE` inside a store transaction.
#[derive(Debug, Clone)]
pub(crate) struct LockedAccount {
    pub id: AccountId,
    pub balance: Decimal,
    pub closed: bool,
}

/// The authoritative record of account balances.
#[derive(Debug, Clone)]
pub struct AccountLedger {
    pool: PgPool,
}

impl AccountLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a new account for `user_id` with balance 0.00.
    ///
    /// The display number is random; on a unique-constraint collision a
    /// fresh number is drawn, up to a bounded number of attempts.
    pub async fn open(
        &self,
        user_id: UserId,
        ctx: &OperationContext,
    ) -> Result<Account, LedgerError> {
        ctx.run_with_deadline(self.open_inner(user_id)).await
    }

    async fn open_inner(&self, user_id: UserId) -> Result<Account, LedgerError> {
        for attempt in 0..MAX_NUMBER_ATTEMPTS {
            let candidate = number::generate();

            let inserted = sqlx::query_as::<_, (i64, i64, Decimal, bool, i64)>(
                r#"
                INSERT INTO accounts (number, user_id)
                VALUES ($1, $2)
                RETURNING id, number, balance, closed, user_id
                "#,
            )
            .bind(candidate)
            .bind(user_id.as_i64())
            .fetch_one(&self.pool)
            .await;

            match inserted {
                Ok(row) => {
                    let account = Account::from_row(row);
                    tracing::info!(
                        account_id = %account.id,
                        user_id = %user_id,
                        "Account opened"
                    );
                    return Ok(account);
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        "Account number collision, regenerating"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Exhausting random draws on a 32-bit space is contention, not a
        // business rejection; the caller may retry.
        Err(LedgerError::StoreConflict)
    }

    /// Current balance of an open account.
    ///
    /// Closed accounts report no usable balance here; audit reads go
    /// through `QueryService::get_account` instead.
    pub async fn balance(&self, account_id: AccountId) -> Result<Decimal, LedgerError> {
        let row: Option<(Decimal, bool)> = sqlx::query_as(
            r#"
            SELECT balance, closed FROM accounts WHERE id = $1
            "#,
        )
        .bind(account_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Err(LedgerError::AccountNotFound(account_id)),
            Some((_, true)) => Err(LedgerError::AccountClosed(account_id)),
            Some((balance, false)) => Ok(balance),
        }
    }

    /// Increase an account's balance by `amount`, atomically.
    pub async fn credit(
        &self,
        account_id: AccountId,
        amount: &Amount,
        ctx: &OperationContext,
    ) -> Result<(), LedgerError> {
        ctx.run_with_deadline(async {
            let mut tx = self.pool.begin().await?;
            let account = Self::lock(&mut tx, account_id).await?;
            Self::apply_credit(&mut tx, &account, amount).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    /// Decrease an account's balance by `amount`, atomically.
    ///
    /// Fails with `InsufficientFunds` before any mutation when the balance
    /// cannot cover the debit; no partial application.
    pub async fn debit(
        &self,
        account_id: AccountId,
        amount: &Amount,
        ctx: &OperationContext,
    ) -> Result<(), LedgerError> {
        ctx.run_with_deadline(async {
            let mut tx = self.pool.begin().await?;
            let account = Self::lock(&mut tx, account_id).await?;
            Self::apply_debit(&mut tx, &account, amount).await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    /// Close an account. Idempotent: closing a closed account is a no-op.
    ///
    /// The row lock serializes closure against in-flight transfers, so a
    /// racing transfer either commits before the closure is observable or
    /// is rejected with `AccountClosed`.
    pub async fn close(
        &self,
        account_id: AccountId,
        ctx: &OperationContext,
    ) -> Result<(), LedgerError> {
        ctx.run_with_deadline(async {
            let mut tx = self.pool.begin().await?;
            let account = Self::lock(&mut tx, account_id).await?;

            if !account.closed {
                sqlx::query("UPDATE accounts SET closed = TRUE WHERE id = $1")
                    .bind(account_id.as_i64())
                    .execute(&mut *tx)
                    .await?;
                tracing::info!(account_id = %account_id, "Account closed");
            }

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    // =========================================================================
    // In-transaction primitives, used by TransferEngine
    // =========================================================================

    /// Lock an account row with `FOR UPDATE` inside `db`.
    ///
    /// Callers locking more than one account must acquire locks in
    /// ascending `AccountId` order to stay deadlock-free.
    pub(crate) async fn lock(
        db: &mut sqlx::Transaction<'_, Postgres>,
        account_id: AccountId,
    ) -> Result<LockedAccount, LedgerError> {
        let row: Option<(Decimal, bool)> = sqlx::query_as(
            r#"
            SELECT balance, closed FROM accounts WHERE id = $1 FOR UPDATE
            "#,
        )
        .bind(account_id.as_i64())
        .fetch_optional(&mut **db)
        .await?;

        let (balance, closed) = row.ok_or(LedgerError::AccountNotFound(account_id))?;

        Ok(LockedAccount {
            id: account_id,
            balance,
            closed,
        })
    }

    /// Debit a locked account inside `db`. The UPDATE re-states the
    /// invariant guards so the store never holds a negative balance even
    /// if a caller skipped validation.
    pub(crate) async fn apply_debit(
        db: &mut sqlx::Transaction<'_, Postgres>,
        account: &LockedAccount,
        amount: &Amount,
    ) -> Result<(), LedgerError> {
        if account.closed {
            return Err(LedgerError::AccountClosed(account.id));
        }
        if account.balance < amount.value() {
            return Err(LedgerError::insufficient_funds(
                account.id,
                amount.value(),
                account.balance,
            ));
        }

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance - $2
            WHERE id = $1 AND closed = FALSE AND balance >= $2
            "#,
        )
        .bind(account.id.as_i64())
        .bind(amount.value())
        .execute(&mut **db)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(LedgerError::StoreUnavailable(
                "balance guard rejected a locked debit".to_string(),
            ));
        }

        Ok(())
    }

    /// Credit a locked account inside `db`.
    pub(crate) async fn apply_credit(
        db: &mut sqlx::Transaction<'_, Postgres>,
        account: &LockedAccount,
        amount: &Amount,
    ) -> Result<(), LedgerError> {
        if account.closed {
            return Err(LedgerError::AccountClosed(account.id));
        }

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE id = $1 AND closed = FALSE
            "#,
        )
        .bind(account.id.as_i64())
        .bind(amount.value())
        .execute(&mut **db)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(LedgerError::StoreUnavailable(
                "credit lost its locked row".to_string(),
            ));
        }

        Ok(())
    }
}
