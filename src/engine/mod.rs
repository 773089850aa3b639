//! Transfer Engine
//!
//! Orchestrates a transfer as one atomic unit of work: validate, lock both
//! account rows, debit the source, credit the destination, append the
//! journal record. All of it commits together on one store transaction or
//! none of it does.

use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    AccountId, Amount, LedgerError, OperationContext, EXTERNAL_ACCOUNT,
};
use crate::idempotency::IdempotencyRepository;
use crate::journal::{NewTransfer, Transaction, TransactionLog};
use crate::ledger::AccountLedger;

mod commands;

pub use commands::{DepositCashCommand, TransferCommand, TransferReceipt};

/// Engine executing transfers and cash deposits against the ledger.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    pool: PgPool,
}

/// Row locks are always taken in ascending account-id order, so two
/// concurrent transfers over the same pair can never hold one lock each
/// and wait on the other.
fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

fn receipt_from(transaction: Transaction) -> TransferReceipt {
    TransferReceipt {
        transaction_id: transaction.id,
        from_account: transaction.from_account,
        to_account: transaction.to_account,
        amount: transaction.amount,
        created_at: transaction.created_at,
    }
}

impl TransferEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Move `amount` from one account to another.
    ///
    /// Self-transfers are rejected; cash injection is a separate,
    /// deliberately money-creating operation (`deposit_cash`). With an
    /// idempotency key, a replayed call returns the originally committed
    /// transfer instead of applying a second one.
    pub async fn transfer(
        &self,
        command: TransferCommand,
        idempotency_key: Option<Uuid>,
        ctx: &OperationContext,
    ) -> Result<TransferReceipt, LedgerError> {
        let amount: Amount = command.amount.parse()?;

        if command.from_account == command.to_account {
            return Err(LedgerError::SameAccount);
        }

        ctx.run_with_deadline(self.transfer_inner(
            command.from_account,
            command.to_account,
            amount,
            idempotency_key,
        ))
        .await
    }

    async fn transfer_inner(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        idempotency_key: Option<Uuid>,
    ) -> Result<TransferReceipt, LedgerError> {
        let mut tx = self.pool.begin().await?;

        if let Some(key) = idempotency_key {
            if let Some(existing) = IdempotencyRepository::find(&mut tx, key).await? {
                tracing::info!(
                    transaction_id = %existing.id,
                    idempotency_key = %key,
                    "Replayed transfer from idempotency key"
                );
                return Ok(receipt_from(existing));
            }
        }

        let (first, second) = lock_order(from, to);
        let first_row = AccountLedger::lock(&mut tx, first).await?;
        let second_row = AccountLedger::lock(&mut tx, second).await?;
        let (from_row, to_row) = if first == from {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };

        AccountLedger::apply_debit(&mut tx, &from_row, &amount).await?;
        AccountLedger::apply_credit(&mut tx, &to_row, &amount).await?;

        let (transaction_id, created_at) = TransactionLog::append(
            &mut tx,
            &NewTransfer {
                from,
                to,
                amount: &amount,
            },
        )
        .await?;

        if let Some(key) = idempotency_key {
            IdempotencyRepository::record(&mut tx, key, transaction_id).await?;
        }

        tx.commit().await?;

        tracing::info!(
            transaction_id = %transaction_id,
            from = %from,
            to = %to,
            amount = %amount,
            "Transfer committed"
        );

        Ok(TransferReceipt {
            transaction_id,
            from_account: from,
            to_account: to,
            amount: amount.value(),
            created_at,
        })
    }

    /// Inject cash into an account from outside the modeled account set.
    ///
    /// The journal records the sentinel external account as the source;
    /// no balance is debited anywhere. This is the one operation that
    /// does not conserve the total, and the sentinel source keeps it
    /// auditable as such.
    pub async fn deposit_cash(
        &self,
        command: DepositCashCommand,
        idempotency_key: Option<Uuid>,
        ctx: &OperationContext,
    ) -> Result<TransferReceipt, LedgerError> {
        let amount: Amount = command.amount.parse()?;

        ctx.run_with_deadline(self.deposit_inner(command.to_account, amount, idempotency_key))
            .await
    }

    async fn deposit_inner(
        &self,
        to: AccountId,
        amount: Amount,
        idempotency_key: Option<Uuid>,
    ) -> Result<TransferReceipt, LedgerError> {
        let mut tx = self.pool.begin().await?;

        if let Some(key) = idempotency_key {
            if let Some(existing) = IdempotencyRepository::find(&mut tx, key).await? {
                tracing::info!(
                    transaction_id = %existing.id,
                    idempotency_key = %key,
                    "Replayed deposit from idempotency key"
                );
                return Ok(receipt_from(existing));
            }
        }

        // Only the destination row is locked; the sentinel source has no
        // balance to move.
        let to_row = AccountLedger::lock(&mut tx, to).await?;
        AccountLedger::apply_credit(&mut tx, &to_row, &amount).await?;

        let (transaction_id, created_at) = TransactionLog::append(
            &mut tx,
            &NewTransfer {
                from: EXTERNAL_ACCOUNT,
                to,
                amount: &amount,
            },
        )
        .await?;

        if let Some(key) = idempotency_key {
            IdempotencyRepository::record(&mut tx, key, transaction_id).await?;
        }

        tx.commit().await?;

        tracing::info!(
            transaction_id = %transaction_id,
            to = %to,
            amount = %amount,
            "Cash deposit committed"
        );

        Ok(TransferReceipt {
            transaction_id,
            from_account: EXTERNAL_ACCOUNT,
            to_account: to,
            amount: amount.value(),
            created_at,
        })
    }
}
