//! Integration tests for TransferEngine

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use bank_ledger::domain::{
    AccountId, LedgerError, OperationContext, EXTERNAL_ACCOUNT,
};
use bank_ledger::engine::{DepositCashCommand, TransferCommand, TransferEngine};
use bank_ledger::ledger::AccountLedger;

mod common;

#[tokio::test]
async fn test_transfer_moves_funds_and_journals_once() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());
    let ctx = OperationContext::new();

    let a = common::open_funded_account(&pool, 7, "100.00").await;
    let b = common::open_account(&pool, 8).await;
    let journal_before = common::journal_count(&pool).await;

    let receipt = engine
        .transfer(
            TransferCommand::new(a.id, b.id, "40.00".to_string()),
            None,
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(receipt.from_account, a.id);
    assert_eq!(receipt.to_account, b.id);
    assert_eq!(receipt.amount, dec!(40.00));

    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(60.00));
    assert_eq!(common::raw_balance(&pool, b.id).await, dec!(40.00));
    assert_eq!(common::journal_count(&pool).await, journal_before + 1);

    // The committed record is immediately visible and matches the receipt
    let (amount, from, to): (Decimal, i64, i64) = sqlx::query_as(
        "SELECT amount, from_account, to_account FROM transactions WHERE id = $1",
    )
    .bind(receipt.transaction_id.as_i64())
    .fetch_one(&*pool)
    .await
    .unwrap();
    assert_eq!(amount, dec!(40.00));
    assert_eq!(from, a.id.as_i64());
    assert_eq!(to, b.id.as_i64());
}

#[tokio::test]
async fn test_transfer_insufficient_funds_changes_nothing() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());
    let ctx = OperationContext::new();

    let a = common::open_funded_account(&pool, 7, "100.00").await;
    let b = common::open_account(&pool, 8).await;
    let journal_before = common::journal_count(&pool).await;

    let result = engine
        .transfer(
            TransferCommand::new(a.id, b.id, "150.00".to_string()),
            None,
            &ctx,
        )
        .await;

    assert_eq!(
        result,
        Err(LedgerError::InsufficientFunds {
            account: a.id,
            requested: dec!(150.00),
            available: dec!(100.00),
        })
    );

    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(100.00));
    assert_eq!(common::raw_balance(&pool, b.id).await, dec!(0.00));
    assert_eq!(common::journal_count(&pool).await, journal_before);
}

#[tokio::test]
async fn test_transfer_validation_rejections() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());
    let ctx = OperationContext::new();

    let a = common::open_funded_account(&pool, 7, "100.00").await;
    let b = common::open_account(&pool, 8).await;

    for bad_amount in ["0", "-5.00", "not-a-number", "1.234"] {
        let result = engine
            .transfer(
                TransferCommand::new(a.id, b.id, bad_amount.to_string()),
                None,
                &ctx,
            )
            .await;
        assert!(
            matches!(result, Err(LedgerError::InvalidAmount(_))),
            "amount {:?} should be rejected",
            bad_amount
        );
    }

    let result = engine
        .transfer(
            TransferCommand::new(a.id, a.id, "10.00".to_string()),
            None,
            &ctx,
        )
        .await;
    assert_eq!(result, Err(LedgerError::SameAccount));

    // Nothing was journaled or moved
    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(100.00));
}

#[tokio::test]
async fn test_transfer_from_closed_account_rejected() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());
    let ledger = AccountLedger::new(pool.clone());
    let ctx = OperationContext::new();

    let a = common::open_funded_account(&pool, 7, "100.00").await;
    let b = common::open_account(&pool, 8).await;
    ledger.close(a.id, &ctx).await.unwrap();

    let result = engine
        .transfer(
            TransferCommand::new(a.id, b.id, "1.00".to_string()),
            None,
            &ctx,
        )
        .await;

    assert_eq!(result, Err(LedgerError::AccountClosed(a.id)));
    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(100.00));
    assert_eq!(common::raw_balance(&pool, b.id).await, dec!(0.00));
}

/// The debit commits before the credit is attempted; a closed destination
/// fails the credit step and must roll the debit back.
#[tokio::test]
async fn test_failed_credit_rolls_back_debit() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());
    let ledger = AccountLedger::new(pool.clone());
    let ctx = OperationContext::new();

    let a = common::open_funded_account(&pool, 7, "100.00").await;
    let b = common::open_account(&pool, 8).await;
    ledger.close(b.id, &ctx).await.unwrap();
    let journal_before = common::journal_count(&pool).await;

    let result = engine
        .transfer(
            TransferCommand::new(a.id, b.id, "40.00".to_string()),
            None,
            &ctx,
        )
        .await;

    assert_eq!(result, Err(LedgerError::AccountClosed(b.id)));

    // Source balance, destination balance and journal are all unchanged
    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(100.00));
    assert_eq!(common::raw_balance(&pool, b.id).await, dec!(0.00));
    assert_eq!(common::journal_count(&pool).await, journal_before);
}

#[tokio::test]
async fn test_deposit_cash_creates_money_with_sentinel_source() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());
    let ctx = OperationContext::new();

    let a = common::open_account(&pool, 7).await;

    let receipt = engine
        .deposit_cash(
            DepositCashCommand::new(a.id, "50.00".to_string()),
            None,
            &ctx,
        )
        .await
        .unwrap();

    assert_eq!(receipt.from_account, EXTERNAL_ACCOUNT);
    assert_eq!(receipt.to_account, a.id);
    assert_eq!(receipt.amount, dec!(50.00));

    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(50.00));
    // The sentinel's stored balance is never touched
    assert_eq!(
        common::raw_balance(&pool, EXTERNAL_ACCOUNT).await,
        dec!(0.00)
    );
}

#[tokio::test]
async fn test_deposit_rejections() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());
    let ledger = AccountLedger::new(pool.clone());
    let ctx = OperationContext::new();

    let a = common::open_account(&pool, 7).await;
    ledger.close(a.id, &ctx).await.unwrap();

    let result = engine
        .deposit_cash(
            DepositCashCommand::new(a.id, "10.00".to_string()),
            None,
            &ctx,
        )
        .await;
    assert_eq!(result, Err(LedgerError::AccountClosed(a.id)));

    // The sentinel itself is seeded closed and cannot receive deposits
    let result = engine
        .deposit_cash(
            DepositCashCommand::new(EXTERNAL_ACCOUNT, "10.00".to_string()),
            None,
            &ctx,
        )
        .await;
    assert_eq!(result, Err(LedgerError::AccountClosed(EXTERNAL_ACCOUNT)));

    let missing = AccountId(424242);
    let result = engine
        .deposit_cash(
            DepositCashCommand::new(missing, "10.00".to_string()),
            None,
            &ctx,
        )
        .await;
    assert_eq!(result, Err(LedgerError::AccountNotFound(missing)));
}

#[tokio::test]
async fn test_idempotency_key_replays_without_reapplying() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());
    let ctx = OperationContext::new();

    let a = common::open_funded_account(&pool, 7, "100.00").await;
    let b = common::open_account(&pool, 8).await;
    let key = Uuid::new_v4();

    let command = TransferCommand::new(a.id, b.id, "25.00".to_string());
    let first = engine
        .transfer(command.clone(), Some(key), &ctx)
        .await
        .unwrap();
    let journal_after_first = common::journal_count(&pool).await;

    let second = engine.transfer(command, Some(key), &ctx).await.unwrap();

    assert_eq!(first.transaction_id, second.transaction_id);
    assert_eq!(first.created_at, second.created_at);

    // Applied exactly once
    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(75.00));
    assert_eq!(common::raw_balance(&pool, b.id).await, dec!(25.00));
    assert_eq!(common::journal_count(&pool).await, journal_after_first);
}

#[tokio::test]
async fn test_blocked_transfer_times_out_without_partial_effect() {
    let pool = common::setup_test_db().await;
    let engine = TransferEngine::new(pool.clone());

    let a = common::open_funded_account(&pool, 7, "100.00").await;
    let b = common::open_account(&pool, 8).await;
    let journal_before = common::journal_count(&pool).await;

    // Hold the source row lock in a separate store transaction
    let mut blocker = pool.begin().await.unwrap();
    let _: (Decimal,) = sqlx::query_as("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
        .bind(a.id.as_i64())
        .fetch_one(&mut *blocker)
        .await
        .unwrap();

    let ctx = OperationContext::new().with_deadline(Duration::from_millis(200));
    let result = engine
        .transfer(
            TransferCommand::new(a.id, b.id, "40.00".to_string()),
            None,
            &ctx,
        )
        .await;

    assert_eq!(result, Err(LedgerError::Timeout));

    blocker.rollback().await.unwrap();

    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(100.00));
    assert_eq!(common::raw_balance(&pool, b.id).await, dec!(0.00));
    assert_eq!(common::journal_count(&pool).await, journal_before);
}

#[tokio::test]
async fn test_concurrent_transfers_conserve_total_balance() {
    let pool = common::setup_test_db().await;
    let ctx = OperationContext::new();

    let mut accounts = Vec::new();
    for user in 0..4 {
        accounts.push(common::open_funded_account(&pool, user, "1000.00").await);
    }

    let mut handles = Vec::new();
    for i in 0..32 {
        let engine = TransferEngine::new(pool.clone());
        let from = accounts[i % 4].id;
        let to = accounts[(i + 1) % 4].id;
        let ctx = ctx.clone();
        handles.push(tokio::spawn(async move {
            engine
                .transfer(TransferCommand::new(from, to, "10.00".to_string()), None, &ctx)
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        // Business rejections are acceptable under contention; store
        // failures and partial effects are not.
        if let Err(e) = result {
            assert!(e.is_client_error(), "unexpected failure: {e}");
        }
    }

    let mut total = dec!(0.00);
    for account in &accounts {
        let balance = common::raw_balance(&pool, account.id).await;
        assert!(balance >= dec!(0.00), "no balance may go negative");
        total += balance;
    }
    assert_eq!(total, dec!(4000.00), "transfers conserve the total");
}

/// Opposite-direction transfers over the same pair lock rows in the same
/// ascending order, so none of these can deadlock and all must commit.
#[tokio::test]
async fn test_opposite_direction_transfers_all_complete() {
    let pool = common::setup_test_db().await;

    let a = common::open_funded_account(&pool, 7, "100.00").await;
    let b = common::open_funded_account(&pool, 8, "100.00").await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = TransferEngine::new(pool.clone());
        let (from, to) = if i % 2 == 0 { (a.id, b.id) } else { (b.id, a.id) };
        handles.push(tokio::spawn(async move {
            engine
                .transfer(
                    TransferCommand::new(from, to, "1.00".to_string()),
                    None,
                    &OperationContext::new(),
                )
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("transfer should commit");
    }

    // Eight each way cancels out
    assert_eq!(common::raw_balance(&pool, a.id).await, dec!(100.00));
    assert_eq!(common::raw_balance(&pool, b.id).await, dec!(100.00));
}
