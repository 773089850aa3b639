//! Common test utilities

use std::sync::{Arc, OnceLock};

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use bank_ledger::domain::{AccountId, OperationContext, UserId};
use bank_ledger::engine::{DepositCashCommand, TransferEngine};
use bank_ledger::ledger::{Account, AccountLedger};

static DB_GATE: OnceLock<Arc<Mutex<()>>> = OnceLock::new();

/// Pool handle holding the per-binary database gate. Tests share one
/// database and each starts by truncating it, so they take turns.
pub struct TestDb {
    pool: PgPool,
    _gate: OwnedMutexGuard<()>,
}

impl std::ops::Deref for TestDb {
    type Target = PgPool;

    fn deref(&self) -> &PgPool {
        &self.pool
    }
}

/// Setup test database - truncate tables and reseed the sentinel account
pub async fn setup_test_db() -> TestDb {
    let gate = DB_GATE
        .get_or_init(|| Arc::new(Mutex::new(())))
        .clone()
        .lock_owned()
        .await;

    dotenvy::dotenv().ok();
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    let mut tx = pool.begin().await.expect("Failed to begin transaction");

    // Clean up DB for fresh state
    sqlx::query("TRUNCATE TABLE idempotency_keys, transactions, accounts RESTART IDENTITY CASCADE")
        .execute(&mut *tx)
        .await
        .expect("Failed to clean up DB");

    // Reseed the sentinel external account (id 1, closed)
    sqlx::query(
        r#"
        INSERT INTO accounts (id, number, balance, closed, user_id)
        VALUES (1, 0, 0.00, TRUE, 0)
        "#,
    )
    .execute(&mut *tx)
    .await
    .expect("Failed to seed sentinel account");

    sqlx::query("SELECT setval('accounts_id_seq', 1, true)")
        .execute(&mut *tx)
        .await
        .expect("Failed to reset account id sequence");

    tx.commit().await.expect("Failed to commit transaction");

    TestDb { pool, _gate: gate }
}

/// Open a fresh account for `user_id`.
pub async fn open_account(pool: &PgPool, user_id: i64) -> Account {
    AccountLedger::new(pool.clone())
        .open(UserId(user_id), &OperationContext::new())
        .await
        .expect("Failed to open account")
}

/// Open an account and fund it with a cash deposit.
pub async fn open_funded_account(pool: &PgPool, user_id: i64, amount: &str) -> Account {
    let account = open_account(pool, user_id).await;

    TransferEngine::new(pool.clone())
        .deposit_cash(
            DepositCashCommand::new(account.id, amount.to_string()),
            None,
            &OperationContext::new(),
        )
        .await
        .expect("Failed to fund account");

    account
}

/// Current stored balance of an account, closed or not.
pub async fn raw_balance(pool: &PgPool, account_id: AccountId) -> Decimal {
    sqlx::query_scalar("SELECT balance FROM accounts WHERE id = $1")
        .bind(account_id.as_i64())
        .fetch_one(pool)
        .await
        .expect("Failed to read balance")
}

/// Number of journal rows.
pub async fn journal_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(pool)
        .await
        .expect("Failed to count transactions")
}
