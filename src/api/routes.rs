//! API Routes
//!
//! HTTP endpoint definitions. This layer only parses transport input into
//! validated commands and renders results; all semantics live in the
//! ledger core.

use axum::{
    extract::{Extension, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{AccountId, OperationContext, TransactionId, UserId};
use crate::engine::{DepositCashCommand, TransferCommand, TransferEngine, TransferReceipt};
use crate::error::AppError;
use crate::journal::{JournalCursor, Transaction};
use crate::ledger::{Account, AccountLedger};
use crate::query::QueryService;

/// Header carrying the caller's idempotency key for transfers/deposits.
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Default page size for transaction listings when the caller paginates.
const DEFAULT_PAGE_LIMIT: i64 = 100;

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct OpenAccountRequest {
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: AccountId,
    pub number: i64,
    pub balance: Decimal,
    pub closed: bool,
    pub user_id: UserId,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            number: account.number,
            balance: account.balance,
            closed: account.closed,
            user_id: account.user_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountListResponse {
    pub user_id: UserId,
    pub accounts: Vec<AccountResponse>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub account_id: AccountId,
    pub balance: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub to_account: AccountId,
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub transaction_id: TransactionId,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<TransferReceipt> for TransferResponse {
    fn from(receipt: TransferReceipt) -> Self {
        Self {
            transaction_id: receipt.transaction_id,
            from_account: receipt.from_account,
            to_account: receipt.to_account,
            amount: receipt.amount,
            created_at: receipt.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Keyset continuation: creation time of the last row already seen
    #[serde(default)]
    pub after_created_at: Option<DateTime<Utc>>,
    /// Keyset continuation: id of the last row already seen
    #[serde(default)]
    pub after_id: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: TransactionId,
    pub amount: Decimal,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub created_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(transaction: Transaction) -> Self {
        Self {
            id: transaction.id,
            amount: transaction.amount,
            from_account: transaction.from_account,
            to_account: transaction.to_account,
            created_at: transaction.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransactionListResponse {
    pub transactions: Vec<TransactionResponse>,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<PgPool> {
    Router::new()
        // Accounts
        .route("/accounts", post(open_account))
        .route("/accounts/:account_id", get(get_account))
        .route("/accounts/:account_id/close", post(close_account))
        .route("/accounts/:account_id/balance", get(get_balance))
        .route("/users/:user_id/accounts", get(list_accounts))
        // Money movement
        .route("/transfers", post(transfer))
        .route("/deposits", post(deposit_cash))
        // History
        .route("/transactions", get(list_transactions))
}

/// Parse the optional idempotency key header.
fn idempotency_key(headers: &HeaderMap) -> Result<Option<Uuid>, AppError> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|raw| raw.parse::<Uuid>().ok())
            .map(Some)
            .ok_or_else(|| {
                AppError::InvalidRequest("Idempotency-Key must be a UUID".to_string())
            }),
    }
}

// =========================================================================
// POST /accounts
// =========================================================================

/// Open a new account
async fn open_account(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    let ledger = AccountLedger::new(pool);

    let account = ledger.open(request.user_id, &context).await?;

    Ok((StatusCode::CREATED, Json(account.into())))
}

// =========================================================================
// GET /accounts/:account_id
// =========================================================================

/// Get one account, closed or not (audit view)
async fn get_account(
    State(pool): State<PgPool>,
    Path(account_id): Path<i64>,
) -> Result<Json<AccountResponse>, AppError> {
    let queries = QueryService::new(pool);

    let account = queries.get_account(AccountId(account_id)).await?;

    Ok(Json(account.into()))
}

// =========================================================================
// POST /accounts/:account_id/close
// =========================================================================

/// Close an account (idempotent)
async fn close_account(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let ledger = AccountLedger::new(pool);

    ledger.close(AccountId(account_id), &context).await?;

    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// GET /accounts/:account_id/balance
// =========================================================================

/// Get the usable balance of an open account
async fn get_balance(
    State(pool): State<PgPool>,
    Path(account_id): Path<i64>,
) -> Result<Json<BalanceResponse>, AppError> {
    let queries = QueryService::new(pool);

    let account_id = AccountId(account_id);
    let balance = queries.get_balance(account_id).await?;

    Ok(Json(BalanceResponse {
        account_id,
        balance,
    }))
}

// =========================================================================
// GET /users/:user_id/accounts
// =========================================================================

/// List all accounts owned by a user
async fn list_accounts(
    State(pool): State<PgPool>,
    Path(user_id): Path<i64>,
) -> Result<Json<AccountListResponse>, AppError> {
    let queries = QueryService::new(pool);

    let user_id = UserId(user_id);
    let accounts = queries.list_accounts_for_user(user_id).await?;

    Ok(Json(AccountListResponse {
        user_id,
        accounts: accounts.into_iter().map(AccountResponse::from).collect(),
    }))
}

// =========================================================================
// POST /transfers
// =========================================================================

/// Transfer money between two accounts
async fn transfer(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    Json(request): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), AppError> {
    let key = idempotency_key(&headers)?;
    let engine = TransferEngine::new(pool);

    let command = TransferCommand::new(request.from_account, request.to_account, request.amount);
    let receipt = engine.transfer(command, key, &context).await?;

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

// =========================================================================
// POST /deposits
// =========================================================================

/// Deposit cash into an account
async fn deposit_cash(
    State(pool): State<PgPool>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    Json(request): Json<DepositRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), AppError> {
    let key = idempotency_key(&headers)?;
    let engine = TransferEngine::new(pool);

    let command = DepositCashCommand::new(request.to_account, request.amount);
    let receipt = engine.deposit_cash(command, key, &context).await?;

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

// =========================================================================
// GET /transactions
// =========================================================================

/// List transfers within an inclusive date range, oldest first
async fn list_transactions(
    State(pool): State<PgPool>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionListResponse>, AppError> {
    let queries = QueryService::new(pool);

    let cursor = match (query.after_created_at, query.after_id) {
        (Some(created_at), Some(id)) => Some(JournalCursor {
            created_at,
            id: TransactionId(id),
        }),
        (None, None) => None,
        _ => {
            return Err(AppError::InvalidRequest(
                "after_created_at and after_id must be supplied together".to_string(),
            ))
        }
    };

    let transactions = if cursor.is_some() || query.limit.is_some() {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        queries
            .list_transactions_page(query.start, query.end, cursor, limit)
            .await?
    } else {
        queries.list_transactions(query.start, query.end).await?
    };

    Ok(Json(TransactionListResponse {
        transactions: transactions
            .into_iter()
            .map(TransactionResponse::from)
            .collect(),
    }))
}
