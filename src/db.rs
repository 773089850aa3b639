//! Database module
//!
//! Connection and schema verification utilities.

use sqlx::PgPool;

use crate::domain::EXTERNAL_ACCOUNT;

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;

    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let required_tables = vec!["accounts", "transactions", "idempotency_keys"];

    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    if !check_external_account(pool).await? {
        return Ok(false);
    }

    Ok(true)
}

/// Check that the sentinel external account is seeded and closed. Every
/// cash deposit references it as the journal source; a reopened sentinel
/// would let it take part in regular transfers.
async fn check_external_account(pool: &PgPool) -> Result<bool, sqlx::Error> {
    let closed: Option<bool> = sqlx::query_scalar("SELECT closed FROM accounts WHERE id = $1")
        .bind(EXTERNAL_ACCOUNT.as_i64())
        .fetch_optional(pool)
        .await?;

    match closed {
        None => {
            tracing::error!(
                "Sentinel external account {} does not exist. Please run migrations.",
                EXTERNAL_ACCOUNT
            );
            Ok(false)
        }
        Some(false) => {
            tracing::error!(
                "Sentinel external account {} is open; it must stay closed",
                EXTERNAL_ACCOUNT
            );
            Ok(false)
        }
        Some(true) => {
            tracing::info!("Sentinel external account verified");
            Ok(true)
        }
    }
}
