//! Operation Context
//!
//! Metadata about the current operation: correlation id for tracing and an
//! optional caller-supplied deadline. The deadline bounds the whole unit of
//! work; on expiry the uncommitted store transaction is dropped, so no
//! partial effect survives.

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use uuid::Uuid;

use super::error::LedgerError;

/// Context for an operation, used for auditing, tracing and deadlines.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// Correlation ID for request tracing
    pub correlation_id: Option<Uuid>,

    /// Client IP address
    pub client_ip: Option<IpAddr>,

    /// Deadline for the whole operation, measured from the call
    pub deadline: Option<Duration>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Create context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Create context with client IP
    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip);
        self
    }

    /// Create context with a deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }

    /// Run a fallible operation under this context's deadline.
    ///
    /// Without a deadline the future runs to completion. With one, expiry
    /// cancels the future and reports `LedgerError::Timeout`; any store
    /// transaction held by the future rolls back on drop.
    pub async fn run_with_deadline<T, F>(&self, operation: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, operation).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Timeout),
            },
            None => operation.await,
        }
    }
}
