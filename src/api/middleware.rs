//! API Middleware
//!
//! Request context construction and request logging. The context carries
//! the correlation id and the operation deadline down into the ledger
//! core; the transport itself is never seen below this layer.

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::OperationContext;

/// Header carrying a caller-chosen correlation id.
const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Header carrying a per-request deadline in milliseconds.
const DEADLINE_HEADER: &str = "x-deadline-ms";

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

// =========================================================================
// Operation Context Middleware
// =========================================================================

/// Build an `OperationContext` for the request and stash it in the
/// request extensions. A caller-supplied deadline header overrides the
/// configured default.
pub async fn context_middleware(
    State(config): State<Config>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let mut context = OperationContext::new();

    if let Some(id) = header_value(request.headers(), CORRELATION_ID_HEADER)
        .and_then(|raw| raw.parse::<Uuid>().ok())
    {
        context = context.with_correlation_id(id);
    }

    let deadline = header_value(request.headers(), DEADLINE_HEADER)
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
        .or_else(|| config.operation_timeout());

    if let Some(deadline) = deadline {
        context = context.with_deadline(deadline);
    }

    context.ensure_correlation_id();
    request.extensions_mut().insert(context);

    next.run(request).await
}

// =========================================================================
// Request Logging Middleware
// =========================================================================

/// Request logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    // Extract correlation ID if available
    let correlation_id = request
        .extensions()
        .get::<OperationContext>()
        .and_then(|ctx| ctx.correlation_id);

    let start = std::time::Instant::now();

    tracing::info!(
        method = %method,
        uri = %uri,
        correlation_id = ?correlation_id,
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        correlation_id = ?correlation_id,
        "Request completed"
    );

    response
}
