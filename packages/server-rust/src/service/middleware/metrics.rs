//! Metrics middleware for invocations.
//!
//! Opens one `tracing` span per invocation and records the
//! `gateway_invocations_total` counter and the
//! `gateway_invocation_duration_seconds` histogram through the `metrics`
//! facade. Without an installed recorder the metric calls are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::operation::{DispatchError, Invocation, OperationResponse};

pub const INVOCATIONS_TOTAL: &str = "gateway_invocations_total";
pub const INVOCATION_DURATION_SECONDS: &str = "gateway_invocation_duration_seconds";

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records invocation duration and outcome.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Invocation> for MetricsService<S>
where
    S: Service<Invocation, Response = OperationResponse, Error = DispatchError> + Send,
    S::Future: Send + 'static,
{
    type Response = OperationResponse;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, DispatchError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let operation = invocation.operation.to_string();
        let invocation_id = invocation.id;

        // `mode` is filled in by the dispatcher once the caller authenticates.
        let span = info_span!(
            "invocation",
            operation = %operation,
            invocation_id = %invocation_id,
            mode = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(invocation);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let outcome = match &result {
                    Ok(_) => "ok",
                    Err(e) => e.error_type(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                metrics::counter!(
                    INVOCATIONS_TOTAL,
                    "operation" => operation.clone(),
                    "outcome" => outcome
                )
                .increment(1);
                metrics::histogram!(INVOCATION_DURATION_SECONDS, "operation" => operation)
                    .record(elapsed.as_secs_f64());

                match &result {
                    Err(e) if e.class() == crate::service::operation::ErrorClass::Server => {
                        tracing::warn!(duration_ms, outcome, error = %e, "invocation failed");
                    }
                    _ => tracing::info!(duration_ms, outcome, "invocation complete"),
                }

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
