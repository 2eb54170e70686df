//! Per-invocation dispatch state machine.
//!
//! Each invocation walks `Received → Authorizing → Resolving →
//! TransformingRequest → Invoking → TransformingResponse → Completed`, or
//! drops to `Failed` at the first failing step. Invocations share nothing but
//! the read-only registry and authenticator, so any number may run
//! concurrently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use closing_doors_core::AuthMode;
use tower::Service;
use uuid::Uuid;

use super::auth::Authenticator;
use super::config::GatewayConfig;
use super::operation::{
    DispatchError, DispatchState, Invocation, OperationResponse, Unavailable,
};
use super::registry::OperationRegistry;
use super::transform::OperationResult;

// ---------------------------------------------------------------------------
// DispatchReport
// ---------------------------------------------------------------------------

/// Outcome of one invocation plus the states it passed through.
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub invocation_id: Uuid,
    pub states: Vec<DispatchState>,
    /// Caller's mode, once authenticated.
    pub mode: Option<AuthMode>,
    pub result: Result<OperationResponse, DispatchError>,
}

impl DispatchReport {
    #[must_use]
    pub fn final_state(&self) -> DispatchState {
        self.states.last().copied().unwrap_or(DispatchState::Received)
    }

    #[must_use]
    pub fn visited(&self, state: DispatchState) -> bool {
        self.states.contains(&state)
    }
}

/// Records state transitions for one invocation.
struct StateTrail {
    invocation_id: Uuid,
    states: Vec<DispatchState>,
    mode: Option<AuthMode>,
}

impl StateTrail {
    fn new(invocation_id: Uuid) -> Self {
        Self {
            invocation_id,
            states: vec![DispatchState::Received],
            mode: None,
        }
    }

    fn enter(&mut self, next: DispatchState) {
        debug_assert!(
            self.states.last().is_some_and(|s| s.can_transition_to(next)),
            "illegal transition to {next:?} after {:?}",
            self.states
        );
        tracing::trace!(state = next.as_str(), "dispatch state");
        self.states.push(next);
    }

    fn complete(mut self, response: OperationResponse) -> DispatchReport {
        self.enter(DispatchState::Completed);
        DispatchReport {
            invocation_id: self.invocation_id,
            states: self.states,
            mode: self.mode,
            result: Ok(response),
        }
    }

    fn fail(mut self, error: DispatchError) -> DispatchReport {
        self.enter(DispatchState::Failed);
        DispatchReport {
            invocation_id: self.invocation_id,
            states: self.states,
            mode: self.mode,
            result: Err(error),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Authorizes, resolves, transforms and invokes operations.
///
/// Cheap to clone; clones share the registry and authenticator.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    authenticator: Arc<Authenticator>,
    default_timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<OperationRegistry>,
        authenticator: Arc<Authenticator>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            registry,
            authenticator,
            default_timeout: config.handler_timeout(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Runs one invocation to a terminal state.
    ///
    /// Dropping the returned future cancels the pending handler call and
    /// nothing else.
    pub async fn dispatch(&self, invocation: Invocation) -> DispatchReport {
        let mut trail = StateTrail::new(invocation.id);
        let op = &invocation.operation;

        // Authorizing. The accepted modes live on the binding, so the lookup
        // happens here; an unknown operation is reported only after the
        // caller has authenticated.
        trail.enter(DispatchState::Authorizing);
        let ctx = match self.authenticator.authenticate(&invocation.credentials) {
            Ok(ctx) => ctx,
            Err(e) => return trail.fail(e.into()),
        };
        trail.mode = Some(ctx.mode);
        tracing::Span::current().record("mode", ctx.mode.as_str());
        let lookup = self.registry.resolve(&op.type_name, &op.field_name);
        if let Ok(binding) = &lookup {
            if let Err(e) = Authenticator::authorize(&ctx, &binding.auth_modes, &binding.id) {
                return trail.fail(e.into());
            }
        }

        trail.enter(DispatchState::Resolving);
        let Ok(binding) = lookup else {
            return trail.fail(DispatchError::UnknownOperation {
                operation: op.clone(),
            });
        };

        trail.enter(DispatchState::TransformingRequest);
        let request = match binding
            .transformer
            .to_handler_request(&binding.schema, &invocation.arguments)
        {
            Ok(request) => request,
            Err(e) => return trail.fail(e.into()),
        };

        trail.enter(DispatchState::Invoking);
        let timeout = binding.timeout.unwrap_or(self.default_timeout);
        let handler = binding.handler.name();
        let result = match tokio::time::timeout(timeout, binding.handler.invoke(request)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(handler, error = %format!("{e:#}"), "handler unreachable");
                return trail.fail(DispatchError::HandlerUnavailable {
                    handler,
                    reason: Unavailable::Unreachable,
                });
            }
            Err(_elapsed) => {
                #[allow(clippy::cast_possible_truncation)]
                let timeout_ms = timeout.as_millis() as u64;
                tracing::warn!(handler, timeout_ms, "handler timed out");
                return trail.fail(DispatchError::HandlerUnavailable {
                    handler,
                    reason: Unavailable::Timeout { timeout_ms },
                });
            }
        };

        trail.enter(DispatchState::TransformingResponse);
        match binding.transformer.from_handler_result(&binding.schema, result) {
            OperationResult::Data(data) => trail.complete(OperationResponse {
                invocation_id: invocation.id,
                operation: invocation.operation,
                data,
            }),
            OperationResult::Failure { kind, message } => {
                trail.fail(DispatchError::HandlerFailure { kind, message })
            }
            OperationResult::Malformed(e) => {
                tracing::warn!(handler, error = %e, "handler response did not match schema");
                trail.fail(e.into())
            }
        }
    }
}

impl Service<Invocation> for Dispatcher {
    type Response = OperationResponse;
    type Error = DispatchError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationResponse, DispatchError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { dispatcher.dispatch(invocation).await.result })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
