//! Invocation, dispatch state, and error taxonomy for the resolver pipeline.

use std::fmt;
use std::time::Instant;

use closing_doors_core::{FailureKind, OperationId};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::auth::AuthError;
use super::transform::{TransformError, TransformSide};

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Caller-supplied credentials, exactly as received. Nothing here has been
/// verified yet; the dispatcher's `Authorizing` step does that.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No credentials were presented.
    Absent,
    /// An in-process caller that is trusted by construction.
    Trusted { principal: String },
    /// Internal bearer token (HS256 JWT signed with the gateway secret).
    BearerToken(String),
    /// External API key.
    ApiKey(String),
}

impl Credentials {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Trusted { .. } => "trusted",
            Self::BearerToken(_) => "bearer_token",
            Self::ApiKey(_) => "api_key",
        }
    }
}

// Secrets never reach logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Trusted { principal } => {
                f.debug_struct("Trusted").field("principal", principal).finish()
            }
            Self::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One concrete execution of an operation. Lives only for the duration of
/// its dispatch.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub id: Uuid,
    pub operation: OperationId,
    pub arguments: Map<String, Value>,
    pub credentials: Credentials,
    pub received_at: Instant,
}

impl Invocation {
    #[must_use]
    pub fn new(operation: OperationId, arguments: Map<String, Value>, credentials: Credentials) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            arguments,
            credentials,
            received_at: Instant::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// DispatchState
// ---------------------------------------------------------------------------

/// States of the per-invocation dispatch state machine.
///
/// `Received → Authorizing → Resolving → TransformingRequest → Invoking →
/// TransformingResponse → Completed`, with `Failed` reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchState {
    Received,
    Authorizing,
    Resolving,
    TransformingRequest,
    Invoking,
    TransformingResponse,
    Completed,
    Failed,
}

impl DispatchState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authorizing => "authorizing",
            Self::Resolving => "resolving",
            Self::TransformingRequest => "transforming_request",
            Self::Invoking => "invoking",
            Self::TransformingResponse => "transforming_response",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::{
            Authorizing, Completed, Failed, Invoking, Received, Resolving, TransformingRequest,
            TransformingResponse,
        };
        match (self, next) {
            (Received, Authorizing)
            | (Authorizing, Resolving)
            | (Resolving, TransformingRequest)
            | (TransformingRequest, Invoking)
            | (Invoking, TransformingResponse)
            | (TransformingResponse, Completed) => true,
            (Received, Failed) => false,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// Successful result of an invocation, already in the operation's declared
/// result shape. `data` may be `null` or `[]` when the handler reported
/// "not found".
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub invocation_id: Uuid,
    pub operation: OperationId,
    pub data: Value,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Which side of the boundary caused a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    Server,
}

impl ErrorClass {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

/// Why a handler could not be reached. Backend error details stay in the
/// gateway's logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    Timeout { timeout_ms: u64 },
    Unreachable,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { timeout_ms } => write!(f, "timed out after {timeout_ms}ms"),
            Self::Unreachable => f.write_str("unreachable"),
        }
    }
}

/// Errors surfaced at the dispatcher boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("not authorized: {0}")]
    Authorization(#[from] AuthError),
    #[error("unknown operation: {operation}")]
    UnknownOperation { operation: OperationId },
    #[error(transparent)]
    Transformation(#[from] TransformError),
    #[error("handler `{handler}` {reason}")]
    HandlerUnavailable {
        handler: &'static str,
        reason: Unavailable,
    },
    #[error("{message}")]
    HandlerFailure { kind: FailureKind, message: String },
    #[error("gateway overloaded, try again later")]
    Overloaded,
}

impl DispatchError {
    /// Whether the caller or the server side is at fault.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Authorization(_) | Self::UnknownOperation { .. } | Self::HandlerFailure { .. } => {
                ErrorClass::Client
            }
            Self::Transformation(e) => match e.side {
                TransformSide::Request => ErrorClass::Client,
                TransformSide::Response => ErrorClass::Server,
            },
            Self::HandlerUnavailable { .. } | Self::Overloaded => ErrorClass::Server,
        }
    }

    /// Whether the caller may retry the same invocation. The gateway itself
    /// never retries.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HandlerUnavailable { .. } | Self::Overloaded)
    }

    /// Stable identifier for the error category, used in responses and metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Authorization(_) => "AuthorizationError",
            Self::UnknownOperation { .. } => "UnknownOperationError",
            Self::Transformation(_) => "TransformationError",
            Self::HandlerUnavailable { .. } => "HandlerUnavailableError",
            Self::HandlerFailure { .. } => "HandlerFailure",
            Self::Overloaded => "Overloaded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_redacts_secrets() {
        let key = Credentials::ApiKey("da2-secret".to_string());
        let token = Credentials::BearerToken("eyJhbGci".to_string());
        assert_eq!(format!("{key:?}"), "ApiKey(<redacted>)");
        assert!(!format!("{token:?}").contains("eyJ"));
    }

    #[test]
    fn happy_path_transitions_are_allowed() {
        use DispatchState::*;
        let path = [
            Received,
            Authorizing,
            Resolving,
            TransformingRequest,
            Invoking,
            TransformingResponse,
            Completed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        use DispatchState::*;
        assert!(!Received.can_transition_to(Resolving));
        assert!(!Authorizing.can_transition_to(Invoking));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn failed_reachable_from_every_working_state() {
        use DispatchState::*;
        for state in [Authorizing, Resolving, TransformingRequest, Invoking, TransformingResponse] {
            assert!(state.can_transition_to(Failed), "{state:?}");
        }
    }

    #[test]
    fn classification_and_retryability() {
        let unavailable = DispatchError::HandlerUnavailable {
            handler: "geo_compute",
            reason: Unavailable::Timeout { timeout_ms: 50 },
        };
        assert_eq!(unavailable.class(), ErrorClass::Server);
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.to_string(), "handler `geo_compute` timed out after 50ms");

        let unknown = DispatchError::UnknownOperation {
            operation: OperationId::query("nope"),
        };
        assert_eq!(unknown.class(), ErrorClass::Client);
        assert!(!unknown.is_retryable());

        let request_side = DispatchError::from(TransformError::request("bad args"));
        let response_side = DispatchError::from(TransformError::response("bad payload"));
        assert_eq!(request_side.class(), ErrorClass::Client);
        assert_eq!(response_side.class(), ErrorClass::Server);
        assert!(!response_side.is_retryable());
    }
}
