use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a schema operation: the parent type plus the field name,
/// e.g. `(Query, nearestStations)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationId {
    pub type_name: String,
    pub field_name: String,
}

impl OperationId {
    #[must_use]
    pub fn new(type_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            field_name: field_name.into(),
        }
    }

    /// Shorthand for a field on the root `Query` type.
    #[must_use]
    pub fn query(field_name: impl Into<String>) -> Self {
        Self::new("Query", field_name)
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// A key-value record: field name to JSON value.
///
/// `BTreeMap` keeps field order deterministic so identical items always
/// produce identical output.
pub type Item = BTreeMap<String, serde_json::Value>;

/// Request in a handler's native shape, produced by a request transformer.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerRequest {
    /// Single-key lookup against a key-value table.
    GetItem { table: String, key: String },
    /// Opaque payload for a compute function.
    Invoke { payload: serde_json::Value },
}

impl HandlerRequest {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetItem { .. } => "get_item",
            Self::Invoke { .. } => "invoke",
        }
    }
}

/// Category of a well-formed business failure reported by a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    NotFound,
    InvalidArguments,
    /// The backend's own data is unusable. Retrying will not help.
    MalformedData,
    Other(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("NotFound"),
            Self::InvalidArguments => f.write_str("InvalidArguments"),
            Self::MalformedData => f.write_str("MalformedData"),
            Self::Other(kind) => f.write_str(kind),
        }
    }
}

/// What a handler returned. Transport problems are not represented here;
/// they surface as errors from the backend call itself.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
    Success(serde_json::Value),
    Failure { kind: FailureKind, message: String },
}

impl HandlerResult {
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Failure {
            kind: FailureKind::NotFound,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::Failure {
            kind: FailureKind::InvalidArguments,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn malformed_data(message: impl Into<String>) -> Self {
        Self::Failure {
            kind: FailureKind::MalformedData,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_id_display() {
        let id = OperationId::query("nearestStations");
        assert_eq!(id.to_string(), "Query.nearestStations");
    }

    #[test]
    fn operation_id_orders_by_type_then_field() {
        let a = OperationId::new("Mutation", "z");
        let b = OperationId::new("Query", "a");
        let c = OperationId::new("Query", "b");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn failure_kind_display() {
        assert_eq!(FailureKind::NotFound.to_string(), "NotFound");
        assert_eq!(FailureKind::Other("Throttled".into()).to_string(), "Throttled");
    }

    #[test]
    fn handler_result_helpers() {
        assert!(HandlerResult::Success(serde_json::Value::Null).is_success());
        assert!(!HandlerResult::not_found("gone").is_success());
        assert_eq!(
            HandlerResult::invalid_arguments("bad"),
            HandlerResult::Failure {
                kind: FailureKind::InvalidArguments,
                message: "bad".to_string()
            }
        );
    }
}
