//! Mapping transformers between operation shapes and handler-native shapes.
//!
//! Both directions are pure functions of their inputs. Malformed input never
//! panics; it produces a [`TransformError`] tagged with the side that was at
//! fault.

use std::fmt;

use closing_doors_core::{
    FailureKind, HandlerRequest, HandlerResult, OperationSchema, ValidationResult,
};
use serde_json::{Map, Value};

use super::handler::BackendKind;

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformSide {
    /// Invocation arguments could not be mapped (caller's fault).
    Request,
    /// Handler output could not be mapped (server's fault).
    Response,
}

impl fmt::Display for TransformSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{side} transformation failed: {message}")]
pub struct TransformError {
    pub side: TransformSide,
    pub message: String,
}

impl TransformError {
    #[must_use]
    pub fn request(message: impl Into<String>) -> Self {
        Self {
            side: TransformSide::Request,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn response(message: impl Into<String>) -> Self {
        Self {
            side: TransformSide::Response,
            message: message.into(),
        }
    }
}

/// Output of a response transformer.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationResult {
    /// Value in the operation's declared result shape.
    Data(Value),
    /// A business failure the transformer does not map to an empty result.
    Failure { kind: FailureKind, message: String },
    /// The handler's response did not fit the declared shape.
    Malformed(TransformError),
}

// ---------------------------------------------------------------------------
// Direct key-value policy
// ---------------------------------------------------------------------------

/// One component of a composite key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPart {
    Literal(String),
    /// Value of the named invocation argument (string or integer).
    Argument(String),
}

/// Where the partition key of a lookup comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Literal(String),
    Composite {
        parts: Vec<KeyPart>,
        separator: String,
    },
}

/// Copies one stored field into the output object under a (possibly)
/// different name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: String,
    pub target: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueMapping {
    pub table: String,
    pub key: KeySource,
    /// Output fields, in declaration order. Stored fields not listed here
    /// are dropped.
    pub fields: Vec<FieldMapping>,
}

impl KeyValueMapping {
    #[must_use]
    pub fn new(table: impl Into<String>, key: KeySource) -> Self {
        Self {
            table: table.into(),
            key,
            fields: Vec::new(),
        }
    }

    /// Declares a non-null output field.
    #[must_use]
    pub fn field(mut self, source: &str, target: &str) -> Self {
        self.fields.push(FieldMapping {
            source: source.to_string(),
            target: target.to_string(),
            nullable: false,
        });
        self
    }

    /// Declares a nullable output field.
    #[must_use]
    pub fn optional_field(mut self, source: &str, target: &str) -> Self {
        self.fields.push(FieldMapping {
            source: source.to_string(),
            target: target.to_string(),
            nullable: true,
        });
        self
    }

    fn build_key(&self, args: &Map<String, Value>) -> Result<String, TransformError> {
        match &self.key {
            KeySource::Literal(key) => Ok(key.clone()),
            KeySource::Composite { parts, separator } => {
                let mut rendered = Vec::with_capacity(parts.len());
                for part in parts {
                    match part {
                        KeyPart::Literal(s) => rendered.push(s.clone()),
                        KeyPart::Argument(name) => match args.get(name) {
                            Some(Value::String(s)) => rendered.push(s.clone()),
                            Some(Value::Number(n)) if n.is_i64() || n.is_u64() => {
                                rendered.push(n.to_string());
                            }
                            Some(_) => {
                                return Err(TransformError::request(format!(
                                    "key argument `{name}` must be a string or integer"
                                )))
                            }
                            None => {
                                return Err(TransformError::request(format!(
                                    "key argument `{name}` is missing"
                                )))
                            }
                        },
                    }
                }
                Ok(rendered.join(separator))
            }
        }
    }

    fn project(&self, item: &Map<String, Value>) -> Result<Value, TransformError> {
        let mut out = Map::with_capacity(self.fields.len());
        for mapping in &self.fields {
            match item.get(&mapping.source) {
                Some(v) if !v.is_null() => {
                    out.insert(mapping.target.clone(), v.clone());
                }
                _ if mapping.nullable => {
                    out.insert(mapping.target.clone(), Value::Null);
                }
                _ => {
                    return Err(TransformError::response(format!(
                        "stored item has no value for non-null field `{}`",
                        mapping.source
                    )))
                }
            }
        }
        Ok(Value::Object(out))
    }
}

// ---------------------------------------------------------------------------
// Compute-passthrough policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassthroughMapping {
    /// Failure kinds reported as the operation's empty value instead of an
    /// error.
    pub empty_on: Vec<FailureKind>,
}

impl Default for PassthroughMapping {
    fn default() -> Self {
        Self {
            empty_on: vec![FailureKind::NotFound],
        }
    }
}

// ---------------------------------------------------------------------------
// Transformer
// ---------------------------------------------------------------------------

/// Request/response adapter bound to one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transformer {
    DirectKeyValue(KeyValueMapping),
    ComputePassthrough(PassthroughMapping),
}

impl Transformer {
    /// Backend category this transformer produces requests for.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        match self {
            Self::DirectKeyValue(_) => BackendKind::KeyValue,
            Self::ComputePassthrough(_) => BackendKind::Compute,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::DirectKeyValue(_) => "direct_key_value",
            Self::ComputePassthrough(_) => "compute_passthrough",
        }
    }

    /// Builds the handler request for an invocation.
    ///
    /// # Errors
    ///
    /// Returns a request-side [`TransformError`] if the arguments do not
    /// match the operation schema or a key argument is unusable.
    pub fn to_handler_request(
        &self,
        schema: &OperationSchema,
        args: &Map<String, Value>,
    ) -> Result<HandlerRequest, TransformError> {
        if let ValidationResult::Invalid { errors } = schema.validate_arguments(args) {
            return Err(TransformError::request(errors.join("; ")));
        }
        match self {
            Self::DirectKeyValue(mapping) => Ok(HandlerRequest::GetItem {
                table: mapping.table.clone(),
                key: mapping.build_key(args)?,
            }),
            Self::ComputePassthrough(_) => Ok(HandlerRequest::Invoke {
                payload: Value::Object(args.clone()),
            }),
        }
    }

    /// Maps a handler result into the operation's result shape.
    #[must_use]
    pub fn from_handler_result(
        &self,
        schema: &OperationSchema,
        result: HandlerResult,
    ) -> OperationResult {
        let value = match (self, result) {
            (Self::DirectKeyValue(mapping), HandlerResult::Success(Value::Object(item))) => {
                match mapping.project(&item) {
                    Ok(v) => v,
                    Err(e) => return OperationResult::Malformed(e),
                }
            }
            (Self::DirectKeyValue(_), HandlerResult::Success(other)) => {
                return OperationResult::Malformed(TransformError::response(format!(
                    "expected a stored item, got {}",
                    short_kind(&other)
                )))
            }
            (_, HandlerResult::Failure { kind: FailureKind::MalformedData, message }) => {
                return OperationResult::Malformed(TransformError::response(message))
            }
            (Self::DirectKeyValue(_), HandlerResult::Failure { kind: FailureKind::NotFound, .. }) => {
                schema.result.empty_value()
            }
            (Self::ComputePassthrough(_), HandlerResult::Success(v)) => v,
            (Self::ComputePassthrough(policy), HandlerResult::Failure { kind, .. })
                if policy.empty_on.contains(&kind) =>
            {
                schema.result.empty_value()
            }
            (_, HandlerResult::Failure { kind, message }) => {
                return OperationResult::Failure { kind, message }
            }
        };

        match schema.result.check(&value, "result") {
            Ok(()) => OperationResult::Data(value),
            Err(e) => OperationResult::Malformed(TransformError::response(e)),
        }
    }
}

fn short_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use closing_doors_core::{ObjectType, ScalarKind, TypeRef};
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::service::catalog::{station_type, system_metadata_type};

    fn metadata_schema() -> OperationSchema {
        OperationSchema::returning(TypeRef::object(system_metadata_type()))
    }

    fn metadata_transformer() -> Transformer {
        Transformer::DirectKeyValue(
            KeyValueMapping::new("mtaSystemMetadata", KeySource::Literal("running_services".into()))
                .field("data", "runningServices")
                .field("updated_at", "updatedAt")
                .optional_field("min_feed_updated_at", "minFeedUpdatedAt"),
        )
    }

    fn stations_schema() -> OperationSchema {
        OperationSchema::returning(TypeRef::list(TypeRef::object(station_type()).non_null()).non_null())
            .argument("lat", TypeRef::scalar(ScalarKind::Float).non_null())
            .argument("lon", TypeRef::scalar(ScalarKind::Float).non_null())
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn literal_key_lookup() {
        let req = metadata_transformer()
            .to_handler_request(&metadata_schema(), &Map::new())
            .unwrap();
        assert_eq!(
            req,
            HandlerRequest::GetItem {
                table: "mtaSystemMetadata".into(),
                key: "running_services".into()
            }
        );
    }

    #[test]
    fn composite_key_from_arguments() {
        let schema = OperationSchema::returning(TypeRef::object(ObjectType::new("Route")))
            .argument("agency", TypeRef::scalar(ScalarKind::String).non_null())
            .argument("route", TypeRef::scalar(ScalarKind::Id).non_null());
        let transformer = Transformer::DirectKeyValue(KeyValueMapping::new(
            "routes",
            KeySource::Composite {
                parts: vec![
                    KeyPart::Literal("route".into()),
                    KeyPart::Argument("agency".into()),
                    KeyPart::Argument("route".into()),
                ],
                separator: "#".into(),
            },
        ));
        let req = transformer
            .to_handler_request(&schema, &obj(json!({"agency": "nyct", "route": 6})))
            .unwrap();
        assert_eq!(
            req,
            HandlerRequest::GetItem {
                table: "routes".into(),
                key: "route#nyct#6".into()
            }
        );
    }

    #[test]
    fn invalid_arguments_fail_on_request_side() {
        let transformer = Transformer::ComputePassthrough(PassthroughMapping::default());
        let err = transformer
            .to_handler_request(&stations_schema(), &obj(json!({"lat": 40.7})))
            .unwrap_err();
        assert_eq!(err.side, TransformSide::Request);
        assert!(err.message.contains("lon"));
    }

    #[test]
    fn passthrough_forwards_arguments_verbatim() {
        let transformer = Transformer::ComputePassthrough(PassthroughMapping::default());
        let args = obj(json!({"lat": 40.7, "lon": -74.0}));
        let req = transformer.to_handler_request(&stations_schema(), &args).unwrap();
        assert_eq!(
            req,
            HandlerRequest::Invoke {
                payload: json!({"lat": 40.7, "lon": -74.0})
            }
        );
    }

    #[test]
    fn key_value_projection_renames_and_drops_fields() {
        let item = json!({
            "key": "running_services",
            "data": ["1", "A"],
            "updated_at": 1_700_000_000,
            "min_feed_updated_at": 1_699_999_990
        });
        let out = metadata_transformer()
            .from_handler_result(&metadata_schema(), HandlerResult::Success(item));
        assert_eq!(
            out,
            OperationResult::Data(json!({
                "runningServices": ["1", "A"],
                "updatedAt": 1_700_000_000,
                "minFeedUpdatedAt": 1_699_999_990
            }))
        );
    }

    #[test]
    fn key_value_optional_field_defaults_to_null() {
        let item = json!({"data": [], "updated_at": 5});
        let out = metadata_transformer()
            .from_handler_result(&metadata_schema(), HandlerResult::Success(item));
        let OperationResult::Data(v) = out else {
            panic!("expected data");
        };
        assert_eq!(v["minFeedUpdatedAt"], Value::Null);
    }

    #[test]
    fn key_value_missing_required_field_is_malformed() {
        let item = json!({"data": []});
        let out = metadata_transformer()
            .from_handler_result(&metadata_schema(), HandlerResult::Success(item));
        let OperationResult::Malformed(err) = out else {
            panic!("expected malformed");
        };
        assert_eq!(err.side, TransformSide::Response);
        assert!(err.message.contains("updated_at"));
    }

    #[test]
    fn key_value_non_object_is_malformed() {
        let out = metadata_transformer()
            .from_handler_result(&metadata_schema(), HandlerResult::Success(json!("oops")));
        assert!(matches!(out, OperationResult::Malformed(_)));
    }

    #[test]
    fn key_value_not_found_is_null() {
        let out = metadata_transformer()
            .from_handler_result(&metadata_schema(), HandlerResult::not_found("no item"));
        assert_eq!(out, OperationResult::Data(Value::Null));
    }

    #[test]
    fn passthrough_not_found_is_empty_list() {
        let transformer = Transformer::ComputePassthrough(PassthroughMapping::default());
        let out = transformer.from_handler_result(&stations_schema(), HandlerResult::not_found("none"));
        assert_eq!(out, OperationResult::Data(json!([])));
    }

    #[test]
    fn malformed_backend_data_is_a_response_error() {
        let transformer = Transformer::ComputePassthrough(PassthroughMapping::default());
        let out = transformer.from_handler_result(
            &stations_schema(),
            HandlerResult::malformed_data("stops file is corrupt"),
        );
        assert_eq!(
            out,
            OperationResult::Malformed(TransformError::response("stops file is corrupt"))
        );
    }

    #[test]
    fn passthrough_other_failures_surface() {
        let transformer = Transformer::ComputePassthrough(PassthroughMapping::default());
        let out = transformer.from_handler_result(
            &stations_schema(),
            HandlerResult::invalid_arguments("At least 1 service must be provided"),
        );
        assert_eq!(
            out,
            OperationResult::Failure {
                kind: FailureKind::InvalidArguments,
                message: "At least 1 service must be provided".into()
            }
        );
    }

    #[test]
    fn passthrough_shape_mismatch_is_malformed() {
        let transformer = Transformer::ComputePassthrough(PassthroughMapping::default());
        let out = transformer.from_handler_result(&stations_schema(), HandlerResult::Success(json!({"id": "1"})));
        assert!(matches!(
            out,
            OperationResult::Malformed(TransformError { side: TransformSide::Response, .. })
        ));
        let out = transformer.from_handler_result(&stations_schema(), HandlerResult::Success(Value::Null));
        assert!(matches!(out, OperationResult::Malformed(_)));
    }

    #[test]
    fn key_value_field_of_wrong_type_is_malformed() {
        let cases = [
            (json!({"data": ["1"], "updated_at": "yesterday"}), "result.updatedAt"),
            (json!({"data": "not-a-list", "updated_at": 5}), "result.runningServices"),
            (json!({"data": ["1", 7], "updated_at": 5}), "result.runningServices[1]"),
        ];
        for (item, path) in cases {
            let out = metadata_transformer()
                .from_handler_result(&metadata_schema(), HandlerResult::Success(item));
            let OperationResult::Malformed(err) = out else {
                panic!("expected malformed for {path}");
            };
            assert_eq!(err.side, TransformSide::Response);
            assert!(err.message.starts_with(path), "{}", err.message);
        }
    }

    #[test]
    fn passthrough_items_are_checked_field_by_field() {
        let transformer = Transformer::ComputePassthrough(PassthroughMapping::default());
        let out = transformer.from_handler_result(
            &stations_schema(),
            HandlerResult::Success(json!([{"bogus": true}])),
        );
        let OperationResult::Malformed(err) = out else {
            panic!("expected malformed");
        };
        assert_eq!(err.side, TransformSide::Response);
        assert_eq!(err.message, "result[0].bogus: not a field of Station");

        let station = json!({
            "id": "127",
            "name": "Times Sq-42 St",
            "lat": 40.75529,
            "lon": -73.987495,
            "distance_km": 0.0
        });
        let out = transformer.from_handler_result(
            &stations_schema(),
            HandlerResult::Success(json!([station.clone()])),
        );
        assert_eq!(out, OperationResult::Data(json!([station])));
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z0-9]{0,8}".prop_map(Value::String),
            prop::collection::vec("[A-Z0-9]{1,2}", 0..5)
                .prop_map(|v| Value::Array(v.into_iter().map(Value::String).collect())),
        ]
    }

    proptest! {
        #[test]
        fn key_value_transform_is_idempotent(
            data in json_leaf(),
            updated in json_leaf(),
            min_updated in json_leaf(),
            extra in prop::collection::btree_map("[a-z_]{1,6}", json_leaf(), 0..4),
        ) {
            let mut item = Map::new();
            for (k, v) in extra {
                item.insert(k, v);
            }
            item.insert("data".into(), data);
            item.insert("updated_at".into(), updated);
            item.insert("min_feed_updated_at".into(), min_updated);
            let item = Value::Object(item);

            let transformer = metadata_transformer();
            let schema = metadata_schema();
            let first = transformer.from_handler_result(&schema, HandlerResult::Success(item.clone()));
            let second = transformer.from_handler_result(&schema, HandlerResult::Success(item));
            prop_assert_eq!(first, second);
        }
    }
}
