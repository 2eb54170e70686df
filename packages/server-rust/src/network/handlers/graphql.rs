//! Resolver invocation endpoint and schema document.
//!
//! `POST /graphql` carries one field resolution: parent type, field name and
//! arguments. Credentials come from headers. The result is wrapped the way a
//! GraphQL response would be: `data` keyed by field name, or an `errors`
//! list.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use closing_doors_core::OperationId;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower::ServiceExt;

use super::AppState;
use crate::network::middleware::API_KEY_HEADER;
use crate::service::{Credentials, DispatchError, ErrorClass, Invocation};

/// Body of a resolver invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
    #[serde(default = "default_type_name")]
    pub type_name: String,
    pub field_name: String,
    #[serde(default)]
    pub arguments: Option<Map<String, Value>>,
}

fn default_type_name() -> String {
    "Query".to_string()
}

/// Reads caller credentials from the request headers.
///
/// `Authorization: Bearer <token>` wins over `x-api-key`. Other
/// `Authorization` schemes are ignored.
#[must_use]
pub fn extract_credentials(headers: &HeaderMap) -> Credentials {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Credentials::BearerToken(token.to_string());
    }
    match headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()) {
        Some(key) if !key.is_empty() => Credentials::ApiKey(key.to_string()),
        _ => Credentials::Absent,
    }
}

/// HTTP status for a dispatch error.
#[must_use]
pub fn status_for(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::Authorization(e) if e.is_forbidden() => StatusCode::FORBIDDEN,
        DispatchError::Authorization(_) => StatusCode::UNAUTHORIZED,
        DispatchError::UnknownOperation { .. } | DispatchError::HandlerFailure { .. } => {
            StatusCode::BAD_REQUEST
        }
        DispatchError::Transformation(_) if error.class() == ErrorClass::Client => {
            StatusCode::BAD_REQUEST
        }
        DispatchError::Transformation(_) => StatusCode::BAD_GATEWAY,
        DispatchError::HandlerUnavailable { .. } | DispatchError::Overloaded => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn error_body(message: String, error_type: &str, class: &str, retryable: bool) -> Value {
    json!({
        "data": null,
        "errors": [{
            "message": message,
            "errorType": error_type,
            "errorClass": class,
            "retryable": retryable,
        }],
    })
}

fn error_response(error: &DispatchError) -> Response {
    let body = error_body(
        error.to_string(),
        error.error_type(),
        error.class().as_str(),
        error.is_retryable(),
    );
    (status_for(error), Json(body)).into_response()
}

/// Answers an unreadable request body with the same error envelope as a
/// failed invocation.
fn rejection_response(rejection: &JsonRejection) -> Response {
    let body = error_body(rejection.body_text(), "BadRequestError", "client", false);
    (rejection.status(), Json(body)).into_response()
}

/// Runs one invocation through the pipeline.
pub async fn graphql_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Result<Json<GraphqlRequest>, JsonRejection>,
) -> Response {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => return rejection_response(&rejection),
    };
    if !state.shutdown.health_state().accepts_invocations() {
        let body = error_body(
            "gateway is shutting down".to_string(),
            "ShuttingDown",
            "server",
            true,
        );
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    }
    let _guard = state.shutdown.in_flight_guard();

    let field_name = request.field_name.clone();
    let invocation = Invocation::new(
        OperationId::new(request.type_name, request.field_name),
        request.arguments.unwrap_or_default(),
        extract_credentials(&headers),
    );

    match state.pipeline.clone().oneshot(invocation).await {
        Ok(response) => {
            let mut data = Map::new();
            data.insert(field_name, response.data);
            Json(json!({ "data": data })).into_response()
        }
        Err(error) => error_response(&error),
    }
}

/// The schema document rendered from the registered operations.
pub async fn schema_handler(State(state): State<AppState>) -> String {
    state.registry.render_sdl()
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use closing_doors_core::{Item, KeyWindow, ManualClock, Stop};

    use super::*;
    use crate::network::ShutdownController;
    use crate::service::auth::{ApiKeyStore, Authenticator};
    use crate::service::catalog::{build_registry, CatalogBackends, METADATA_KEY, METADATA_TABLE};
    use crate::service::domain::{NearestStationsFunction, TrainTimesFunction};
    use crate::service::{build_invocation_pipeline, AuthError, Dispatcher, GatewayConfig};
    use crate::storage::{MemoryDataLake, MemoryKeyValueStore};

    const NOW_MS: u64 = 1_700_000_000_000;

    pub(crate) fn test_state() -> AppState {
        let store = Arc::new(MemoryKeyValueStore::new());
        store.put_item(
            METADATA_TABLE,
            METADATA_KEY,
            Item::from([
                ("key".to_string(), json!(METADATA_KEY)),
                ("data".to_string(), json!(["1", "A"])),
                ("updated_at".to_string(), json!(1_700_000_000)),
            ]),
        );
        let stations = NearestStationsFunction::new(vec![Stop {
            id: "127".to_string(),
            name: "Times Sq-42 St".to_string(),
            lat: 40.75529,
            lon: -73.987495,
        }]);
        let registry = Arc::new(
            build_registry(CatalogBackends {
                metadata: store,
                stations: Arc::new(stations),
                train_times: Arc::new(TrainTimesFunction::new(Arc::new(MemoryDataLake::new()))),
            })
            .unwrap(),
        );

        let mut keys = ApiKeyStore::new();
        keys.insert(
            "web",
            "da2-web",
            KeyWindow {
                not_before: None,
                expires_at: NOW_MS + 60_000,
            },
        );
        keys.insert(
            "old",
            "da2-old",
            KeyWindow {
                not_before: None,
                expires_at: NOW_MS - 1,
            },
        );
        let auth = Authenticator::new(keys, None, Arc::new(ManualClock::new(NOW_MS)));
        let config = GatewayConfig::default();
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::new(auth), &config);
        AppState::new(
            build_invocation_pipeline(dispatcher, &config),
            registry,
            Arc::new(ShutdownController::new()),
        )
    }

    fn router(state: AppState) -> Router {
        Router::new()
            .route("/graphql", post(graphql_handler))
            .route("/schema", get(schema_handler))
            .with_state(state)
    }

    async fn call(state: AppState, body: Value, api_key: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::post("/graphql").header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn bearer_takes_precedence_over_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "da2-web".parse().unwrap());
        assert_eq!(
            extract_credentials(&headers),
            Credentials::ApiKey("da2-web".into())
        );

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(
            extract_credentials(&headers),
            Credentials::BearerToken("abc.def.ghi".into())
        );

        headers.insert(AUTHORIZATION, "Basic dXNlcjpwdw==".parse().unwrap());
        assert_eq!(
            extract_credentials(&headers),
            Credentials::ApiKey("da2-web".into())
        );

        assert_eq!(extract_credentials(&HeaderMap::new()), Credentials::Absent);
    }

    #[test]
    fn forbidden_and_unauthenticated_differ() {
        let missing = DispatchError::Authorization(AuthError::MissingCredentials);
        assert_eq!(status_for(&missing), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&DispatchError::Overloaded), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn resolves_metadata_with_api_key() {
        let state = test_state();
        state.shutdown.set_ready();
        let (status, body) = call(
            state,
            json!({"fieldName": "systemMetadata"}),
            Some("da2-web"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"data": {"systemMetadata": {"runningServices": ["1", "A"], "updatedAt": 1_700_000_000}}})
        );
    }

    #[tokio::test]
    async fn expired_key_is_unauthorized() {
        let state = test_state();
        state.shutdown.set_ready();
        let (status, body) = call(
            state,
            json!({"fieldName": "systemMetadata"}),
            Some("da2-old"),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errors"][0]["errorType"], "AuthorizationError");
        assert_eq!(body["errors"][0]["retryable"], false);
    }

    #[tokio::test]
    async fn unknown_field_and_bad_arguments_are_client_errors() {
        let state = test_state();
        state.shutdown.set_ready();
        let (status, body) = call(
            state.clone(),
            json!({"fieldName": "stationFeed"}),
            Some("da2-web"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["errorType"], "UnknownOperationError");

        let (status, body) = call(
            state,
            json!({"fieldName": "nearestStations", "arguments": {"lat": "north"}}),
            Some("da2-web"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["errorType"], "TransformationError");
        assert_eq!(body["errors"][0]["errorClass"], "client");
    }

    #[tokio::test]
    async fn nearest_stations_over_http() {
        let state = test_state();
        state.shutdown.set_ready();
        let (status, body) = call(
            state,
            json!({
                "typeName": "Query",
                "fieldName": "nearestStations",
                "arguments": {"lat": 40.7553, "lon": -73.9875, "numStations": 1}
            }),
            Some("da2-web"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["nearestStations"][0]["id"], "127");
    }

    #[tokio::test]
    async fn draining_gateway_refuses_invocations() {
        let state = test_state();
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();
        let (status, body) = call(
            state,
            json!({"fieldName": "systemMetadata"}),
            Some("da2-web"),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["errors"][0]["errorType"], "ShuttingDown");
    }

    #[tokio::test]
    async fn schema_document_lists_operations_and_types() {
        let request = Request::get("/schema").body(Body::empty()).unwrap();
        let response = router(test_state()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let sdl = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(sdl.contains("type Query {"));
        assert!(sdl.contains(
            "type TrainTimes {\n  stationServiceTrips: [StationServiceTrips!]!\n  updatedAt: Int\n}"
        ));
        assert!(sdl.contains("type Trip {\n  id: ID!\n  arrival: Int!\n  delayed: Boolean\n}"));
    }

    async fn call_raw(
        state: AppState,
        body: &'static str,
        content_type: &str,
    ) -> (StatusCode, Value) {
        let request = Request::post("/graphql")
            .header("content-type", content_type)
            .header(API_KEY_HEADER, "da2-web")
            .body(Body::from(body))
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unreadable_body_gets_error_envelope() {
        let state = test_state();
        state.shutdown.set_ready();

        let (status, body) = call_raw(state.clone(), r#"{"fieldName": "#, "application/json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["errors"][0]["errorType"], "BadRequestError");
        assert_eq!(body["errors"][0]["errorClass"], "client");
        assert_eq!(body["errors"][0]["retryable"], false);

        let (status, body) =
            call_raw(state.clone(), r#"{"typeName": "Query"}"#, "application/json").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["errors"][0]["errorClass"], "client");
        assert!(body["errors"][0]["message"]
            .as_str()
            .unwrap()
            .contains("fieldName"));

        let (status, body) =
            call_raw(state, r#"{"fieldName": "systemMetadata"}"#, "text/plain").await;
        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(body["errors"][0]["errorType"], "BadRequestError");
    }
}
