//! Backend handler categories.
//!
//! The three categories are resolved at registration time into a tagged enum,
//! so dispatch is a `match` rather than dynamic lookup by name.

use std::sync::Arc;

use anyhow::bail;
use closing_doors_core::{ComputeBackend, HandlerRequest, HandlerResult, KeyValueBackend};
use serde_json::Value;

/// Shape of request a handler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Single-key table lookups (`GetItem`).
    KeyValue,
    /// Opaque payload invocations (`Invoke`).
    Compute,
}

/// A backend handler bound to an operation.
#[derive(Clone)]
pub enum Handler {
    KeyValue(Arc<dyn KeyValueBackend>),
    GeoCompute(Arc<dyn ComputeBackend>),
    TimeSeriesCompute(Arc<dyn ComputeBackend>),
}

impl Handler {
    /// Stable name used in logs, metrics, and `HandlerUnavailable` errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::KeyValue(_) => "key_value",
            Self::GeoCompute(_) => "geo_compute",
            Self::TimeSeriesCompute(_) => "time_series_compute",
        }
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        match self {
            Self::KeyValue(_) => BackendKind::KeyValue,
            Self::GeoCompute(_) | Self::TimeSeriesCompute(_) => BackendKind::Compute,
        }
    }

    /// Sends one request to the backend.
    ///
    /// A missing key-value item is reported as a `NotFound` failure, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable, or if the request shape
    /// does not match the handler category.
    pub async fn invoke(&self, request: HandlerRequest) -> anyhow::Result<HandlerResult> {
        match (self, request) {
            (Self::KeyValue(store), HandlerRequest::GetItem { table, key }) => {
                match store.get_item(&table, &key).await? {
                    Some(item) => Ok(HandlerResult::Success(Value::Object(
                        item.into_iter().collect(),
                    ))),
                    None => Ok(HandlerResult::not_found(format!(
                        "no item `{key}` in table `{table}`"
                    ))),
                }
            }
            (
                Self::GeoCompute(function) | Self::TimeSeriesCompute(function),
                HandlerRequest::Invoke { payload },
            ) => function.invoke(payload).await,
            (handler, request) => bail!(
                "handler `{}` cannot serve a `{}` request",
                handler.name(),
                request.kind()
            ),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
