//! HTTP handlers for the gateway.
//!
//! `AppState` is the shared state carried through axum extractors.

pub mod graphql;
pub mod health;

pub use graphql::{graphql_handler, schema_handler, GraphqlRequest};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::{InvocationService, OperationRegistry};

/// Shared application state passed to all axum handlers.
///
/// Every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Invocation pipeline (metrics, load shedding, dispatcher).
    pub pipeline: InvocationService,
    /// Registry behind the pipeline, for schema and health reporting.
    pub registry: Arc<OperationRegistry>,
    /// Health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Process start time, for uptime.
    pub start_time: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(
        pipeline: InvocationService,
        registry: Arc<OperationRegistry>,
        shutdown: Arc<ShutdownController>,
    ) -> Self {
        Self {
            pipeline,
            registry,
            shutdown,
            start_time: Instant::now(),
        }
    }
}
