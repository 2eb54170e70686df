//! Pipeline composition: wraps the dispatcher in the middleware stack.

use tower::ServiceBuilder;

use super::load_shed::{LoadShedLayer, LoadShedService};
use super::metrics::{MetricsLayer, MetricsService};
use crate::service::config::GatewayConfig;
use crate::service::dispatcher::Dispatcher;

/// The fully layered invocation service handed to the network layer.
///
/// Cloning is cheap; clones share the dispatcher and the load-shed permits.
pub type InvocationService = MetricsService<LoadShedService<Dispatcher>>;

/// Builds the invocation pipeline around a `Dispatcher`.
///
/// Layer order (outermost to innermost):
/// 1. `MetricsLayer` -- span, counters and duration, including shed invocations
/// 2. `LoadShedLayer` -- reject when overloaded before doing any work
///
/// Handler timeouts are enforced inside the dispatcher, per binding.
#[must_use]
pub fn build_invocation_pipeline(dispatcher: Dispatcher, config: &GatewayConfig) -> InvocationService {
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .layer(LoadShedLayer::new(config.max_concurrent_invocations))
        .service(dispatcher)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
