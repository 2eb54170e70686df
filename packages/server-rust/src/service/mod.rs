//! Operation resolution and dispatch.
//!
//! This module implements the resolver pipeline:
//!
//! 1. **Registry** (`registry`): operation identity -> handler, transformer,
//!    schema and accepted authorization modes
//! 2. **Authorization** (`auth`): credentials -> `AuthorizationContext`
//! 3. **Transformers** (`transform`): operation shape <-> handler shape
//! 4. **Handlers** (`handler`, `domain`): key-value and compute backends
//! 5. **Dispatcher** (`dispatcher`): the per-invocation state machine
//! 6. **Middleware** (`middleware`): Tower layers (metrics, load-shedding)
//! 7. **Reload** (`reload`): periodic and on-demand snapshot reloads

pub mod auth;
pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod handler;
pub mod middleware;
pub mod operation;
pub mod registry;
pub mod reload;
pub mod transform;

// Re-export key types for convenient access.
pub use auth::{ApiKeyStore, AuthError, Authenticator, InternalTokenVerifier};
pub use catalog::{build_registry, CatalogBackends};
pub use config::GatewayConfig;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use handler::{BackendKind, Handler};
pub use middleware::{build_invocation_pipeline, InvocationService};
pub use operation::{
    Credentials, DispatchError, DispatchState, ErrorClass, Invocation, OperationResponse,
    Unavailable,
};
pub use registry::{OperationBinding, OperationRegistry, RegistryBuilder, RegistryError};
pub use reload::{ReloadTrigger, ReloaderHandle, SnapshotReloader};
pub use transform::{OperationResult, TransformError, TransformSide, Transformer};
