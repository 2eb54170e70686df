//! Closing Doors gateway: resolves API operations against key-value and
//! compute backends behind an authorizing dispatcher.

pub mod network;
pub mod service;
pub mod storage;

pub use network::{NetworkConfig, NetworkModule};
pub use service::{build_invocation_pipeline, Dispatcher, GatewayConfig, OperationRegistry};
