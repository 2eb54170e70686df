use async_trait::async_trait;

use crate::types::{HandlerResult, Item};

/// Single-table keyed store backing direct key-value operations.
///
/// Reads return the latest snapshot written by the external refresh
/// process. An `Err` means the store could not be reached; a missing key is
/// `Ok(None)`.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Look up one item by partition key.
    async fn get_item(&self, table: &str, key: &str) -> anyhow::Result<Option<Item>>;
}

/// Packaged compute function invoked with an opaque JSON payload.
///
/// Business failures are reported as `Ok(HandlerResult::Failure { .. })`.
/// `Err` is reserved for the function being unreachable or crashing.
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    async fn invoke(&self, payload: serde_json::Value) -> anyhow::Result<HandlerResult>;
}

/// Object store holding feed snapshots.
#[async_trait]
pub trait DataLake: Send + Sync {
    /// Read an object by key. `Ok(None)` if no such object exists.
    async fn read_object(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
}
