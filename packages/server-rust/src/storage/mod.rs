//! Reference backing stores for the gateway's handlers.
//!
//! - [`MemoryKeyValueStore`]: `DashMap`-backed key-value tables, seeded from
//!   and reloaded from JSON snapshot files
//! - [`FileDataLake`] / [`MemoryDataLake`]: object stores holding feed
//!   snapshots

pub mod key_value;
pub mod lake;

pub use key_value::MemoryKeyValueStore;
pub use lake::{FileDataLake, MemoryDataLake};
