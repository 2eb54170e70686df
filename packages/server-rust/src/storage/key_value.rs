//! In-memory [`KeyValueBackend`] implementation backed by [`DashMap`].
//!
//! Holds one map per table. Writes are last-writer-wins per key; a snapshot
//! reload replaces each table it mentions in a single swap, so readers see
//! either the old table or the new one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use async_trait::async_trait;
use closing_doors_core::{Item, KeyValueBackend};
use dashmap::DashMap;
use serde_json::Value;

/// Field holding an item's partition key inside snapshot files.
pub const KEY_FIELD: &str = "key";

type Table = HashMap<String, Item>;

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    tables: DashMap<String, Arc<Table>>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one item.
    pub fn put_item(&self, table: &str, key: &str, item: Item) {
        let mut entry = self.tables.entry(table.to_string()).or_default();
        Arc::make_mut(entry.value_mut()).insert(key.to_string(), item);
    }

    /// Number of items in `table`.
    #[must_use]
    pub fn table_len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |t| t.len())
    }

    /// Replaces tables from a snapshot document of the form
    /// `{ "<table>": [ { "key": "...", ... }, ... ] }`.
    ///
    /// Returns the number of items loaded. Tables absent from the document
    /// are left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not of that shape or an item has
    /// no string `key`. Nothing is replaced in that case.
    pub fn load_snapshot_value(&self, snapshot: Value) -> anyhow::Result<usize> {
        let Value::Object(tables) = snapshot else {
            bail!("snapshot must be an object of tables");
        };

        let mut staged = Vec::with_capacity(tables.len());
        let mut loaded = 0;
        for (name, items) in tables {
            let Value::Array(items) = items else {
                bail!("table `{name}` must be a list of items");
            };
            let mut table = Table::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                let Value::Object(fields) = item else {
                    bail!("table `{name}` item {i} is not an object");
                };
                let Some(key) = fields.get(KEY_FIELD).and_then(Value::as_str).map(str::to_string)
                else {
                    bail!("table `{name}` item {i} has no string `{KEY_FIELD}`");
                };
                table.insert(key, fields.into_iter().collect());
            }
            loaded += table.len();
            staged.push((name, table));
        }

        for (name, table) in staged {
            self.tables.insert(name, Arc::new(table));
        }
        Ok(loaded)
    }

    /// Reads a snapshot file and applies it with
    /// [`load_snapshot_value`](Self::load_snapshot_value).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load_snapshot_file(&self, path: &Path) -> anyhow::Result<usize> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        self.load_snapshot_value(value)
    }
}

#[async_trait]
impl KeyValueBackend for MemoryKeyValueStore {
    async fn get_item(&self, table: &str, key: &str) -> anyhow::Result<Option<Item>> {
        Ok(self
            .tables
            .get(table)
            .and_then(|t| t.get(key).cloned()))
    }
}
