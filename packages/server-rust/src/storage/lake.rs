//! [`DataLake`] implementations: a directory of objects on disk and an
//! in-memory map for tests and embedding.

use std::path::{Component, Path, PathBuf};

use anyhow::bail;
use async_trait::async_trait;
use closing_doors_core::DataLake;
use dashmap::DashMap;

/// Objects stored as files under a root directory, one file per key.
#[derive(Debug, Clone)]
pub struct FileDataLake {
    root: PathBuf,
}

impl FileDataLake {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> anyhow::Result<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() || !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("invalid object key `{key}`");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl DataLake for FileDataLake {
    async fn read_object(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(anyhow::Error::new(e).context(format!("reading {}", path.display()))),
        }
    }
}

/// Objects held in memory.
#[derive(Debug, Default)]
pub struct MemoryDataLake {
    objects: DashMap<String, Vec<u8>>,
}

impl MemoryDataLake {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_object(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.insert(key.into(), bytes);
    }
}

#[async_trait]
impl DataLake for MemoryDataLake {
    async fn read_object(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.objects.get(key).map(|v| v.value().clone()))
    }
}
