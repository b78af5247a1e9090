//! In-memory store used for dry runs and tests.
//!
//! Every call is appended to an operation log, so callers can assert on
//! exactly which reads, writes and deletes happened.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::info;
use tokio::sync::RwLock;

use super::{ConfigStore, Lookup, Removal, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Read(String),
    Write(String, String),
    Delete(String),
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
    ops: RwLock<Vec<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents, sorted by key.
    pub async fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn ops(&self) -> Vec<StoreOp> {
        self.ops.read().await.clone()
    }

    /// Keys written so far, in order, including overwrites.
    pub async fn writes(&self) -> Vec<String> {
        self.ops
            .read()
            .await
            .iter()
            .filter_map(|op| match op {
                StoreOp::Write(key, _) => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn clear_ops(&self) {
        self.ops.write().await.clear();
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn read(&self, key: &str) -> Result<Lookup, StoreError> {
        self.ops.write().await.push(StoreOp::Read(key.to_string()));
        Ok(match self.entries.read().await.get(key) {
            Some(value) => Lookup::Exists(value.clone()),
            None => Lookup::Absent,
        })
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        info!("[memory] set {} = {}", key, value);
        self.ops
            .write()
            .await
            .push(StoreOp::Write(key.to_string(), value.to_string()));
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<Removal, StoreError> {
        self.ops.write().await.push(StoreOp::Delete(key.to_string()));
        Ok(match self.entries.write().await.remove(key) {
            Some(_) => {
                info!("[memory] removed {}", key);
                Removal::Deleted
            }
            None => Removal::Absent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_write_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.read("/a").await.unwrap(), Lookup::Absent);

        store.write("/a", "1").await.unwrap();
        store.write("/a", "2").await.unwrap();
        assert_eq!(store.read("/a").await.unwrap(), Lookup::Exists("2".into()));

        assert_eq!(store.delete("/a").await.unwrap(), Removal::Deleted);
        assert_eq!(store.delete("/a").await.unwrap(), Removal::Absent);
        assert!(store.snapshot().await.is_empty());

        assert_eq!(store.writes().await, vec!["/a".to_string(), "/a".to_string()]);
        assert_eq!(store.ops().await.len(), 6);
    }
}
