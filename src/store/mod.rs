//! Access to the proxy's key-value configuration tree.
//!
//! A missing key is an ordinary outcome here ([`Lookup::Absent`],
//! [`Removal::Absent`]), not an error.  [`StoreError`] is reserved for
//! transport and protocol failures.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::records;

pub mod etcd;
pub mod memory;

pub use etcd::EtcdStore;
pub use memory::{MemoryStore, StoreOp};

/// Result of reading a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Exists(String),
    Absent,
}

impl Lookup {
    pub fn exists(&self) -> bool {
        matches!(self, Lookup::Exists(_))
    }
}

/// Result of deleting a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    Absent,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid etcd endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("unexpected status {status} for key {key}")]
    UnexpectedStatus { key: String, status: u16 },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to decode response for key {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },
}

/// Result of [`ensure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Created,
    AlreadyPresent,
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Reads `key`, reporting whether it is present.
    async fn read(&self, key: &str) -> Result<Lookup, StoreError>;

    /// Creates or overwrites `key`.
    async fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes `key`, reporting whether anything was there.
    async fn delete(&self, key: &str) -> Result<Removal, StoreError>;
}

/// Writes `record` under `key` unless the key already exists.  An
/// existing value is left untouched, whatever it contains.
///
/// The read and the write are not atomic; a concurrent writer to the same
/// key can interleave between them.
pub async fn ensure<T>(store: &dyn ConfigStore, key: &str, record: &T) -> Result<Ensured, StoreError>
where
    T: Serialize + Sync,
{
    if store.read(key).await?.exists() {
        return Ok(Ensured::AlreadyPresent);
    }
    let value = records::encode(record)?;
    store.write(key, &value).await?;
    Ok(Ensured::Created)
}
