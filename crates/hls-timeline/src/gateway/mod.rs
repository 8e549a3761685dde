//! The object store as seen by the engine: folders of files, keyed by bucket.

mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use memory::{GatewayOp, MemoryGateway};

/// A file directly inside a bucket folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub name: String,
    /// Size in bytes when the backend reports it.
    pub size: Option<u64>,
}

impl ObjectEntry {
    pub fn new(name: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Listing and download primitives of the backing object store.
///
/// Implementations own timeouts and credentials. Transient failures are
/// reported as [`StorageError::Unavailable`]; objects that are gone are
/// [`StorageError::NotFound`].
#[async_trait]
pub trait ObjectStoreGateway: Send + Sync {
    /// Folder keys starting with `prefix`, in no particular order.
    async fn list_folders(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Files directly inside `folder_key`.
    async fn list_files(&self, folder_key: &str) -> Result<Vec<ObjectEntry>, StorageError>;

    async fn download(&self, folder_key: &str, filename: &str) -> Result<Bytes, StorageError>;
}
