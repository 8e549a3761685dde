use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use super::{ObjectEntry, ObjectStoreGateway};
use crate::error::StorageError;

/// Gateway operations, for call accounting and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    ListFolders,
    ListFiles,
    Download,
}

impl GatewayOp {
    fn name(self) -> &'static str {
        match self {
            Self::ListFolders => "list_folders",
            Self::ListFiles => "list_files",
            Self::Download => "download",
        }
    }
}

#[derive(Debug, Default)]
struct CallCounters {
    list_folders: AtomicU64,
    list_files: AtomicU64,
    download: AtomicU64,
}

impl CallCounters {
    fn counter(&self, op: GatewayOp) -> &AtomicU64 {
        match op {
            GatewayOp::ListFolders => &self.list_folders,
            GatewayOp::ListFiles => &self.list_files,
            GatewayOp::Download => &self.download,
        }
    }
}

/// In-memory object store.
///
/// Listings can be returned in reverse order to mimic stores that do not
/// sort, and individual operations can be made to fail a number of times.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    folders: RwLock<BTreeMap<String, BTreeMap<String, Bytes>>>,
    pending_failures: Mutex<HashMap<GatewayOp, u32>>,
    calls: CallCounters,
    reverse_listings: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_folder(&self, folder_key: &str) {
        self.folders
            .write()
            .entry(folder_key.to_string())
            .or_default();
    }

    pub fn put_file(&self, folder_key: &str, filename: &str, data: impl Into<Bytes>) {
        self.folders
            .write()
            .entry(folder_key.to_string())
            .or_default()
            .insert(filename.to_string(), data.into());
    }

    pub fn remove_file(&self, folder_key: &str, filename: &str) -> bool {
        self.folders
            .write()
            .get_mut(folder_key)
            .is_some_and(|files| files.remove(filename).is_some())
    }

    pub fn remove_folder(&self, folder_key: &str) -> bool {
        self.folders.write().remove(folder_key).is_some()
    }

    /// Makes the next `times` calls of `op` fail with `Unavailable`.
    pub fn fail_next(&self, op: GatewayOp, times: u32) {
        *self.pending_failures.lock().entry(op).or_insert(0) += times;
    }

    pub fn set_reverse_listings(&self, reverse: bool) {
        self.reverse_listings.store(reverse, Ordering::Relaxed);
    }

    pub fn calls(&self, op: GatewayOp) -> u64 {
        self.calls.counter(op).load(Ordering::Relaxed)
    }

    fn enter(&self, op: GatewayOp) -> Result<(), StorageError> {
        self.calls.counter(op).fetch_add(1, Ordering::Relaxed);
        let mut failures = self.pending_failures.lock();
        if let Some(remaining) = failures.get_mut(&op)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StorageError::unavailable(op.name(), "injected failure"));
        }
        Ok(())
    }

    fn ordered<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if self.reverse_listings.load(Ordering::Relaxed) {
            items.reverse();
        }
        items
    }
}

#[async_trait]
impl ObjectStoreGateway for MemoryGateway {
    async fn list_folders(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.enter(GatewayOp::ListFolders)?;
        let keys: Vec<String> = self
            .folders
            .read()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        trace!(prefix, count = keys.len(), "Listed folders");
        Ok(self.ordered(keys))
    }

    async fn list_files(&self, folder_key: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        self.enter(GatewayOp::ListFiles)?;
        let folders = self.folders.read();
        let files = folders
            .get(folder_key)
            .ok_or_else(|| StorageError::not_found(folder_key))?;
        let entries = files
            .iter()
            .map(|(name, data)| ObjectEntry::new(name.clone(), Some(data.len() as u64)))
            .collect();
        Ok(self.ordered(entries))
    }

    async fn download(&self, folder_key: &str, filename: &str) -> Result<Bytes, StorageError> {
        self.enter(GatewayOp::Download)?;
        self.folders
            .read()
            .get(folder_key)
            .and_then(|files| files.get(filename))
            .cloned()
            .ok_or_else(|| StorageError::not_found(format!("{folder_key}/{filename}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lists_by_prefix_and_counts_calls() {
        let gateway = MemoryGateway::new();
        gateway.put_file("0000000060", "live.m3u8", "x");
        gateway.put_file("0000000120", "live0.ts", "yy");
        gateway.create_folder("0000003600");

        let keys = gateway.list_folders("00000001").await.unwrap();
        assert_eq!(keys, vec!["0000000120".to_string()]);

        let files = gateway.list_files("0000000120").await.unwrap();
        assert_eq!(files, vec![ObjectEntry::new("live0.ts", Some(2))]);

        assert_eq!(gateway.calls(GatewayOp::ListFolders), 1);
        assert_eq!(gateway.calls(GatewayOp::ListFiles), 1);
    }

    #[tokio::test]
    async fn missing_objects_are_not_found() {
        let gateway = MemoryGateway::new();
        let err = gateway.list_files("nope").await.unwrap_err();
        assert!(err.is_not_found());
        let err = gateway.download("nope", "live.m3u8").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let gateway = MemoryGateway::new();
        gateway.create_folder("a");
        gateway.fail_next(GatewayOp::ListFolders, 2);

        assert!(gateway.list_folders("").await.unwrap_err().is_retryable());
        assert!(gateway.list_folders("").await.is_err());
        assert_eq!(gateway.list_folders("").await.unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn reversed_listings() {
        let gateway = MemoryGateway::new();
        gateway.create_folder("1");
        gateway.create_folder("2");
        gateway.set_reverse_listings(true);
        assert_eq!(gateway.list_folders("").await.unwrap(), vec!["2", "1"]);
    }
}
