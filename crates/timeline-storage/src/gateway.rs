use async_trait::async_trait;
use bytes::Bytes;
use hls_timeline::{ObjectEntry, ObjectStoreGateway, StorageError};
use opendal::{ErrorKind, Operator};
use tracing::trace;

/// [`ObjectStoreGateway`] over an OpenDAL operator.
///
/// Bucket folders are expected at `{prefix}/{folder_key}/` below the
/// operator root, e.g. `rpi_orcasound_lab/hls/1657546219/live.m3u8`.
#[derive(Debug, Clone)]
pub struct OpendalGateway {
    op: Operator,
    prefix: String,
}

impl OpendalGateway {
    pub fn new(op: Operator, prefix: impl AsRef<str>) -> Self {
        Self {
            op,
            prefix: prefix.as_ref().trim_matches('/').to_string(),
        }
    }

    pub fn operator(&self) -> &Operator {
        &self.op
    }

    /// Directory holding all bucket folders, with a trailing slash. Empty
    /// when folders sit at the operator root.
    fn base_dir(&self) -> String {
        if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        }
    }

    fn folder_dir(&self, folder_key: &str) -> String {
        format!("{}{}/", self.base_dir(), folder_key)
    }
}

fn map_error(operation: &'static str, path: &str, err: opendal::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::not_found(path)
    } else {
        StorageError::unavailable(operation, err.to_string())
    }
}

#[async_trait]
impl ObjectStoreGateway for OpendalGateway {
    /// A non-empty `prefix` is sent to the store as a key prefix, so a probe
    /// for one folder only lists the folders sharing that prefix.
    async fn list_folders(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let base = self.base_dir();
        let list_path = match (prefix.is_empty(), base.is_empty()) {
            (true, true) => "/".to_string(),
            (true, false) => base,
            (false, _) => format!("{base}{prefix}"),
        };
        let entries = match self.op.list(&list_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(map_error("list_folders", &list_path, e)),
        };

        let keys: Vec<String> = entries
            .iter()
            .filter(|entry| entry.metadata().is_dir() && entry.path() != list_path)
            .map(|entry| entry.name().trim_end_matches('/').to_string())
            .filter(|name| !name.is_empty() && name.starts_with(prefix))
            .collect();
        trace!(prefix, path = %list_path, count = keys.len(), "Listed bucket folders");
        Ok(keys)
    }

    async fn list_files(&self, folder_key: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let dir = self.folder_dir(folder_key);
        let entries = self
            .op
            .list(&dir)
            .await
            .map_err(|e| map_error("list_files", &dir, e))?;

        let files: Vec<ObjectEntry> = entries
            .iter()
            .filter(|entry| entry.metadata().is_file())
            .map(|entry| {
                let size = entry.metadata().content_length();
                ObjectEntry::new(entry.name(), (size > 0).then_some(size))
            })
            .collect();

        // Object stores have no empty folders; a listing with nothing in it
        // means the folder is gone.
        if files.is_empty() && entries.iter().all(|entry| entry.path() == dir) {
            return Err(StorageError::not_found(dir));
        }
        Ok(files)
    }

    async fn download(&self, folder_key: &str, filename: &str) -> Result<Bytes, StorageError> {
        let path = format!("{}{}", self.folder_dir(folder_key), filename);
        let buffer = self
            .op
            .read(&path)
            .await
            .map_err(|e| map_error("download", &path, e))?;
        Ok(buffer.to_bytes())
    }
}
