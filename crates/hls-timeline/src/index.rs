//! Bucket enumeration and presence checks over the object store.
//!
//! The index never trusts listing order: candidates are generated from the
//! range itself and the gateway is only asked whether a given key exists.
//! Answers are cached per index instance, so a folder probed once is never
//! listed again unless the caller explicitly forgets it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{StorageError, TimeError};
use crate::gateway::ObjectStoreGateway;
use crate::time::{TimeBucket, epoch_to_folder_key, folder_key_to_epoch};

/// Ascending run of candidate buckets, stopping before `end` if there is one.
#[derive(Debug, Clone)]
pub struct Buckets {
    next: Option<TimeBucket>,
    end: Option<i64>,
}

impl Iterator for Buckets {
    type Item = TimeBucket;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        if self.end.is_some_and(|end| current.start_epoch >= end) {
            return None;
        }
        // Stops quietly if the following bucket would overflow.
        self.next = current.next().ok();
        Some(current)
    }
}

pub struct FolderIndex {
    gateway: Arc<dyn ObjectStoreGateway>,
    start_epoch: i64,
    end_epoch: Option<i64>,
    bucket_width: i64,
    presence: HashMap<String, bool>,
    unaligned: Vec<String>,
}

impl FolderIndex {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        start_epoch: i64,
        end_epoch: Option<i64>,
        bucket_width: i64,
    ) -> Result<Self, TimeError> {
        // Validates both the start and the width.
        TimeBucket::containing(start_epoch, bucket_width)?;
        Ok(Self {
            gateway,
            start_epoch,
            end_epoch,
            bucket_width,
            presence: HashMap::new(),
            unaligned: Vec::new(),
        })
    }

    pub fn bucket_width(&self) -> i64 {
        self.bucket_width
    }

    pub fn is_bounded(&self) -> bool {
        self.end_epoch.is_some()
    }

    /// All candidate buckets of the range, starting with the one containing
    /// the range start.
    pub fn buckets(&self) -> Buckets {
        self.buckets_at(self.start_epoch)
    }

    /// Candidate buckets from the one containing `epoch`, clamped to the
    /// range start.
    pub fn buckets_from(&self, epoch: i64) -> Result<Buckets, TimeError> {
        if epoch < 0 {
            return Err(TimeError::invalid_timestamp(epoch, "negative epoch"));
        }
        Ok(self.buckets_at(epoch.max(self.start_epoch)))
    }

    fn buckets_at(&self, epoch: i64) -> Buckets {
        let empty = self.end_epoch.is_some_and(|end| epoch >= end);
        Buckets {
            next: if empty {
                None
            } else {
                TimeBucket::containing(epoch, self.bucket_width).ok()
            },
            end: self.end_epoch,
        }
    }

    /// Whether the bucket's folder exists. Only positive and negative answers
    /// are cached; transient failures are returned as-is.
    pub async fn probe(&mut self, bucket: &TimeBucket) -> Result<bool, StorageError> {
        if let Some(&present) = self.presence.get(&bucket.folder_key) {
            return Ok(present);
        }

        let present = match self.gateway.list_folders(&bucket.folder_key).await {
            Ok(keys) => keys
                .iter()
                .any(|key| normalize_key(key) == bucket.folder_key),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };
        debug!(folder_key = %bucket.folder_key, present, "Probed bucket folder");
        self.presence.insert(bucket.folder_key.clone(), present);
        Ok(present)
    }

    pub fn cached(&self, folder_key: &str) -> Option<bool> {
        self.presence.get(folder_key).copied()
    }

    /// Drops the cached answer for `folder_key` so the next probe asks the
    /// gateway again.
    pub fn forget(&mut self, folder_key: &str) -> Option<bool> {
        self.presence.remove(folder_key)
    }

    /// Lists every folder once and records presence for the whole bounded
    /// range. Returns the number of buckets found present. Does nothing for
    /// an open-ended range.
    pub async fn prime(&mut self) -> Result<usize, StorageError> {
        if !self.is_bounded() {
            debug!("Skipping listing prime for an open-ended range");
            return Ok(0);
        }

        let mut listed = HashSet::new();
        self.unaligned.clear();
        for key in self.gateway.list_folders("").await? {
            match canonical_key(&key, self.bucket_width) {
                Some(canonical) => {
                    listed.insert(canonical);
                }
                None if folder_key_to_epoch(normalize_key(&key)).is_ok() => {
                    self.unaligned.push(normalize_key(&key).to_string());
                }
                None => {}
            }
        }
        if !self.unaligned.is_empty() {
            warn!(
                count = self.unaligned.len(),
                bucket_width = self.bucket_width,
                example = %self.unaligned[0],
                "Listed folders are not aligned to the bucket width and were ignored"
            );
        }

        let mut present = 0;
        for bucket in self.buckets() {
            let found = listed.contains(&bucket.folder_key);
            present += usize::from(found);
            self.presence.insert(bucket.folder_key, found);
        }
        debug!(
            listed = listed.len(),
            present, "Primed folder index from full listing"
        );
        Ok(present)
    }

    /// Numeric folder keys seen by the last [`prime`](Self::prime) that do
    /// not start a bucket of this width.
    pub fn unaligned_keys(&self) -> &[String] {
        &self.unaligned
    }

    /// Every bucket of a bounded range with its presence, in chronological
    /// order. Empty for an open-ended range.
    pub async fn entries(&mut self) -> Result<Vec<(TimeBucket, bool)>, StorageError> {
        if !self.is_bounded() {
            return Ok(Vec::new());
        }
        let buckets: Vec<TimeBucket> = self.buckets().collect();
        let mut entries = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let present = self.probe(&bucket).await?;
            entries.push((bucket, present));
        }
        Ok(entries)
    }
}

fn normalize_key(key: &str) -> &str {
    key.trim_end_matches('/')
}

/// Padded folder key for a listed name, when it is one we generate. Keys
/// that are not aligned to the bucket width are not buckets of this index.
fn canonical_key(key: &str, bucket_width: i64) -> Option<String> {
    let epoch = folder_key_to_epoch(normalize_key(key)).ok()?;
    let canonical = epoch_to_folder_key(epoch, bucket_width).ok()?;
    (folder_key_to_epoch(&canonical).ok()? == epoch).then_some(canonical)
}
