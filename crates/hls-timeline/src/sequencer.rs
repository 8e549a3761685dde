//! Gap-aware walk over the bucket timeline.
//!
//! A [`StreamSequencer`] owns its cursor and folder index. Each call to
//! [`StreamSequencer::next_clip`] examines buckets from the cursor onward
//! until it can return a clip, has to wait for data (continuous mode) or
//! runs off the end of the range (bounded mode).
//!
//! Folder-level problems never fail a call: missing folders, missing or
//! broken manifests and missing segment files all become skips. Only storage
//! outages and range-level conditions surface as errors, and an outage
//! leaves the cursor where it was so the next call retries the same bucket.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::assembler::{ClipAssembler, ClipDescriptor};
use crate::clock::{Clock, SystemClock};
use crate::config::{DegradedPolicy, SequencerConfig, StreamMode};
use crate::error::{AssemblyError, SequencerError, StorageError};
use crate::events::{EventSink, SequencerEvent, SkipReason};
use crate::gateway::{ObjectEntry, ObjectStoreGateway};
use crate::index::FolderIndex;
use crate::time::TimeBucket;
use crate::validator::{PlaylistValidator, ValidationVerdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerState {
    Idle,
    Seeking,
    Emitting,
    /// Bounded mode ran past its end.
    Exhausted,
}

/// Progress of one sequencer. Consumed keys only ever grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequencerCursor {
    pub last_returned_bucket_end: Option<i64>,
    /// `None` in continuous mode.
    pub range_end: Option<i64>,
    pub consumed_folder_keys: BTreeSet<String>,
    /// Start of the next bucket to examine.
    pub position: i64,
    pub emitted: u64,
    pub no_data_raised: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NextClip {
    Clip(Box<ClipDescriptor>),
    /// Continuous mode only: nothing to return yet; poll again later.
    Pending { folder_key: String },
    /// Bounded mode finished.
    EndOfRange,
}

impl NextClip {
    pub fn into_clip(self) -> Option<ClipDescriptor> {
        match self {
            Self::Clip(clip) => Some(*clip),
            _ => None,
        }
    }
}

/// What inspecting a present bucket produced.
enum Inspection {
    Usable {
        clip: ClipDescriptor,
        extra_files: BTreeSet<String>,
        degenerate_segments: usize,
    },
    Skip(SkipReason),
}

pub struct StreamSequencer {
    gateway: Arc<dyn ObjectStoreGateway>,
    clock: Arc<dyn Clock>,
    config: SequencerConfig,
    mode: StreamMode,
    start_epoch: i64,
    index: FolderIndex,
    validator: PlaylistValidator,
    cursor: SequencerCursor,
    state: SequencerState,
    events: EventSink,
    primed: bool,
}

impl StreamSequencer {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        start_epoch: i64,
        mode: StreamMode,
        config: SequencerConfig,
    ) -> Result<Self, SequencerError> {
        if let StreamMode::Bounded { end } = mode
            && end < start_epoch
        {
            return Err(SequencerError::InvalidRange {
                start: start_epoch,
                end,
            });
        }

        let index = FolderIndex::new(
            gateway.clone(),
            start_epoch,
            mode.range_end(),
            config.bucket_width,
        )?;

        Ok(Self {
            gateway,
            clock: Arc::new(SystemClock),
            validator: PlaylistValidator::new(config.manifest_name.clone()),
            config,
            mode,
            start_epoch,
            index,
            cursor: SequencerCursor {
                last_returned_bucket_end: None,
                range_end: mode.range_end(),
                consumed_folder_keys: BTreeSet::new(),
                position: start_epoch,
                emitted: 0,
                no_data_raised: false,
            },
            state: SequencerState::Idle,
            events: EventSink::default(),
            primed: false,
        })
    }

    pub fn bounded(
        gateway: Arc<dyn ObjectStoreGateway>,
        start_epoch: i64,
        end_epoch: i64,
        config: SequencerConfig,
    ) -> Result<Self, SequencerError> {
        Self::new(
            gateway,
            start_epoch,
            StreamMode::Bounded { end: end_epoch },
            config,
        )
    }

    pub fn continuous(
        gateway: Arc<dyn ObjectStoreGateway>,
        start_epoch: i64,
        config: SequencerConfig,
    ) -> Result<Self, SequencerError> {
        Self::new(gateway, start_epoch, StreamMode::Continuous, config)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, tx: mpsc::Sender<SequencerEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn cursor(&self) -> &SequencerCursor {
        &self.cursor
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn index(&self) -> &FolderIndex {
        &self.index
    }

    /// Returns the next playable clip, or why there is none right now.
    pub async fn next_clip(&mut self) -> Result<NextClip, SequencerError> {
        if !self.mode.is_continuous() && self.config.prime_listing && !self.primed {
            self.index.prime().await?;
            self.primed = true;
        }
        if self.state != SequencerState::Exhausted {
            self.state = SequencerState::Seeking;
        }

        let now = self.clock.now_epoch();
        let mut examined = 0usize;

        loop {
            if let Some(end) = self.cursor.range_end
                && self.cursor.position >= end
            {
                return self.exhaust(end);
            }

            let bucket = TimeBucket::containing(self.cursor.position, self.config.bucket_width)?;

            if self.cursor.consumed_folder_keys.contains(&bucket.folder_key) {
                self.cursor.position = bucket.end_epoch;
                continue;
            }

            let continuous = self.mode.is_continuous();
            if continuous && (examined >= self.config.scan_budget || now < bucket.start_epoch) {
                return Ok(self.pending(&bucket));
            }
            examined += 1;

            let settled = !continuous
                || now >= bucket.end_epoch.saturating_add(self.config.settle_secs());

            match self.inspect(&bucket).await? {
                Inspection::Usable {
                    clip,
                    extra_files,
                    degenerate_segments,
                } => {
                    if !settled && !clip.end_of_stream {
                        debug!(folder_key = %bucket.folder_key, "Bucket still open, waiting for end of stream");
                        return Ok(self.pending(&bucket));
                    }
                    return Ok(self.emit(clip, extra_files, degenerate_segments));
                }
                Inspection::Skip(reason) => {
                    if !settled {
                        self.index.forget(&bucket.folder_key);
                        debug!(
                            folder_key = %bucket.folder_key,
                            ?reason,
                            "Bucket not settled yet, will check again"
                        );
                        return Ok(self.pending(&bucket));
                    }
                    self.skip(bucket, reason);
                }
            }
        }
    }

    async fn inspect(&mut self, bucket: &TimeBucket) -> Result<Inspection, SequencerError> {
        if !self.index.probe(bucket).await? {
            return Ok(Inspection::Skip(SkipReason::Absent));
        }

        let listing = match self.gateway.list_files(&bucket.folder_key).await {
            Ok(listing) => listing,
            Err(e) if e.is_not_found() => {
                self.index.forget(&bucket.folder_key);
                return Ok(Inspection::Skip(SkipReason::FolderVanished));
            }
            Err(e) => return Err(e.into()),
        };

        let manifest_name = self.validator.manifest_name();
        if !listing.iter().any(|entry| entry.name == manifest_name) {
            return Ok(Inspection::Skip(SkipReason::ManifestMissing));
        }

        let raw = match self
            .gateway
            .download(&bucket.folder_key, manifest_name)
            .await
        {
            Ok(raw) => raw,
            Err(StorageError::NotFound { .. }) => {
                return Ok(Inspection::Skip(SkipReason::ManifestMissing));
            }
            Err(e) => return Err(e.into()),
        };

        self.evaluate(bucket, &raw, &listing)
    }

    fn evaluate(
        &self,
        bucket: &TimeBucket,
        raw: &[u8],
        listing: &[ObjectEntry],
    ) -> Result<Inspection, SequencerError> {
        let validation = self
            .validator
            .validate(raw, listing.iter().map(|entry| entry.name.as_str()));

        let extra_files = match validation.verdict {
            ValidationVerdict::Complete => BTreeSet::new(),
            ValidationVerdict::ExtraFiles(files) => files,
            ValidationVerdict::MissingFiles(files) => {
                return Ok(Inspection::Skip(SkipReason::MissingFiles { files }));
            }
            ValidationVerdict::Malformed(detail) => {
                return Ok(Inspection::Skip(SkipReason::Malformed { detail }));
            }
        };
        let Some(manifest) = validation.manifest else {
            return Ok(Inspection::Skip(SkipReason::Malformed {
                detail: "manifest unavailable".to_string(),
            }));
        };

        let degenerate_segments = manifest.degenerate_segments();
        if degenerate_segments > 0 && self.config.degraded_policy == DegradedPolicy::Skip {
            return Ok(Inspection::Skip(SkipReason::Degraded {
                segments: degenerate_segments,
            }));
        }

        match ClipAssembler::assemble(bucket, &manifest, listing) {
            Ok(clip) => Ok(Inspection::Usable {
                clip,
                extra_files,
                degenerate_segments,
            }),
            Err(e @ AssemblyError::SequenceTie { .. }) => {
                Ok(Inspection::Skip(SkipReason::SequenceTie {
                    detail: e.to_string(),
                }))
            }
            Err(AssemblyError::ClipName(e)) => Err(e.into()),
        }
    }

    fn emit(
        &mut self,
        clip: ClipDescriptor,
        extra_files: BTreeSet<String>,
        degenerate_segments: usize,
    ) -> NextClip {
        let bucket = &clip.bucket;
        if !extra_files.is_empty() {
            warn!(
                folder_key = %bucket.folder_key,
                files = ?extra_files,
                "Ignoring files not declared in the manifest"
            );
            self.events.emit(SequencerEvent::ExtraFilesIgnored {
                bucket: bucket.clone(),
                files: extra_files,
            });
        }
        if degenerate_segments > 0 {
            warn!(
                folder_key = %bucket.folder_key,
                degenerate_segments, "Emitting clip with zero-duration segments"
            );
            self.events.emit(SequencerEvent::DegradedClip {
                bucket: bucket.clone(),
                degenerate_segments,
            });
        }

        self.cursor
            .consumed_folder_keys
            .insert(bucket.folder_key.clone());
        self.cursor.position = bucket.end_epoch;
        self.cursor.last_returned_bucket_end = Some(bucket.end_epoch);
        self.cursor.emitted += 1;
        self.state = SequencerState::Emitting;

        info!(
            folder_key = %bucket.folder_key,
            clip_name = %clip.clip_name,
            segments = clip.segments.len(),
            duration = clip.total_duration,
            complete = clip.is_complete,
            "Emitting clip"
        );
        self.events
            .emit(SequencerEvent::ClipEmitted(Box::new(clip.clone())));
        NextClip::Clip(Box::new(clip))
    }

    fn skip(&mut self, bucket: TimeBucket, reason: SkipReason) {
        match &reason {
            SkipReason::Absent => {
                debug!(folder_key = %bucket.folder_key, "No folder for bucket, skipping")
            }
            reason => warn!(folder_key = %bucket.folder_key, ?reason, "Skipping bucket"),
        }
        self.cursor.position = bucket.end_epoch;
        self.events
            .emit(SequencerEvent::BucketSkipped { bucket, reason });
    }

    fn pending(&self, bucket: &TimeBucket) -> NextClip {
        NextClip::Pending {
            folder_key: bucket.folder_key.clone(),
        }
    }

    fn exhaust(&mut self, end: i64) -> Result<NextClip, SequencerError> {
        self.state = SequencerState::Exhausted;
        if self.cursor.emitted == 0 && !self.cursor.no_data_raised {
            self.cursor.no_data_raised = true;
            warn!(
                start = self.start_epoch,
                end, "No usable data in requested range"
            );
            self.events.emit(SequencerEvent::NoDataAvailable {
                start: self.start_epoch,
                end,
            });
            return Err(SequencerError::NoDataAvailable {
                start: self.start_epoch,
                end,
            });
        }
        Ok(NextClip::EndOfRange)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::{GatewayOp, MemoryGateway};

    const PLAYLIST: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\na.ts\n#EXTINF:10.0,\nb.ts\n#EXT-X-ENDLIST\n";

    fn config() -> SequencerConfig {
        SequencerConfig::default().with_bucket_width(60)
    }

    fn complete_bucket(gateway: &MemoryGateway, key: &str) {
        gateway.put_file(key, "live.m3u8", PLAYLIST);
        gateway.put_file(key, "a.ts", "aaaa");
        gateway.put_file(key, "b.ts", "bb");
    }

    #[test]
    fn rejects_inverted_range() {
        let gateway = Arc::new(MemoryGateway::new());
        let result = StreamSequencer::bounded(gateway, 120, 60, config());
        assert!(matches!(
            result,
            Err(SequencerError::InvalidRange { start: 120, end: 60 })
        ));
    }

    #[test]
    fn rejects_negative_start() {
        let gateway = Arc::new(MemoryGateway::new());
        let result = StreamSequencer::continuous(gateway, -5, config());
        assert!(matches!(result, Err(SequencerError::InvalidTimestamp(_))));
    }

    #[tokio::test]
    async fn cursor_tracks_emitted_bucket() {
        let gateway = Arc::new(MemoryGateway::new());
        complete_bucket(&gateway, "0000000060");
        let mut seq = StreamSequencer::bounded(gateway.clone(), 0, 120, config()).unwrap();
        assert_eq!(seq.state(), SequencerState::Idle);

        let clip = seq.next_clip().await.unwrap().into_clip().unwrap();
        assert_eq!(clip.folder_key(), "0000000060");
        assert_eq!(clip.segments[0].byte_size, Some(4));
        assert_eq!(clip.byte_size(), Some(6));
        assert_eq!(seq.state(), SequencerState::Emitting);

        let cursor = seq.cursor();
        assert_eq!(cursor.position, 120);
        assert_eq!(cursor.last_returned_bucket_end, Some(120));
        assert!(cursor.consumed_folder_keys.contains("0000000060"));

        assert_eq!(seq.next_clip().await.unwrap(), NextClip::EndOfRange);
        assert_eq!(seq.state(), SequencerState::Exhausted);
    }

    #[tokio::test]
    async fn storage_outage_leaves_cursor_in_place() {
        let gateway = Arc::new(MemoryGateway::new());
        complete_bucket(&gateway, "0000000000");
        gateway.fail_next(GatewayOp::Download, 1);
        let mut seq = StreamSequencer::bounded(gateway.clone(), 0, 60, config()).unwrap();

        let err = seq.next_clip().await.unwrap_err();
        assert!(err.is_storage_unavailable());
        assert_eq!(seq.cursor().position, 0);

        let clip = seq.next_clip().await.unwrap().into_clip().unwrap();
        assert_eq!(clip.folder_key(), "0000000000");
        // Presence was cached by the first attempt.
        assert_eq!(gateway.calls(GatewayOp::ListFolders), 1);
    }

    #[tokio::test]
    async fn degraded_policy_controls_zero_duration_buckets() {
        let playlist = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:0,\na.ts\n#EXT-X-ENDLIST\n";
        let gateway = Arc::new(MemoryGateway::new());
        gateway.put_file("0000000000", "live.m3u8", playlist);
        gateway.put_file("0000000000", "a.ts", "a");

        let mut seq = StreamSequencer::bounded(gateway.clone(), 0, 60, config()).unwrap();
        let clip = seq.next_clip().await.unwrap().into_clip().unwrap();
        assert!(!clip.is_complete);

        let skip = config().with_degraded_policy(DegradedPolicy::Skip);
        let mut seq = StreamSequencer::bounded(gateway, 0, 60, skip).unwrap();
        assert!(matches!(
            seq.next_clip().await,
            Err(SequencerError::NoDataAvailable { .. })
        ));
    }

    #[tokio::test]
    async fn continuous_waits_for_open_bucket() {
        let open = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\na.ts\n";
        let gateway = Arc::new(MemoryGateway::new());
        gateway.put_file("0000000000", "live.m3u8", open);
        gateway.put_file("0000000000", "a.ts", "a");
        let clock = Arc::new(ManualClock::new(50));
        let mut seq = StreamSequencer::continuous(gateway.clone(), 0, config())
            .unwrap()
            .with_clock(clock.clone());

        assert_eq!(
            seq.next_clip().await.unwrap(),
            NextClip::Pending {
                folder_key: "0000000000".to_string()
            }
        );

        // Past the bucket end plus the settle delay the open playlist is final.
        clock.set(60 + 30);
        let clip = seq.next_clip().await.unwrap().into_clip().unwrap();
        assert!(!clip.end_of_stream);

        assert_eq!(
            seq.next_clip().await.unwrap(),
            NextClip::Pending {
                folder_key: "0000000060".to_string()
            }
        );
    }

    #[tokio::test]
    async fn continuous_scan_budget_bounds_one_call() {
        let gateway = Arc::new(MemoryGateway::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cfg = SequencerConfig {
            scan_budget: 4,
            ..config()
        };
        let mut seq = StreamSequencer::continuous(gateway.clone(), 0, cfg)
            .unwrap()
            .with_clock(clock);

        assert!(matches!(
            seq.next_clip().await.unwrap(),
            NextClip::Pending { .. }
        ));
        assert_eq!(gateway.calls(GatewayOp::ListFolders), 4);
        assert_eq!(seq.cursor().position, 240);
    }

    #[tokio::test]
    async fn events_report_skips_and_clips() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.put_file("0000000000", "live.m3u8", "garbage");
        complete_bucket(&gateway, "0000000060");
        gateway.put_file("0000000060", "stray.ts", "x");
        let (tx, mut rx) = mpsc::channel(16);
        let mut seq = StreamSequencer::bounded(gateway, 0, 120, config())
            .unwrap()
            .with_events(tx);

        seq.next_clip().await.unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(SequencerEvent::BucketSkipped {
                reason: SkipReason::Malformed { .. },
                ..
            })
        ));
        match rx.recv().await {
            Some(SequencerEvent::ExtraFilesIgnored { files, .. }) => {
                assert!(files.contains("stray.ts"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(matches!(
            rx.recv().await,
            Some(SequencerEvent::ClipEmitted(_))
        ));
    }

    #[tokio::test]
    async fn full_event_channel_never_blocks() {
        let gateway = Arc::new(MemoryGateway::new());
        let (tx, _rx) = mpsc::channel(1);
        let mut seq = StreamSequencer::bounded(gateway, 0, 600, config())
            .unwrap()
            .with_events(tx);
        assert!(seq.next_clip().await.is_err());
        assert_eq!(seq.next_clip().await.unwrap(), NextClip::EndOfRange);
    }
}
