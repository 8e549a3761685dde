use std::collections::BTreeSet;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;

use crate::assembler::ClipDescriptor;
use crate::time::TimeBucket;

/// Why a bucket was passed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// No folder for the bucket
    Absent,
    /// Folder was listed but disappeared before it could be read
    FolderVanished,
    /// Folder has no manifest file
    ManifestMissing,
    Malformed { detail: String },
    MissingFiles { files: BTreeSet<String> },
    /// Two segments claim the same position
    SequenceTie { detail: String },
    /// Zero-duration segments under `DegradedPolicy::Skip`
    Degraded { segments: usize },
}

#[derive(Debug, Clone)]
pub enum SequencerEvent {
    BucketSkipped {
        bucket: TimeBucket,
        reason: SkipReason,
    },
    ExtraFilesIgnored {
        bucket: TimeBucket,
        files: BTreeSet<String>,
    },
    DegradedClip {
        bucket: TimeBucket,
        degenerate_segments: usize,
    },
    ClipEmitted(Box<ClipDescriptor>),
    NoDataAvailable {
        start: i64,
        end: i64,
    },
}

/// Best-effort event sink; never blocks the sequencer.
#[derive(Debug, Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<SequencerEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: mpsc::Sender<SequencerEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub(crate) fn emit(&self, event: SequencerEvent) {
        if let Some(tx) = &self.tx
            && let Err(e) = tx.try_send(event)
        {
            trace!("Dropped sequencer event: {e}");
        }
    }
}
