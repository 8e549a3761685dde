//! Gap-aware reconstruction of HLS audio timelines from object storage.
//!
//! Recordings are stored as one folder per fixed-width time bucket, each
//! holding a media playlist and the segment files it declares. Folders may be
//! missing, half uploaded or broken. This crate answers one question, over and
//! over: what is the next valid clip, and where does its data live.
//!
//! ## Core Types
//!
//! - [`StreamSequencer`] - Walks a bounded range or follows the live edge
//! - [`FolderIndex`] - Candidate buckets and cached presence checks
//! - [`PlaylistValidator`] - Manifest versus folder contents
//! - [`ClipAssembler`] / [`ClipDescriptor`] - Ordered segments of one bucket
//! - [`ObjectStoreGateway`] - The storage seam; [`MemoryGateway`] for tests
//!
//! ## Helpers
//!
//! - [`ClipFollower`] - Polling and backoff around a sequencer
//! - [`ClipFetcher`] - Segment download and byte-wise concatenation
//! - [`time`] - Folder keys and clip names

pub mod assembler;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod follow;
pub mod gateway;
pub mod index;
pub mod playlist;
pub mod retry;
pub mod sequencer;
pub mod time;
pub mod validator;

pub use assembler::{ClipAssembler, ClipDescriptor};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DegradedPolicy, SequencerConfig, StreamMode};
pub use error::{
    AssemblyError, FetchError, ManifestError, SequencerError, StorageError, TimeError,
};
pub use events::{SequencerEvent, SkipReason};
pub use fetch::{ClipFetcher, FetchSummary};
pub use follow::ClipFollower;
pub use gateway::{GatewayOp, MemoryGateway, ObjectEntry, ObjectStoreGateway};
pub use index::{Buckets, FolderIndex};
pub use playlist::{PlaylistManifest, SegmentRef};
pub use retry::{RetryAction, RetryPolicy, retry_with_backoff};
pub use sequencer::{NextClip, SequencerCursor, SequencerState, StreamSequencer};
pub use time::TimeBucket;
pub use validator::{PlaylistValidator, Validation, ValidationVerdict};
