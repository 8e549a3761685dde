use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bucket manifest file name.
pub const DEFAULT_MANIFEST_NAME: &str = "live.m3u8";

/// Default bucket width: one folder per hour.
pub const DEFAULT_BUCKET_WIDTH: i64 = 3600;

/// What to do with a bucket whose manifest declares zero-duration segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedPolicy {
    /// Emit the clip with `is_complete = false`.
    #[default]
    Emit,
    /// Treat the bucket as a gap.
    Skip,
}

/// Whether the sequencer walks a fixed range or follows the live edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// Stop at `end` (exclusive, epoch seconds).
    Bounded { end: i64 },
    /// Walk forward indefinitely.
    Continuous,
}

impl StreamMode {
    pub fn range_end(&self) -> Option<i64> {
        match self {
            Self::Bounded { end } => Some(*end),
            Self::Continuous => None,
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous)
    }
}

#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// Width of a bucket folder in seconds
    pub bucket_width: i64,
    /// Manifest file expected in every bucket folder
    pub manifest_name: String,
    /// How long after a bucket's window ends data may still be arriving.
    /// Only consulted in continuous mode.
    pub settle_delay: Duration,
    pub degraded_policy: DegradedPolicy,
    /// List all folders once up front instead of probing bucket by bucket.
    /// Ignored in continuous mode.
    pub prime_listing: bool,
    /// Maximum buckets examined by a single continuous-mode call
    pub scan_budget: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            bucket_width: DEFAULT_BUCKET_WIDTH,
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            settle_delay: Duration::from_secs(30),
            degraded_policy: DegradedPolicy::default(),
            prime_listing: false,
            scan_budget: 512,
        }
    }
}

impl SequencerConfig {
    pub fn with_bucket_width(mut self, bucket_width: i64) -> Self {
        self.bucket_width = bucket_width;
        self
    }

    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn with_degraded_policy(mut self, policy: DegradedPolicy) -> Self {
        self.degraded_policy = policy;
        self
    }

    pub fn with_prime_listing(mut self, prime: bool) -> Self {
        self.prime_listing = prime;
        self
    }

    /// Settle delay in whole seconds, saturating.
    pub(crate) fn settle_secs(&self) -> i64 {
        i64::try_from(self.settle_delay.as_secs()).unwrap_or(i64::MAX)
    }
}
