use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::assembler::ClipDescriptor;
use crate::error::SequencerError;
use crate::retry::RetryPolicy;
use crate::sequencer::{NextClip, StreamSequencer};

/// Drives a [`StreamSequencer`]: waits out `Pending`, backs off on storage
/// outages and stops on cancellation.
pub struct ClipFollower {
    sequencer: StreamSequencer,
    poll_interval: Duration,
    retry: RetryPolicy,
    token: CancellationToken,
}

impl ClipFollower {
    pub fn new(
        sequencer: StreamSequencer,
        poll_interval: Duration,
        retry: RetryPolicy,
        token: CancellationToken,
    ) -> Self {
        Self {
            sequencer,
            poll_interval,
            retry,
            token,
        }
    }

    pub fn sequencer(&self) -> &StreamSequencer {
        &self.sequencer
    }

    pub fn into_inner(self) -> StreamSequencer {
        self.sequencer
    }

    /// The next clip, or `None` once a bounded range is done.
    ///
    /// Gives up after `max_retries` consecutive storage outages.
    pub async fn next(&mut self) -> Result<Option<ClipDescriptor>, SequencerError> {
        let mut failures = 0u32;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Err(SequencerError::Cancelled),
                result = self.sequencer.next_clip() => result,
            };

            let delay = match result {
                Ok(NextClip::Clip(clip)) => return Ok(Some(*clip)),
                Ok(NextClip::EndOfRange) => return Ok(None),
                Ok(NextClip::Pending { folder_key }) => {
                    failures = 0;
                    debug!(%folder_key, interval = ?self.poll_interval, "Waiting for data");
                    self.poll_interval
                }
                Err(e) if e.is_storage_unavailable() => {
                    if failures >= self.retry.max_retries {
                        return Err(e);
                    }
                    let delay = self.retry.delay_for_attempt(failures);
                    failures += 1;
                    warn!(
                        attempt = failures,
                        max = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Storage unavailable, backing off"
                    );
                    delay
                }
                Err(e) => return Err(e),
            };

            tokio::select! {
                _ = self.token.cancelled() => return Err(SequencerError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
