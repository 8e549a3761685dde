use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::assembler::ClipDescriptor;
use crate::error::FetchError;
use crate::gateway::ObjectStoreGateway;
use crate::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// What [`ClipFetcher::write_concatenated`] managed to write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchSummary {
    pub segments_written: usize,
    pub bytes_written: u64,
    /// Segments that disappeared from the store before they could be read.
    pub skipped: Vec<String>,
}

/// Downloads clip segments and hands their bytes on in playback order.
pub struct ClipFetcher {
    gateway: Arc<dyn ObjectStoreGateway>,
    retry: RetryPolicy,
    token: CancellationToken,
}

impl ClipFetcher {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        retry: RetryPolicy,
        token: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            retry,
            token,
        }
    }

    /// Downloads one object, retrying transient failures. `None` if it is gone.
    pub async fn fetch(&self, folder_key: &str, filename: &str) -> Result<Option<Bytes>, FetchError> {
        let gateway = &self.gateway;
        let result = retry_with_backoff(&self.retry, &self.token, |_| async move {
            match gateway.download(folder_key, filename).await {
                Ok(data) => RetryAction::Success(data),
                Err(e) if e.is_retryable() => RetryAction::Retry(FetchError::from(e)),
                Err(e) => RetryAction::Fail(FetchError::from(e)),
            }
        })
        .await;

        match result {
            Ok(data) => Ok(Some(data)),
            Err(FetchError::Storage { source }) if source.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Writes the clip's segments back to back into `writer`. MPEG-TS
    /// segments concatenate into a playable stream without remuxing.
    pub async fn write_concatenated<W>(
        &self,
        clip: &ClipDescriptor,
        writer: &mut W,
    ) -> Result<FetchSummary, FetchError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut summary = FetchSummary::default();
        for segment in &clip.segments {
            let Some(data) = self.fetch(clip.folder_key(), &segment.filename).await? else {
                warn!(
                    folder_key = %clip.folder_key(),
                    segment = %segment.filename,
                    "Segment vanished before download, skipping"
                );
                summary.skipped.push(segment.filename.clone());
                continue;
            };
            writer.write_all(&data).await?;
            summary.segments_written += 1;
            summary.bytes_written += data.len() as u64;
        }
        writer.flush().await?;

        debug!(
            clip = %clip.clip_name,
            segments = summary.segments_written,
            bytes = summary.bytes_written,
            skipped = summary.skipped.len(),
            "Wrote clip"
        );
        Ok(summary)
    }
}
