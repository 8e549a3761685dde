use crate::{
    cli::OutputFormat,
    config::AppConfig,
    error::{AppError, Result},
    output::OutputManager,
};
use hls_timeline::{
    ClipDescriptor, ClipFetcher, ClipFollower, FetchError, FetchSummary, FolderIndex,
    ObjectStoreGateway, PlaylistValidator, SequencerError, SequencerEvent, StreamSequencer,
    time::{folder_key_to_epoch, parse_time, readable_clip_name},
};
use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};
use timeline_storage::{OpendalGateway, create_operator};
use tokio::{io::BufWriter, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct CommandExecutor {
    config: AppConfig,
    gateway: Arc<dyn ObjectStoreGateway>,
    token: CancellationToken,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, token: CancellationToken) -> Result<Self> {
        let op = create_operator(&config.storage)?;
        let gateway = Arc::new(OpendalGateway::new(op, config.stream.prefix.as_str()));
        Ok(Self::with_gateway(config, gateway, token))
    }

    pub fn with_gateway(
        config: AppConfig,
        gateway: Arc<dyn ObjectStoreGateway>,
        token: CancellationToken,
    ) -> Self {
        Self {
            config,
            gateway,
            token,
        }
    }

    fn output(&self, format: OutputFormat) -> OutputManager {
        OutputManager::new(self.config.colored_output, format)
    }

    pub async fn scan<W: Write>(
        &self,
        out: &mut W,
        start: &str,
        end: &str,
        format: OutputFormat,
    ) -> Result<()> {
        let (start, end) = (parse_time(start)?, parse_time(end)?);
        if end < start {
            return Err(AppError::InvalidInput(format!(
                "end {end} is before start {start}"
            )));
        }

        let mut index = FolderIndex::new(
            self.gateway.clone(),
            start,
            Some(end),
            self.config.stream.bucket_width_secs,
        )?;
        if self.config.stream.prime_listing && index.prime().await? == 0 {
            check_alignment(&index)?;
        }
        let entries = index.entries().await?;

        let output = self.output(format);
        let mut present = 0;
        for (bucket, found) in &entries {
            present += usize::from(*found);
            writeln!(out, "{}", output.format_scan_entry(bucket, *found)?)?;
        }
        if let Some(summary) = output.format_scan_summary(entries.len(), present) {
            writeln!(out, "{summary}")?;
        }
        info!(buckets = entries.len(), present, "Scan complete");
        Ok(())
    }

    pub async fn verify<W: Write>(
        &self,
        out: &mut W,
        folder: &str,
        format: OutputFormat,
    ) -> Result<()> {
        folder_key_to_epoch(folder)?;

        let listing = match self.gateway.list_files(folder).await {
            Ok(listing) => listing,
            Err(e) if e.is_not_found() => {
                return Err(AppError::InvalidInput(format!("folder {folder} not found")));
            }
            Err(e) => return Err(e.into()),
        };

        let output = self.output(format);
        let manifest_name = &self.config.stream.manifest_name;
        if !listing.iter().any(|entry| entry.name == *manifest_name) {
            writeln!(out, "{}", output.format_missing_manifest(folder)?)?;
            return Ok(());
        }

        let raw = self.gateway.download(folder, manifest_name).await?;
        let validation = PlaylistValidator::new(manifest_name.clone())
            .validate(&raw, listing.iter().map(|entry| entry.name.as_str()));
        debug!(folder, verdict = ?validation.verdict, "Validated folder");
        writeln!(out, "{}", output.format_verdict(folder, &validation)?)?;
        Ok(())
    }

    pub async fn clips<W: Write>(
        &self,
        out: &mut W,
        start: &str,
        end: Option<&str>,
        output_dir: Option<&Path>,
        limit: Option<usize>,
        format: OutputFormat,
    ) -> Result<()> {
        let start = parse_time(start)?;
        let seq_config = self.config.stream.sequencer_config();
        let sequencer = match end {
            Some(end) => {
                StreamSequencer::bounded(self.gateway.clone(), start, parse_time(end)?, seq_config)?
            }
            None => StreamSequencer::continuous(self.gateway.clone(), start, seq_config)?,
        };
        let (tx, mut events) = mpsc::channel(64);
        let mut follower = ClipFollower::new(
            sequencer.with_events(tx),
            self.config.poll_interval(),
            self.config.retry.policy(),
            self.token.clone(),
        );

        let fetcher = match output_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                Some((
                    dir,
                    ClipFetcher::new(
                        self.gateway.clone(),
                        self.config.retry.policy(),
                        self.token.clone(),
                    ),
                ))
            }
            None => None,
        };

        let output = self.output(format);
        let mut count = 0usize;
        while limit.is_none_or(|limit| count < limit) {
            let next = follower.next().await;
            while let Ok(event) = events.try_recv() {
                log_event(&event);
            }

            let clip = match next {
                Ok(Some(clip)) => clip,
                Ok(None) => break,
                Err(SequencerError::Cancelled) => {
                    info!("Interrupted");
                    break;
                }
                Err(e @ SequencerError::NoDataAvailable { .. }) => {
                    check_alignment(follower.sequencer().index())?;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            };

            let written = match &fetcher {
                Some((dir, fetcher)) => match self.write_clip(fetcher, dir, &clip).await {
                    Ok(written) => Some(written),
                    Err(AppError::Fetch(FetchError::Cancelled)) => {
                        info!("Interrupted while writing {}", clip.clip_name);
                        break;
                    }
                    Err(e) => return Err(e),
                },
                None => None,
            };
            let written = written
                .as_ref()
                .map(|(path, summary)| (path.as_path(), summary));
            writeln!(out, "{}", output.format_clip(&clip, written)?)?;
            count += 1;
        }

        info!(clips = count, "Finished");
        Ok(())
    }

    async fn write_clip(
        &self,
        fetcher: &ClipFetcher,
        dir: &Path,
        clip: &ClipDescriptor,
    ) -> Result<(PathBuf, FetchSummary)> {
        let (name, _) = readable_clip_name(&self.config.stream.source_id, clip.bucket.start_epoch)?;
        let path = dir.join(format!("{name}.ts"));
        let partial = dir.join(format!("{name}.ts.part"));

        let mut writer = BufWriter::new(tokio::fs::File::create(&partial).await?);
        let summary = match fetcher.write_concatenated(clip, &mut writer).await {
            Ok(summary) => summary,
            Err(e) => {
                drop(writer);
                if let Err(remove_err) = tokio::fs::remove_file(&partial).await {
                    warn!(path = %partial.display(), error = %remove_err, "Failed to remove partial clip");
                }
                return Err(e.into());
            }
        };
        drop(writer);
        tokio::fs::rename(&partial, &path).await?;
        Ok((path, summary))
    }
}

/// Turns an empty result into an explicit error when the listing only held
/// folders that do not line up with the configured bucket width.
fn check_alignment(index: &FolderIndex) -> Result<()> {
    match index.unaligned_keys() {
        [] => Ok(()),
        keys => Err(AppError::MisalignedArchive {
            bucket_width: index.bucket_width(),
            count: keys.len(),
            example: keys[0].clone(),
        }),
    }
}

fn log_event(event: &SequencerEvent) {
    match event {
        SequencerEvent::BucketSkipped { bucket, reason } => {
            debug!(folder_key = %bucket.folder_key, ?reason, "Skipped bucket");
        }
        SequencerEvent::ExtraFilesIgnored { bucket, files } => {
            debug!(folder_key = %bucket.folder_key, ?files, "Ignoring files outside the manifest");
        }
        SequencerEvent::DegradedClip {
            bucket,
            degenerate_segments,
        } => {
            warn!(
                folder_key = %bucket.folder_key,
                degenerate_segments,
                "Clip contains zero-duration segments"
            );
        }
        SequencerEvent::ClipEmitted(_) | SequencerEvent::NoDataAvailable { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use hls_timeline::{MemoryGateway, ObjectEntry, StorageError};

    fn playlist(files: &[&str]) -> String {
        let mut out = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:10\n");
        for file in files {
            out.push_str(&format!("#EXTINF:10.0,\n{file}\n"));
        }
        out.push_str("#EXT-X-ENDLIST\n");
        out
    }

    fn upload(gateway: &MemoryGateway, folder_key: &str, files: &[&str]) {
        gateway.put_file(folder_key, "live.m3u8", playlist(files));
        for file in files {
            gateway.put_file(folder_key, file, format!("[{folder_key}/{file}]"));
        }
    }

    fn executor(gateway: Arc<MemoryGateway>) -> CommandExecutor {
        let mut config = AppConfig::default();
        config.colored_output = false;
        CommandExecutor::with_gateway(config, gateway, CancellationToken::new())
    }

    fn lines(out: Vec<u8>) -> Vec<String> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn scan_reports_presence() {
        let gateway = Arc::new(MemoryGateway::new());
        upload(&gateway, "0000003600", &["a.ts"]);
        let exec = executor(gateway);

        let mut out = Vec::new();
        exec.scan(&mut out, "0", "10800", OutputFormat::Json)
            .await
            .unwrap();
        let present: Vec<bool> = lines(out)
            .iter()
            .map(|line| {
                let value: serde_json::Value = serde_json::from_str(line).unwrap();
                value["present"].as_bool().unwrap()
            })
            .collect();
        assert_eq!(present, [false, true, false]);
    }

    #[tokio::test]
    async fn scan_rejects_reversed_range() {
        let exec = executor(Arc::new(MemoryGateway::new()));
        let err = exec
            .scan(&mut Vec::new(), "7200", "0", OutputFormat::Pretty)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn verify_reports_missing_segments() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.put_file("0000003600", "live.m3u8", playlist(&["a.ts", "b.ts"]));
        gateway.put_file("0000003600", "a.ts", "a");
        let exec = executor(gateway);

        let mut out = Vec::new();
        exec.verify(&mut out, "0000003600", OutputFormat::Pretty)
            .await
            .unwrap();
        let out = lines(out);
        assert_eq!(out[0], "0000003600: missing files (b.ts)");
        assert_eq!(out[1], "  2 segments, 20.0s");
    }

    #[tokio::test]
    async fn verify_without_manifest() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.put_file("0000003600", "a.ts", "a");
        let exec = executor(gateway);

        let mut out = Vec::new();
        exec.verify(&mut out, "0000003600", OutputFormat::Pretty)
            .await
            .unwrap();
        assert_eq!(lines(out), ["0000003600: no manifest"]);

        let err = exec
            .verify(&mut Vec::new(), "0000007200", OutputFormat::Pretty)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn clips_writes_concatenated_segments() {
        let gateway = Arc::new(MemoryGateway::new());
        upload(&gateway, "0000000000", &["a.ts", "b.ts"]);
        upload(&gateway, "0000007200", &["c.ts"]);
        let exec = executor(gateway);
        let dir = tempfile::tempdir().unwrap();

        let mut out = Vec::new();
        exec.clips(
            &mut out,
            "0",
            Some("10800"),
            Some(dir.path()),
            None,
            OutputFormat::Json,
        )
        .await
        .unwrap();

        let clips: Vec<serde_json::Value> = lines(out)
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(clips.len(), 2);
        assert_eq!(clips[0]["bucket"]["folder_key"], "0000000000");
        assert_eq!(clips[1]["bucket"]["folder_key"], "0000007200");

        let file = clips[0]["file"].as_str().unwrap();
        assert_eq!(
            std::fs::read_to_string(file).unwrap(),
            "[0000000000/a.ts][0000000000/b.ts]"
        );
        assert!(file.ends_with("rpi_orcasound_lab_1969_12_31_16_00_00_PST.ts"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    /// Serves manifests but refuses every segment download.
    struct SegmentOutage(MemoryGateway);

    #[async_trait::async_trait]
    impl ObjectStoreGateway for SegmentOutage {
        async fn list_folders(&self, prefix: &str) -> std::result::Result<Vec<String>, StorageError> {
            self.0.list_folders(prefix).await
        }

        async fn list_files(
            &self,
            folder_key: &str,
        ) -> std::result::Result<Vec<ObjectEntry>, StorageError> {
            self.0.list_files(folder_key).await
        }

        async fn download(
            &self,
            folder_key: &str,
            filename: &str,
        ) -> std::result::Result<Bytes, StorageError> {
            if filename.ends_with(".ts") {
                return Err(StorageError::unavailable("download", "connection reset"));
            }
            self.0.download(folder_key, filename).await
        }
    }

    #[tokio::test]
    async fn failed_clip_leaves_no_file_behind() {
        let memory = MemoryGateway::new();
        upload(&memory, "0000000000", &["a.ts", "b.ts"]);
        let mut config = AppConfig::default();
        config.colored_output = false;
        config.retry.max_retries = 0;
        let exec = CommandExecutor::with_gateway(
            config,
            Arc::new(SegmentOutage(memory)),
            CancellationToken::new(),
        );
        let dir = tempfile::tempdir().unwrap();

        let err = exec
            .clips(
                &mut Vec::new(),
                "0",
                Some("3600"),
                Some(dir.path()),
                None,
                OutputFormat::Pretty,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Fetch(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unaligned_archive_is_reported() {
        let gateway = Arc::new(MemoryGateway::new());
        upload(&gateway, "1657546219", &["live000.ts"]);
        let exec = executor(gateway);

        let err = exec
            .scan(&mut Vec::new(), "1657546219", "1657558800", OutputFormat::Pretty)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::MisalignedArchive { bucket_width: 3600, count: 1, ref example }
                if example == "1657546219"
        ));

        let err = exec
            .clips(
                &mut Vec::new(),
                "1657546219",
                Some("1657558800"),
                None,
                None,
                OutputFormat::Pretty,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MisalignedArchive { .. }));
    }

    #[tokio::test]
    async fn clips_honors_limit() {
        let gateway = Arc::new(MemoryGateway::new());
        upload(&gateway, "0000000000", &["a.ts"]);
        upload(&gateway, "0000003600", &["b.ts"]);
        let exec = executor(gateway);

        let mut out = Vec::new();
        exec.clips(&mut out, "0", None, None, Some(1), OutputFormat::Pretty)
            .await
            .unwrap();
        let out = lines(out);
        assert_eq!(out.len(), 1);
        assert!(out[0].starts_with("1970_01_01_00_00_00  0000000000  1 segments"));
    }

    #[tokio::test]
    async fn clips_without_data_fails() {
        let exec = executor(Arc::new(MemoryGateway::new()));
        let err = exec
            .clips(
                &mut Vec::new(),
                "0",
                Some("7200"),
                None,
                None,
                OutputFormat::Pretty,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Sequencer(SequencerError::NoDataAvailable { .. })
        ));
    }
}
