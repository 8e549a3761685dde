use crate::{cli::OutputFormat, error::Result};
use colored::*;
use hls_timeline::{ClipDescriptor, FetchSummary, TimeBucket, Validation, ValidationVerdict};
use serde_json::json;
use std::path::Path;

pub struct OutputManager {
    colored: bool,
    format: OutputFormat,
}

impl OutputManager {
    pub fn new(colored: bool, format: OutputFormat) -> Self {
        Self { colored, format }
    }

    pub fn format_scan_entry(&self, bucket: &TimeBucket, present: bool) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string(&json!({
                "folder_key": bucket.folder_key,
                "start_epoch": bucket.start_epoch,
                "end_epoch": bucket.end_epoch,
                "present": present,
            }))?),
            OutputFormat::Pretty => {
                let status = if present {
                    self.colorize("present", Color::Green, false)
                } else {
                    self.colorize("absent", Color::Yellow, false)
                };
                Ok(format!(
                    "{}  {}  {}",
                    self.colorize(&bucket.folder_key, Color::Cyan, false),
                    hls_timeline::time::clip_name(bucket.start_epoch)?,
                    status
                ))
            }
        }
    }

    /// `None` in JSON mode, where the entries speak for themselves.
    pub fn format_scan_summary(&self, total: usize, present: usize) -> Option<String> {
        match self.format {
            OutputFormat::Json => None,
            OutputFormat::Pretty => Some(self.colorize(
                &format!("{present} of {total} buckets present"),
                Color::Green,
                true,
            )),
        }
    }

    pub fn format_verdict(&self, folder_key: &str, validation: &Validation) -> Result<String> {
        let manifest = validation.manifest.as_ref();
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string(&json!({
                "folder_key": folder_key,
                "verdict": validation.verdict,
                "usable": validation.verdict.is_usable(),
                "degraded": validation.is_degraded(),
                "segments": manifest.map(|m| m.segments.len()),
                "total_duration": manifest.map(|m| m.total_duration),
                "end_of_stream": manifest.map(|m| m.end_of_stream),
            }))?),
            OutputFormat::Pretty => {
                let verdict = match &validation.verdict {
                    ValidationVerdict::Complete => self.colorize("complete", Color::Green, true),
                    ValidationVerdict::ExtraFiles(files) => format!(
                        "{} (not in manifest: {})",
                        self.colorize("extra files", Color::Yellow, true),
                        join(files)
                    ),
                    ValidationVerdict::MissingFiles(files) => format!(
                        "{} ({})",
                        self.colorize("missing files", Color::Red, true),
                        join(files)
                    ),
                    ValidationVerdict::Malformed(reason) => format!(
                        "{} ({reason})",
                        self.colorize("malformed", Color::Red, true)
                    ),
                };
                let mut output = format!(
                    "{}: {}",
                    self.colorize(folder_key, Color::Cyan, false),
                    verdict
                );
                if let Some(m) = manifest {
                    output.push_str(&format!(
                        "\n  {} segments, {:.1}s{}",
                        m.segments.len(),
                        m.total_duration,
                        if m.end_of_stream { "" } else { ", still open" }
                    ));
                }
                if validation.is_degraded() {
                    output.push_str("\n  contains zero-duration segments");
                }
                Ok(output)
            }
        }
    }

    pub fn format_missing_manifest(&self, folder_key: &str) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string(&json!({
                "folder_key": folder_key,
                "verdict": { "verdict": "manifest_missing" },
                "usable": false,
            }))?),
            OutputFormat::Pretty => Ok(format!(
                "{}: {}",
                self.colorize(folder_key, Color::Cyan, false),
                self.colorize("no manifest", Color::Red, true)
            )),
        }
    }

    pub fn format_clip(
        &self,
        clip: &ClipDescriptor,
        written: Option<(&Path, &FetchSummary)>,
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let mut value = serde_json::to_value(clip)?;
                if let Some((path, summary)) = written {
                    value["file"] = json!(path.display().to_string());
                    value["fetch"] = serde_json::to_value(summary)?;
                }
                Ok(serde_json::to_string(&value)?)
            }
            OutputFormat::Pretty => {
                let mut output = format!(
                    "{}  {}  {} segments  {:.1}s",
                    self.colorize(&clip.clip_name, Color::Green, true),
                    self.colorize(clip.folder_key(), Color::Cyan, false),
                    clip.segments.len(),
                    clip.total_duration,
                );
                if !clip.is_complete {
                    output.push_str(&format!("  {}", self.colorize("degraded", Color::Yellow, false)));
                }
                if let Some((path, summary)) = written {
                    output.push_str(&format!(
                        "\n  -> {} ({} bytes)",
                        path.display(),
                        summary.bytes_written
                    ));
                    if !summary.skipped.is_empty() {
                        output.push_str(&format!(
                            "\n  {} {}",
                            self.colorize("vanished:", Color::Yellow, false),
                            summary.skipped.join(", ")
                        ));
                    }
                }
                Ok(output)
            }
        }
    }

    fn colorize(&self, text: &str, color: Color, bold: bool) -> String {
        if !self.colored {
            return text.to_string();
        }
        let colored_text = match color {
            Color::Green => text.green(),
            Color::Yellow => text.yellow(),
            Color::Red => text.red(),
            Color::Cyan => text.cyan(),
        };
        if bold {
            colored_text.bold().to_string()
        } else {
            colored_text.to_string()
        }
    }
}

enum Color {
    Green,
    Yellow,
    Red,
    Cyan,
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hls_timeline::PlaylistValidator;

    #[test]
    fn plain_scan_entry() {
        let out = OutputManager::new(false, OutputFormat::Pretty);
        let bucket = TimeBucket::containing(3600, 3600).unwrap();
        assert_eq!(
            out.format_scan_entry(&bucket, true).unwrap(),
            "0000003600  1970_01_01_01_00_00  present"
        );
        assert_eq!(
            out.format_scan_summary(4, 1).as_deref(),
            Some("1 of 4 buckets present")
        );
    }

    #[test]
    fn json_verdict() {
        let out = OutputManager::new(false, OutputFormat::Json);
        let validation = PlaylistValidator::default().validate(
            b"#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\na.ts\n#EXT-X-ENDLIST\n",
            ["live.m3u8"],
        );
        let line = out.format_verdict("0000003600", &validation).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["verdict"]["verdict"], "missing_files");
        assert_eq!(value["verdict"]["detail"][0], "a.ts");
        assert_eq!(value["usable"], false);
        assert_eq!(value["segments"], 1);
    }
}
