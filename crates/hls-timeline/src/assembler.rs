use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::AssemblyError;
use crate::gateway::ObjectEntry;
use crate::playlist::{PlaylistManifest, SegmentRef};
use crate::time::{TimeBucket, clip_name};

/// A playable clip: one bucket's segments in playback order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipDescriptor {
    pub bucket: TimeBucket,
    pub segments: Vec<SegmentRef>,
    pub clip_name: String,
    /// False when the manifest declared zero-duration segments.
    pub is_complete: bool,
    pub total_duration: f64,
    pub end_of_stream: bool,
}

impl ClipDescriptor {
    pub fn folder_key(&self) -> &str {
        &self.bucket.folder_key
    }

    /// Sum of the listed segment sizes, if every size is known.
    pub fn byte_size(&self) -> Option<u64> {
        self.segments.iter().map(|s| s.byte_size).sum()
    }
}

/// Turns a validated manifest into a [`ClipDescriptor`]. Never touches
/// segment bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipAssembler;

impl ClipAssembler {
    pub fn assemble(
        bucket: &TimeBucket,
        manifest: &PlaylistManifest,
        listing: &[ObjectEntry],
    ) -> Result<ClipDescriptor, AssemblyError> {
        let sizes: HashMap<&str, Option<u64>> = listing
            .iter()
            .map(|entry| (entry.name.as_str(), entry.size))
            .collect();

        let mut segments = manifest.segments.clone();
        segments.sort_by(|a, b| {
            a.sequence_index
                .cmp(&b.sequence_index)
                .then_with(|| a.filename.cmp(&b.filename))
        });

        if let Some(pair) = segments
            .windows(2)
            .find(|pair| pair[0].sequence_index == pair[1].sequence_index)
        {
            return Err(AssemblyError::SequenceTie {
                index: pair[0].sequence_index,
                first: pair[0].filename.clone(),
                second: pair[1].filename.clone(),
            });
        }

        for segment in &mut segments {
            if let Some(size) = sizes.get(segment.filename.as_str()).copied().flatten() {
                segment.byte_size = Some(size);
            }
        }

        Ok(ClipDescriptor {
            bucket: bucket.clone(),
            clip_name: clip_name(bucket.start_epoch)?,
            is_complete: !manifest.is_degraded(),
            total_duration: manifest.total_duration,
            end_of_stream: manifest.end_of_stream,
            segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(filename: &str, sequence_index: u64, duration_seconds: f64) -> SegmentRef {
        SegmentRef {
            filename: filename.to_string(),
            sequence_index,
            duration_seconds,
            byte_size: None,
        }
    }

    fn manifest(segments: Vec<SegmentRef>) -> PlaylistManifest {
        PlaylistManifest {
            total_duration: segments.iter().map(|s| s.duration_seconds).sum(),
            segments,
            end_of_stream: true,
            target_duration: 10,
            media_sequence: 0,
        }
    }

    #[test]
    fn orders_by_sequence_index_and_fills_sizes() {
        let bucket = TimeBucket::containing(1_700_000_000, 3600).unwrap();
        let manifest = manifest(vec![
            segment("c.ts", 2, 10.0),
            segment("a.ts", 0, 10.0),
            segment("b.ts", 1, 10.0),
        ]);
        let listing = [
            ObjectEntry::new("b.ts", Some(200)),
            ObjectEntry::new("a.ts", Some(100)),
            ObjectEntry::new("c.ts", None),
        ];

        let clip = ClipAssembler::assemble(&bucket, &manifest, &listing).unwrap();
        let names: Vec<_> = clip.segments.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, ["a.ts", "b.ts", "c.ts"]);
        assert_eq!(clip.segments[0].byte_size, Some(100));
        assert_eq!(clip.segments[2].byte_size, None);
        assert_eq!(clip.byte_size(), None);
        assert_eq!(clip.clip_name, "2023_11_14_22_00_00");
        assert!(clip.is_complete);
        assert_eq!(clip.folder_key(), "1699999200");
    }

    #[test]
    fn index_tie_is_an_error() {
        let bucket = TimeBucket::containing(0, 60).unwrap();
        let manifest = manifest(vec![segment("b.ts", 4, 1.0), segment("a.ts", 4, 1.0)]);
        let err = ClipAssembler::assemble(&bucket, &manifest, &[]).unwrap_err();
        assert!(matches!(
            err,
            AssemblyError::SequenceTie { index: 4, ref first, ref second }
                if first == "a.ts" && second == "b.ts"
        ));
    }

    #[test]
    fn degraded_manifest_yields_incomplete_clip() {
        let bucket = TimeBucket::containing(0, 60).unwrap();
        let manifest = manifest(vec![segment("a.ts", 0, 0.0), segment("b.ts", 1, 6.0)]);
        let clip = ClipAssembler::assemble(&bucket, &manifest, &[]).unwrap();
        assert!(!clip.is_complete);
        assert_eq!(clip.segments.len(), 2);
    }
}
