// Bucket manifest parsing: reduces an HLS media playlist to the ordered list of
// segment files it declares.

use std::collections::HashSet;

use m3u8_rs::{Playlist, parse_playlist_res};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ManifestError;

/// One segment file within a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRef {
    pub filename: String,
    pub sequence_index: u64,
    pub duration_seconds: f64,
    pub byte_size: Option<u64>,
}

impl SegmentRef {
    pub fn is_degenerate(&self) -> bool {
        self.duration_seconds <= 0.0
    }
}

/// The parts of a bucket's media playlist the engine relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistManifest {
    pub segments: Vec<SegmentRef>,
    pub total_duration: f64,
    pub end_of_stream: bool,
    pub target_duration: u64,
    pub media_sequence: u64,
}

impl PlaylistManifest {
    pub fn parse(input: &[u8]) -> Result<Self, ManifestError> {
        std::str::from_utf8(input).map_err(|_| ManifestError::NotUtf8)?;

        let playlist = match parse_playlist_res(input) {
            Ok(Playlist::MediaPlaylist(pl)) => pl,
            Ok(Playlist::MasterPlaylist(_)) => return Err(ManifestError::MasterPlaylist),
            Err(e) => {
                return Err(ManifestError::Parse {
                    reason: e.to_string(),
                });
            }
        };

        if playlist.segments.is_empty() {
            return Err(ManifestError::Empty);
        }

        let mut seen = HashSet::with_capacity(playlist.segments.len());
        let mut segments = Vec::with_capacity(playlist.segments.len());
        for (position, segment) in playlist.segments.iter().enumerate() {
            let filename = segment_filename(&segment.uri);
            if filename.is_empty() {
                return Err(ManifestError::EmptyUri { position });
            }
            if !seen.insert(filename.to_string()) {
                return Err(ManifestError::DuplicateSegment {
                    filename: filename.to_string(),
                });
            }
            let sequence_index = u64::try_from(position)
                .ok()
                .and_then(|offset| playlist.media_sequence.checked_add(offset))
                .ok_or(ManifestError::SequenceOverflow {
                    media_sequence: playlist.media_sequence,
                    position,
                })?;
            segments.push(SegmentRef {
                filename: filename.to_string(),
                sequence_index,
                duration_seconds: f64::from(segment.duration),
                byte_size: None,
            });
        }

        let total_duration = segments.iter().map(|s| s.duration_seconds.max(0.0)).sum();
        trace!(
            segments = segments.len(),
            total_duration,
            end_of_stream = playlist.end_list,
            "Parsed bucket manifest"
        );

        Ok(Self {
            segments,
            total_duration,
            end_of_stream: playlist.end_list,
            target_duration: playlist.target_duration,
            media_sequence: playlist.media_sequence,
        })
    }

    pub fn declared_filenames(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(|s| s.filename.as_str())
    }

    /// Number of segments declared with a zero or negative duration.
    pub fn degenerate_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.is_degenerate()).count()
    }

    pub fn is_degraded(&self) -> bool {
        self.degenerate_segments() > 0
    }
}

/// Last path component of a segment URI, without query or fragment.
fn segment_filename(uri: &str) -> &str {
    let path = uri.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/').next().unwrap_or_default().trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAYLIST: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:5
#EXTINF:10.0,
live005.ts
#EXTINF:10.0,
live006.ts
#EXTINF:9.5,
live007.ts
#EXT-X-ENDLIST
";

    #[test]
    fn parses_segments_in_declared_order() {
        let manifest = PlaylistManifest::parse(PLAYLIST.as_bytes()).unwrap();
        let names: Vec<_> = manifest.declared_filenames().collect();
        assert_eq!(names, ["live005.ts", "live006.ts", "live007.ts"]);
        assert_eq!(manifest.segments[0].sequence_index, 5);
        assert_eq!(manifest.segments[2].sequence_index, 7);
        assert!((manifest.total_duration - 29.5).abs() < 1e-6);
        assert!(manifest.end_of_stream);
        assert_eq!(manifest.target_duration, 10);
        assert!(!manifest.is_degraded());
    }

    #[test]
    fn reduces_uris_to_file_names() {
        assert_eq!(segment_filename("live001.ts"), "live001.ts");
        assert_eq!(
            segment_filename("https://cdn.example/hls/123/live001.ts?token=a"),
            "live001.ts"
        );
        assert_eq!(segment_filename("sub/dir/a.ts#frag"), "a.ts");
        assert_eq!(segment_filename("dir/"), "");
    }

    #[test]
    fn open_playlist_has_no_end_flag() {
        let input = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\na.ts\n";
        let manifest = PlaylistManifest::parse(input.as_bytes()).unwrap();
        assert!(!manifest.end_of_stream);
        assert_eq!(manifest.media_sequence, 0);
    }

    #[test]
    fn zero_duration_segments_are_degraded_not_malformed() {
        let input = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:0,\na.ts\n#EXTINF:10.0,\nb.ts\n";
        let manifest = PlaylistManifest::parse(input.as_bytes()).unwrap();
        assert_eq!(manifest.degenerate_segments(), 1);
        assert!(manifest.is_degraded());
    }

    #[test]
    fn rejects_garbage() {
        let err = PlaylistManifest::parse(b"this is not a playlist").unwrap_err();
        assert!(matches!(err, ManifestError::Parse { .. }));
    }

    #[test]
    fn rejects_non_utf8() {
        let err = PlaylistManifest::parse(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(err, ManifestError::NotUtf8);
    }

    #[test]
    fn rejects_empty_playlist() {
        let err = PlaylistManifest::parse(b"#EXTM3U\n#EXT-X-TARGETDURATION:10\n").unwrap_err();
        assert_eq!(err, ManifestError::Empty);
    }

    #[test]
    fn rejects_master_playlist() {
        let input = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=128000\naudio/index.m3u8\n";
        let err = PlaylistManifest::parse(input.as_bytes()).unwrap_err();
        assert_eq!(err, ManifestError::MasterPlaylist);
    }

    #[test]
    fn rejects_duplicate_filenames() {
        let input = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXTINF:10.0,\na.ts\n#EXTINF:10.0,\nother/a.ts\n";
        let err = PlaylistManifest::parse(input.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ManifestError::DuplicateSegment {
                filename: "a.ts".to_string()
            }
        );
    }

    #[test]
    fn rejects_media_sequence_overflow() {
        let input = "#EXTM3U\n#EXT-X-TARGETDURATION:10\n#EXT-X-MEDIA-SEQUENCE:18446744073709551615\n#EXTINF:10.0,\na.ts\n#EXTINF:10.0,\nb.ts\n";
        let err = PlaylistManifest::parse(input.as_bytes()).unwrap_err();
        assert_eq!(
            err,
            ManifestError::SequenceOverflow {
                media_sequence: u64::MAX,
                position: 1,
            }
        );
    }
}
