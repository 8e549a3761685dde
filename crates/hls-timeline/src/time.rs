//! Conversions between epoch seconds, bucket folder keys and clip names.
//!
//! Everything here is pure: no I/O, no clock. Bucket folder keys are the
//! bucket start epoch as a zero-padded decimal string so that lexical order
//! matches chronological order for any epoch below 10^10.

use chrono::{DateTime, Utc};
use chrono_tz::US::Pacific;
use serde::{Deserialize, Serialize};

use crate::error::TimeError;

/// Width of the zero-padded decimal folder key.
pub const FOLDER_KEY_DIGITS: usize = 10;

const CLIP_NAME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// One folder's fixed-width time window, `[start_epoch, end_epoch)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimeBucket {
    pub start_epoch: i64,
    pub end_epoch: i64,
    pub folder_key: String,
}

impl TimeBucket {
    /// The bucket of width `bucket_width` that contains `epoch`.
    pub fn containing(epoch: i64, bucket_width: i64) -> Result<Self, TimeError> {
        let start_epoch = floor_epoch(epoch, bucket_width)?;
        let end_epoch = start_epoch
            .checked_add(bucket_width)
            .ok_or(TimeError::OutOfRange { epoch })?;
        Ok(Self {
            start_epoch,
            end_epoch,
            folder_key: format_folder_key(start_epoch),
        })
    }

    /// Rebuilds a bucket from its folder key.
    pub fn from_folder_key(key: &str, bucket_width: i64) -> Result<Self, TimeError> {
        Self::containing(folder_key_to_epoch(key)?, bucket_width)
    }

    /// The bucket immediately after this one.
    pub fn next(&self) -> Result<Self, TimeError> {
        Self::containing(self.end_epoch, self.width())
    }

    pub fn width(&self) -> i64 {
        self.end_epoch - self.start_epoch
    }

    pub fn contains(&self, epoch: i64) -> bool {
        (self.start_epoch..self.end_epoch).contains(&epoch)
    }
}

fn check_epoch(epoch: i64) -> Result<(), TimeError> {
    if epoch < 0 {
        return Err(TimeError::invalid_timestamp(epoch, "negative epoch"));
    }
    Ok(())
}

fn check_width(bucket_width: i64) -> Result<(), TimeError> {
    if bucket_width <= 0 {
        return Err(TimeError::InvalidBucketWidth {
            width: bucket_width,
        });
    }
    Ok(())
}

fn format_folder_key(start_epoch: i64) -> String {
    format!("{start_epoch:0width$}", width = FOLDER_KEY_DIGITS)
}

/// Floors `epoch` to a multiple of `bucket_width`.
pub fn floor_epoch(epoch: i64, bucket_width: i64) -> Result<i64, TimeError> {
    check_epoch(epoch)?;
    check_width(bucket_width)?;
    Ok(epoch - epoch % bucket_width)
}

pub fn epoch_to_folder_key(epoch: i64, bucket_width: i64) -> Result<String, TimeError> {
    floor_epoch(epoch, bucket_width).map(format_folder_key)
}

/// Inverse of [`epoch_to_folder_key`]. Unpadded decimal keys are accepted too.
pub fn folder_key_to_epoch(key: &str) -> Result<i64, TimeError> {
    if key.is_empty() || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeError::InvalidFolderKey {
            key: key.to_string(),
        });
    }
    key.parse::<i64>().map_err(|_| TimeError::InvalidFolderKey {
        key: key.to_string(),
    })
}

/// Converts fractional seconds to a whole epoch, rejecting negative and
/// non-finite input.
pub fn epoch_from_secs_f64(value: f64) -> Result<i64, TimeError> {
    if !value.is_finite() {
        return Err(TimeError::invalid_timestamp(value, "not a finite number"));
    }
    if value < 0.0 {
        return Err(TimeError::invalid_timestamp(value, "negative epoch"));
    }
    let floored = value.floor();
    if floored >= i64::MAX as f64 {
        return Err(TimeError::OutOfRange { epoch: i64::MAX });
    }
    Ok(floored as i64)
}

fn utc_datetime(epoch: i64) -> Result<DateTime<Utc>, TimeError> {
    check_epoch(epoch)?;
    DateTime::from_timestamp(epoch, 0).ok_or(TimeError::OutOfRange { epoch })
}

/// Deterministic clip name for a bucket start, in UTC.
///
/// ```
/// assert_eq!(
///     hls_timeline::time::clip_name(1_700_000_000).unwrap(),
///     "2023_11_14_22_13_20"
/// );
/// ```
pub fn clip_name(epoch: i64) -> Result<String, TimeError> {
    Ok(utc_datetime(epoch)?.format(CLIP_NAME_FORMAT).to_string())
}

/// Human readable clip name in US/Pacific local time, prefixed with the
/// source identifier and suffixed with the zone abbreviation.
///
/// Returns the full name and the local timestamp part on its own.
pub fn readable_clip_name(source_id: &str, epoch: i64) -> Result<(String, String), TimeError> {
    let local = utc_datetime(epoch)?.with_timezone(&Pacific);
    let stamp = local.format(CLIP_NAME_FORMAT).to_string();
    let zone = local.format("%Z");
    Ok((format!("{source_id}_{stamp}_{zone}"), stamp))
}

/// Parses either whole epoch seconds or an RFC 3339 timestamp.
pub fn parse_time(text: &str) -> Result<i64, TimeError> {
    let trimmed = text.trim();
    if let Ok(epoch) = trimmed.parse::<i64>() {
        check_epoch(epoch)?;
        return Ok(epoch);
    }
    if let Ok(value) = trimmed.parse::<f64>() {
        return epoch_from_secs_f64(value);
    }
    let parsed = DateTime::parse_from_rfc3339(trimmed)
        .map_err(|_| TimeError::invalid_timestamp(trimmed, "expected epoch seconds or RFC 3339"))?;
    let epoch = parsed.timestamp();
    check_epoch(epoch)?;
    Ok(epoch)
}
