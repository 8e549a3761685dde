//! Cross-checks a bucket manifest against the files actually present.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::playlist::PlaylistManifest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum ValidationVerdict {
    Complete,
    MissingFiles(BTreeSet<String>),
    ExtraFiles(BTreeSet<String>),
    Malformed(String),
}

impl ValidationVerdict {
    /// Whether every declared segment is present.
    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Complete | Self::ExtraFiles(_))
    }
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub verdict: ValidationVerdict,
    /// The parsed manifest, absent when it was malformed.
    pub manifest: Option<PlaylistManifest>,
}

impl Validation {
    /// Usable but carries zero-duration segments.
    pub fn is_degraded(&self) -> bool {
        self.manifest
            .as_ref()
            .is_some_and(PlaylistManifest::is_degraded)
    }
}

#[derive(Debug, Clone)]
pub struct PlaylistValidator {
    manifest_name: String,
}

impl PlaylistValidator {
    /// `manifest_name` is excluded from the present file set.
    pub fn new(manifest_name: impl Into<String>) -> Self {
        Self {
            manifest_name: manifest_name.into(),
        }
    }

    pub fn manifest_name(&self) -> &str {
        &self.manifest_name
    }

    pub fn validate<'a, I>(&self, raw_manifest: &[u8], present: I) -> Validation
    where
        I: IntoIterator<Item = &'a str>,
    {
        match PlaylistManifest::parse(raw_manifest) {
            Ok(manifest) => Validation {
                verdict: self.compare(&manifest, present),
                manifest: Some(manifest),
            },
            Err(e) => Validation {
                verdict: ValidationVerdict::Malformed(e.to_string()),
                manifest: None,
            },
        }
    }

    /// Compares declared segment files with the present ones. Missing files
    /// take precedence over extra ones.
    pub fn compare<'a, I>(&self, manifest: &PlaylistManifest, present: I) -> ValidationVerdict
    where
        I: IntoIterator<Item = &'a str>,
    {
        let present: BTreeSet<&str> = present
            .into_iter()
            .filter(|name| *name != self.manifest_name)
            .collect();
        let declared: BTreeSet<&str> = manifest.declared_filenames().collect();

        let missing: BTreeSet<String> = declared
            .difference(&present)
            .map(|s| s.to_string())
            .collect();
        if !missing.is_empty() {
            return ValidationVerdict::MissingFiles(missing);
        }

        let extra: BTreeSet<String> = present
            .difference(&declared)
            .map(|s| s.to_string())
            .collect();
        if !extra.is_empty() {
            return ValidationVerdict::ExtraFiles(extra);
        }

        ValidationVerdict::Complete
    }
}

impl Default for PlaylistValidator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MANIFEST_NAME)
    }
}
