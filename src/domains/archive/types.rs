use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;

pub const MANIFEST_NAME: &str = "manifest.json";
/// Manifest name used by older exports.
pub const LEGACY_MANIFEST_NAME: &str = "data.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum MediaOwner {
    Application,
    Round,
}

/// A file the manifest points at, not yet resolved against the base
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaReference {
    pub owner: MediaOwner,
    pub owner_id: String,
    pub declared_path: String,
    /// `cv` for application files, the media type for round files.
    pub kind: String,
}

impl MediaReference {
    /// Name of this file inside an archive.
    pub fn archive_name(&self) -> String {
        let extension = file_suffix(&self.declared_path);
        match self.owner {
            MediaOwner::Application => application_cv_name(&self.owner_id, &extension),
            MediaOwner::Round => round_media_name(&self.owner_id, &self.kind, &extension),
        }
    }
}

/// `files/applications/cv_<id><ext>`
pub fn application_cv_name(application_id: &str, extension: &str) -> String {
    format!("files/applications/cv_{}{}", application_id, extension)
}

/// `files/rounds/<id>_<kind><ext>`
pub fn round_media_name(round_id: &str, kind: &str, extension: &str) -> String {
    format!("files/rounds/{}_{}{}", round_id, kind, extension)
}

/// Extension including the leading dot, or an empty string.
pub fn file_suffix(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

/// Result of checking an archive without extracting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveInfo {
    /// Non-directory members, manifest included.
    pub file_count: usize,
    pub total_uncompressed: u64,
    pub manifest_name: String,
    /// Members named like a manifest, current or legacy.
    pub manifest_members: usize,
}

impl ArchiveInfo {
    /// Members other than the manifest files.
    pub fn media_file_count(&self) -> usize {
        self.file_count.saturating_sub(self.manifest_members)
    }
}

/// Fully read archive held in memory.
#[derive(Debug, Clone)]
pub struct ArchiveContents {
    pub info: ArchiveInfo,
    pub manifest: Vec<u8>,
    pub files: BTreeMap<String, Vec<u8>>,
}

impl ArchiveContents {
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }
}
