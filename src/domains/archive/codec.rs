use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::paths::{check_member_path, resolve_media_path};
use super::types::{
    ArchiveContents, ArchiveInfo, MediaOwner, MediaReference, LEGACY_MANIFEST_NAME, MANIFEST_NAME,
};
use crate::config::TransferLimits;
use crate::errors::{TransferError, TransferResult};

fn write_error(error: zip::result::ZipError) -> TransferError {
    TransferError::Io(format!("failed to write archive: {}", error))
}

fn file_options() -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Every media file a nested manifest points at.
pub fn collect_media_references(manifest: &Value) -> Vec<MediaReference> {
    let mut references = Vec::new();
    let applications = manifest
        .get("applications")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for application in applications {
        let app_id = application.get("id").and_then(id_string);
        if let Some(cv_path) = application.get("cv_path").and_then(Value::as_str) {
            match &app_id {
                Some(id) if !cv_path.is_empty() => references.push(MediaReference {
                    owner: MediaOwner::Application,
                    owner_id: id.clone(),
                    declared_path: cv_path.to_string(),
                    kind: "cv".to_string(),
                }),
                Some(_) => {}
                None => log::warn!("Skipping CV {} of an application without id", cv_path),
            }
        }

        let rounds = application
            .get("rounds")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for round in rounds {
            let round_id = round.get("id").and_then(id_string);
            let media = round
                .get("media")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            for item in media {
                let (Some(path), Some(kind)) = (
                    item.get("path").and_then(Value::as_str),
                    item.get("type").and_then(Value::as_str),
                ) else {
                    continue;
                };
                if path.is_empty() {
                    continue;
                }
                match &round_id {
                    Some(id) => references.push(MediaReference {
                        owner: MediaOwner::Round,
                        owner_id: id.clone(),
                        declared_path: path.to_string(),
                        kind: kind.to_string(),
                    }),
                    None => log::warn!("Skipping media {} of a round without id", path),
                }
            }
        }
    }
    references
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Builds an export archive: `manifest.json` plus every referenced media file
/// found under `base_dir`.
///
/// Files that are missing or resolve outside `base_dir` are skipped with a
/// warning. Entries are sorted and carry fixed timestamps, so the same inputs
/// always produce the same bytes.
pub fn build_archive(manifest_json: &str, user_id: &str, base_dir: &Path) -> TransferResult<Vec<u8>> {
    let manifest: Value = serde_json::from_str(manifest_json)?;

    let mut entries: BTreeSet<(String, PathBuf)> = BTreeSet::new();
    for reference in collect_media_references(&manifest) {
        match resolve_media_path(base_dir, &reference.declared_path) {
            Some(source) => {
                entries.insert((reference.archive_name(), source));
            }
            None => log::warn!(
                "Skipping media file {} for user {}: missing or outside {}",
                reference.declared_path,
                user_id,
                base_dir.display()
            ),
        }
    }

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = file_options();

    writer.start_file(MANIFEST_NAME, options).map_err(write_error)?;
    writer.write_all(manifest_json.as_bytes())?;

    let mut written: BTreeSet<&str> = BTreeSet::new();
    for (name, source) in &entries {
        if !written.insert(name.as_str()) {
            log::warn!("Duplicate archive name {}, keeping the first source", name);
            continue;
        }
        let data = std::fs::read(source)?;
        writer.start_file(name.as_str(), options).map_err(write_error)?;
        writer.write_all(&data)?;
    }

    let cursor = writer.finish().map_err(write_error)?;
    log::info!(
        "Built export archive for user {} with {} media files",
        user_id,
        written.len()
    );
    Ok(cursor.into_inner())
}

/// Checks member names, the declared uncompressed total and manifest presence
/// without decompressing anything.
pub fn inspect_archive(bytes: &[u8], limits: &TransferLimits) -> TransferResult<ArchiveInfo> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut file_count = 0usize;
    let mut total_uncompressed = 0u64;
    let mut has_manifest = false;
    let mut has_legacy_manifest = false;
    let mut manifest_members = 0usize;

    for index in 0..archive.len() {
        let member = archive.by_index_raw(index)?;
        let name = member.name().to_string();
        check_member_path(&name)?;

        total_uncompressed = total_uncompressed
            .checked_add(member.size())
            .ok_or_else(|| TransferError::unsafe_archive("declared size overflows"))?;
        if total_uncompressed > limits.max_uncompressed_bytes {
            return Err(TransferError::unsafe_archive(format!(
                "uncompressed size exceeds the {} byte limit",
                limits.max_uncompressed_bytes
            )));
        }

        if member.is_dir() {
            continue;
        }
        file_count += 1;
        match name.as_str() {
            MANIFEST_NAME => has_manifest = true,
            LEGACY_MANIFEST_NAME => has_legacy_manifest = true,
            _ => continue,
        }
        manifest_members += 1;
    }

    let manifest_name = if has_manifest {
        MANIFEST_NAME
    } else if has_legacy_manifest {
        LEGACY_MANIFEST_NAME
    } else {
        return Err(TransferError::unsafe_archive(format!(
            "archive must contain {}",
            MANIFEST_NAME
        )));
    };

    Ok(ArchiveInfo {
        file_count,
        total_uncompressed,
        manifest_name: manifest_name.to_string(),
        manifest_members,
    })
}

/// Reads the manifest and every media member into memory after
/// [`inspect_archive`] accepted the archive. A member that inflates past its
/// declared size is rejected.
pub fn read_archive(bytes: &[u8], limits: &TransferLimits) -> TransferResult<ArchiveContents> {
    let info = inspect_archive(bytes, limits)?;
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut manifest = None;
    let mut files = BTreeMap::new();

    for index in 0..archive.len() {
        let member = archive.by_index(index)?;
        if member.is_dir() {
            continue;
        }
        let name = member.name().to_string();
        if member.enclosed_name().is_none() {
            return Err(TransferError::unsafe_archive(format!(
                "member path {} escapes the archive root",
                name
            )));
        }

        let declared = member.size();
        let mut data = Vec::with_capacity(declared.min(1 << 20) as usize);
        member.take(declared + 1).read_to_end(&mut data)?;
        if data.len() as u64 > declared {
            return Err(TransferError::unsafe_archive(format!(
                "member {} inflates past its declared size",
                name
            )));
        }

        if name == info.manifest_name {
            manifest = Some(data);
        } else if name != MANIFEST_NAME && name != LEGACY_MANIFEST_NAME {
            files.insert(name, data);
        }
    }

    let manifest = manifest
        .ok_or_else(|| TransferError::unsafe_archive("manifest member could not be read"))?;
    Ok(ArchiveContents {
        info,
        manifest,
        files,
    })
}
