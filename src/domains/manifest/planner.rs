use std::collections::{HashMap, HashSet};

use serde_json::{json, Value};

use super::types::ImportManifest;
use crate::domains::archive::types::{application_cv_name, file_suffix, round_media_name};
use crate::domains::import::{EntityRecord, ExportData, IdMapper, ORIGINAL_ID_FIELD};
use crate::domains::registry::catalog::{
    APPLICATION, APPLICATION_STATUS, APPLICATION_STATUS_HISTORY, ROUND, ROUND_MEDIA, ROUND_TYPE,
};

/// Names already present in the destination account, mapped to their ids.
pub type ExistingNames = HashMap<String, String>;

/// A media file inside the archive that should be stored and linked to the
/// record imported under `original_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMedia {
    pub archive_name: String,
    pub entity_type: &'static str,
    pub original_id: String,
    /// Column that receives the stored file's path.
    pub field: &'static str,
    /// Directory the file is stored under.
    pub storage_kind: &'static str,
}

#[derive(Debug, Clone)]
pub struct ImportPlan {
    pub export_data: ExportData,
    /// Statuses referenced by applications or history that will be created.
    pub new_status_names: Vec<String>,
    pub new_round_type_names: Vec<String>,
    pub media: Vec<PlannedMedia>,
    /// Existing destination records that imported rows point at.
    pub known_ids: IdMapper,
}

impl ImportPlan {
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.new_status_names.is_empty() {
            warnings.push(missing_status_warning(&self.new_status_names));
        }
        if !self.new_round_type_names.is_empty() {
            warnings.push(missing_names_warning("round types", &self.new_round_type_names));
        }
        warnings
    }
}

/// "Will create N new statuses: a, b" listing at most five names.
pub fn missing_status_warning(names: &[String]) -> String {
    missing_names_warning("statuses", names)
}

fn missing_names_warning(kind: &str, names: &[String]) -> String {
    let mut listed = names.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    if names.len() > 5 {
        listed.push_str("...");
    }
    format!("Will create {} new {}: {}", names.len(), kind, listed)
}

/// Resolves names to ids, creating records for names the account lacks.
struct NameResolver<'a> {
    entity_type: &'static str,
    key_prefix: &'static str,
    existing: &'a ExistingNames,
    created: HashMap<String, String>,
    records: Vec<EntityRecord>,
}

impl<'a> NameResolver<'a> {
    fn new(entity_type: &'static str, key_prefix: &'static str, existing: &'a ExistingNames) -> Self {
        Self {
            entity_type,
            key_prefix,
            existing,
            created: HashMap::new(),
            records: Vec::new(),
        }
    }

    fn is_known(&self, name: &str) -> bool {
        self.existing.contains_key(name) || self.created.contains_key(name)
    }

    /// Id to reference for `name`, creating a record on first sight.
    fn resolve(&mut self, name: &str, extra: EntityRecord, known_ids: &mut IdMapper) -> String {
        if let Some(id) = self.existing.get(name) {
            known_ids.add(self.entity_type, id, id);
            return id.clone();
        }
        if let Some(key) = self.created.get(name) {
            return key.clone();
        }

        let key = format!("{}:{}", self.key_prefix, name);
        let mut record = extra;
        record.insert(ORIGINAL_ID_FIELD.to_string(), json!(key));
        record.insert("name".to_string(), json!(name));
        self.records.push(record);
        self.created.insert(name.to_string(), key.clone());
        key
    }
}

fn record(value: Value) -> EntityRecord {
    match value {
        Value::Object(map) => map,
        _ => EntityRecord::new(),
    }
}

/// Picks the import key for a record. The manifest id is used on its first
/// occurrence; absent, empty or repeated ids fall back to `positional`.
/// Returns the key and whether the manifest id was kept.
fn claim_key(used: &mut HashSet<String>, id: Option<&String>, positional: String) -> (String, bool) {
    if let Some(id) = id.filter(|id| !id.is_empty()) {
        if used.insert(id.clone()) {
            return (id.clone(), true);
        }
        log::warn!("Duplicate manifest id {} imported as {}", id, positional);
    }
    used.insert(positional.clone());
    (positional, false)
}

/// Converts a validated nested manifest into registry-format export data for
/// the destination account.
///
/// `archive_files` lists archive member names; only media present there are
/// planned for restore. Source file paths are never carried over.
pub fn plan_import(
    manifest: &ImportManifest,
    existing_statuses: &ExistingNames,
    existing_round_types: &ExistingNames,
    archive_files: &[String],
) -> ImportPlan {
    let mut known_ids = IdMapper::new();
    let mut statuses = NameResolver::new(APPLICATION_STATUS, "status", existing_statuses);
    let mut round_types = NameResolver::new(ROUND_TYPE, "round_type", existing_round_types);
    let mut new_status_names: Vec<String> = Vec::new();
    let mut new_round_type_names: Vec<String> = Vec::new();
    let mut data = ExportData::new();
    let mut media = Vec::new();
    let mut application_keys = HashSet::new();
    let mut round_keys = HashSet::new();

    for custom in &manifest.custom_statuses {
        statuses.resolve(
            &custom.name,
            record(json!({"color": custom.color, "sort_order": custom.order})),
            &mut known_ids,
        );
    }
    for custom in &manifest.custom_round_types {
        round_types.resolve(&custom.name, EntityRecord::new(), &mut known_ids);
    }

    for (a, application) in manifest.applications.iter().enumerate() {
        let (app_key, own_app_id) = claim_key(
            &mut application_keys,
            application.id.as_ref(),
            format!("application:{}", a),
        );

        let mut referenced = vec![application.status.as_str()];
        for entry in &application.status_history {
            referenced.extend(entry.from_status.as_deref());
            referenced.push(entry.to_status.as_str());
        }
        for name in referenced {
            if !existing_statuses.contains_key(name) && !new_status_names.iter().any(|n| n == name) {
                new_status_names.push(name.to_string());
            }
        }

        let status_id = statuses.resolve(&application.status, EntityRecord::new(), &mut known_ids);
        data.push(
            APPLICATION,
            record(json!({
                ORIGINAL_ID_FIELD: app_key,
                "company": application.company,
                "job_title": application.job_title,
                "job_description": application.job_description,
                "job_url": application.job_url,
                "cv_path": Value::Null,
                "applied_at": application.applied_at,
                "status_id": status_id,
            })),
        );

        if let (true, Some(id), Some(cv_path)) = (own_app_id, &application.id, &application.cv_path) {
            let archive_name = application_cv_name(id, &file_suffix(cv_path));
            if archive_files.contains(&archive_name) {
                media.push(PlannedMedia {
                    archive_name,
                    entity_type: APPLICATION,
                    original_id: app_key.clone(),
                    field: "cv_path",
                    storage_kind: "applications",
                });
            }
        }

        for (h, entry) in application.status_history.iter().enumerate() {
            let from_status_id = entry
                .from_status
                .as_deref()
                .map(|name| statuses.resolve(name, EntityRecord::new(), &mut known_ids));
            let to_status_id = statuses.resolve(&entry.to_status, EntityRecord::new(), &mut known_ids);
            data.push(
                APPLICATION_STATUS_HISTORY,
                record(json!({
                    ORIGINAL_ID_FIELD: format!("history:{}:{}", a, h),
                    "application_id": app_key,
                    "from_status_id": from_status_id,
                    "to_status_id": to_status_id,
                    "changed_at": entry.changed_at,
                    "note": entry.note,
                })),
            );
        }

        for (r, round) in application.rounds.iter().enumerate() {
            let (round_key, own_round_id) =
                claim_key(&mut round_keys, round.id.as_ref(), format!("round:{}:{}", a, r));
            if !round_types.is_known(&round.round_type)
                && !new_round_type_names.contains(&round.round_type)
            {
                new_round_type_names.push(round.round_type.clone());
            }
            let round_type_id = round_types.resolve(&round.round_type, EntityRecord::new(), &mut known_ids);

            data.push(
                ROUND,
                record(json!({
                    ORIGINAL_ID_FIELD: round_key,
                    "application_id": app_key,
                    "round_type_id": round_type_id,
                    "scheduled_at": round.scheduled_at,
                    "completed_at": round.completed_at,
                    "outcome": round.outcome,
                    "notes_summary": round.notes_summary,
                })),
            );

            for (m, item) in round.media.iter().enumerate() {
                let media_key = format!("round_media:{}:{}:{}", a, r, m);
                data.push(
                    ROUND_MEDIA,
                    record(json!({
                        ORIGINAL_ID_FIELD: media_key,
                        "round_id": round_key,
                        "media_type": item.media_type,
                        "file_path": Value::Null,
                    })),
                );

                if let (true, Some(id), Some(path)) = (own_round_id, &round.id, &item.path) {
                    let archive_name = round_media_name(id, &item.media_type, &file_suffix(path));
                    if archive_files.contains(&archive_name) {
                        media.push(PlannedMedia {
                            archive_name,
                            entity_type: ROUND_MEDIA,
                            original_id: media_key,
                            field: "file_path",
                            storage_kind: "rounds",
                        });
                    }
                }
            }
        }
    }

    for status in statuses.records {
        data.push(APPLICATION_STATUS, status);
    }
    for round_type in round_types.records {
        data.push(ROUND_TYPE, round_type);
    }
    for entity_type in [
        APPLICATION_STATUS,
        ROUND_TYPE,
        APPLICATION,
        APPLICATION_STATUS_HISTORY,
        ROUND,
        ROUND_MEDIA,
    ] {
        data.models.entry(entity_type.to_string()).or_default();
    }

    ImportPlan {
        export_data: data,
        new_status_names,
        new_round_type_names,
        media,
        known_ids,
    }
}
