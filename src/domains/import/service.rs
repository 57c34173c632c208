use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use super::id_mapper::{reference_key, IdMapper};
use super::sink::RecordSink;
use super::types::{
    check_export_value, EntityRecord, ExportData, ImportReport, TypeProgress,
    UnresolvedReference, ORIGINAL_ID_FIELD, SUPPORTED_VERSION,
};
use crate::domains::registry::{ExportRegistry, RegisteredType};
use crate::errors::{TransferError, TransferResult};

/// Extra inputs for an import run.
#[derive(Default)]
pub struct ImportOptions<'a> {
    /// Mappings known before the run starts, e.g. destination records that
    /// imported rows should point at. Treated as resolved references.
    pub known_ids: IdMapper,
    /// Called after each entity type finishes.
    pub on_progress: Option<Box<dyn FnMut(TypeProgress<'_>) + Send + 'a>>,
}

/// Walks the export registry in order and persists every record of an
/// `ExportData` document through a [`RecordSink`], rewriting foreign keys.
pub struct ImportOrchestrator {
    registry: Arc<ExportRegistry>,
}

impl ImportOrchestrator {
    pub fn new(registry: Arc<ExportRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ExportRegistry {
        &self.registry
    }

    /// Structural check of a raw export document. Returns the reason on
    /// failure.
    pub fn validate_export_data(&self, data: &Value) -> (bool, Option<String>) {
        match check_export_value(data) {
            Ok(()) => (true, None),
            Err(TransferError::InvalidExportData(reason)) => (false, Some(reason)),
            Err(other) => (false, Some(other.to_string())),
        }
    }

    pub async fn import_user_data(
        &self,
        data: &ExportData,
        user_id: &str,
        override_existing: bool,
        sink: &mut dyn RecordSink,
    ) -> TransferResult<ImportReport> {
        self.import_with_options(data, user_id, override_existing, sink, ImportOptions::default())
            .await
    }

    /// Imports every registered type present in `data`, parents first.
    ///
    /// The first failing record aborts the run with `RecordImportFailure`;
    /// rows already handed to the sink are the sink's to roll back.
    pub async fn import_with_options(
        &self,
        data: &ExportData,
        user_id: &str,
        override_existing: bool,
        sink: &mut dyn RecordSink,
        options: ImportOptions<'_>,
    ) -> TransferResult<ImportReport> {
        if override_existing {
            return Err(TransferError::OverrideUnsupported);
        }
        if data.export_version != SUPPORTED_VERSION {
            return Err(TransferError::VersionMismatch {
                found: data.export_version.clone(),
                expected: SUPPORTED_VERSION.to_string(),
            });
        }

        let ImportOptions {
            known_ids,
            mut on_progress,
        } = options;

        let mut report = ImportReport {
            id_mapper: known_ids,
            ..ImportReport::default()
        };

        for (entity_type, records) in &data.models {
            if !self.registry.contains(entity_type) {
                log::warn!("Skipping {} records of unregistered type {}", records.len(), entity_type);
                report.warnings.push(format!(
                    "Skipped {} records of unknown type {}",
                    records.len(),
                    entity_type
                ));
            }
        }

        let present: Vec<&RegisteredType> = self
            .registry
            .get_ordered_types()
            .into_iter()
            .filter(|schema| data.models.contains_key(&schema.name))
            .collect();
        let type_count = present.len();

        for (position, schema) in present.into_iter().enumerate() {
            let records = data.records(&schema.name);
            log::debug!("Importing {} {} records", records.len(), schema.name);

            for (index, record) in records.iter().enumerate() {
                let row = Self::prepare_record(schema, index, record, user_id, &mut report);
                let new_id = row
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();

                if let Err(e) = sink.insert(schema, &row).await {
                    log::error!("Import of {} record #{} failed: {}", schema.name, index, e);
                    return Err(TransferError::RecordImportFailure {
                        entity_type: schema.name.clone(),
                        index,
                        reason: e.to_string(),
                    });
                }

                if let Some(original_id) = original_id(record) {
                    report.id_mapper.add(&schema.name, &original_id, &new_id);
                }
            }

            report.counts.insert(schema.name.clone(), records.len());
            if let Some(callback) = on_progress.as_mut() {
                callback(TypeProgress {
                    entity_type: &schema.name,
                    position,
                    type_count,
                    imported: records.len(),
                });
            }
        }

        Self::summarize_unresolved(&mut report);
        log::info!(
            "Imported {} records across {} types for user {}",
            report.total(),
            report.counts.len(),
            user_id
        );
        Ok(report)
    }

    /// Builds the row to persist: declared fields only, foreign keys remapped,
    /// fresh id, owner attached.
    fn prepare_record(
        schema: &RegisteredType,
        index: usize,
        record: &EntityRecord,
        user_id: &str,
        report: &mut ImportReport,
    ) -> EntityRecord {
        let mut remapped = record.clone();
        for fk in &schema.foreign_keys {
            remapped = report
                .id_mapper
                .remap_foreign_key(&remapped, &fk.field, &fk.references);

            if let Some(old) = record.get(&fk.field).and_then(reference_key) {
                if !report.id_mapper.has_mapping(&fk.references, &old) {
                    report.unresolved_references.push(UnresolvedReference {
                        entity_type: schema.name.clone(),
                        index,
                        field: fk.field.clone(),
                        referenced_type: fk.references.clone(),
                        value: old,
                    });
                }
            }
        }

        let mut row = EntityRecord::new();
        row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        if schema.user_owned {
            row.insert("user_id".to_string(), Value::String(user_id.to_string()));
        }
        for field in &schema.fields {
            if let Some(value) = remapped.get(field) {
                row.insert(field.clone(), value.clone());
            }
        }

        let dropped = record
            .keys()
            .filter(|k| k.as_str() != ORIGINAL_ID_FIELD && !schema.has_field(k))
            .count();
        if dropped > 0 {
            log::debug!("Dropped {} undeclared fields from {} record #{}", dropped, schema.name, index);
        }
        row
    }

    fn summarize_unresolved(report: &mut ImportReport) {
        let mut per_field: BTreeMap<(String, String), usize> = BTreeMap::new();
        for unresolved in &report.unresolved_references {
            *per_field
                .entry((unresolved.entity_type.clone(), unresolved.field.clone()))
                .or_default() += 1;
        }
        for ((entity_type, field), count) in per_field {
            log::warn!("{} unresolved {}.{} references kept unchanged", count, entity_type, field);
            report.warnings.push(format!(
                "{} {}.{} reference(s) did not match an imported record and were kept unchanged",
                count, entity_type, field
            ));
        }
    }
}

/// Original id of a record, when present and non-empty.
fn original_id(record: &EntityRecord) -> Option<String> {
    record.get(ORIGINAL_ID_FIELD).and_then(reference_key)
}
