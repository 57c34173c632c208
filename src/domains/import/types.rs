use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id_mapper::IdMapper;
use crate::errors::{TransferError, TransferResult};

pub const SUPPORTED_VERSION: &str = "1.0";
pub const ORIGINAL_ID_FIELD: &str = "__original_id__";

/// A single serialized record: field name to JSON value.
pub type EntityRecord = Map<String, Value>;

/// Registry-format export: records grouped by entity type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportData {
    pub export_version: String,
    pub models: BTreeMap<String, Vec<EntityRecord>>,
}

impl ExportData {
    pub fn new() -> Self {
        Self {
            export_version: SUPPORTED_VERSION.to_string(),
            models: BTreeMap::new(),
        }
    }

    /// Parses untrusted JSON, rejecting unknown versions before the body is
    /// looked at.
    pub fn from_value(value: Value) -> TransferResult<Self> {
        check_export_value(&value)?;
        serde_json::from_value(value)
            .map_err(|e| TransferError::InvalidExportData(e.to_string()))
    }

    pub fn push(&mut self, entity_type: &str, record: EntityRecord) {
        self.models
            .entry(entity_type.to_string())
            .or_default()
            .push(record);
    }

    pub fn records(&self, entity_type: &str) -> &[EntityRecord] {
        self.models
            .get(entity_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn record_count(&self, entity_type: &str) -> usize {
        self.records(entity_type).len()
    }
}

impl Default for ExportData {
    fn default() -> Self {
        Self::new()
    }
}

/// Structural check of a raw export document.
pub(crate) fn check_export_value(value: &Value) -> TransferResult<()> {
    match value.get("export_version") {
        None => {
            return Err(TransferError::InvalidExportData(
                "Missing export_version field".to_string(),
            ))
        }
        Some(Value::String(v)) if v == SUPPORTED_VERSION => {}
        Some(other) => {
            let found = match other {
                Value::String(v) => v.clone(),
                _ => format!("non-string value {}", other),
            };
            return Err(TransferError::VersionMismatch {
                found,
                expected: SUPPORTED_VERSION.to_string(),
            });
        }
    }
    match value.get("models") {
        None => Err(TransferError::InvalidExportData(
            "Missing models field".to_string(),
        )),
        Some(Value::Object(_)) => Ok(()),
        Some(_) => Err(TransferError::InvalidExportData(
            "models field must be a dictionary".to_string(),
        )),
    }
}

/// A foreign key value that had no mapping and was stored as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedReference {
    pub entity_type: String,
    pub index: usize,
    pub field: String,
    pub referenced_type: String,
    pub value: String,
}

/// Outcome of an import call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Imported record count per entity type, for every type present.
    pub counts: BTreeMap<String, usize>,
    pub unresolved_references: Vec<UnresolvedReference>,
    pub warnings: Vec<String>,
    /// Mappings minted during the import, used to attach restored files.
    #[serde(skip)]
    pub id_mapper: IdMapper,
}

impl ImportReport {
    pub fn count(&self, entity_type: &str) -> usize {
        self.counts.get(entity_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Per-type progress reported while an import runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeProgress<'a> {
    pub entity_type: &'a str,
    /// Zero-based position of this type among the types being imported.
    pub position: usize,
    pub type_count: usize,
    pub imported: usize,
}
