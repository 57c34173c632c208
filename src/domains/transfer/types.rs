use std::collections::BTreeMap;

use serde::Serialize;

use crate::domains::import::ImportReport;
use crate::domains::manifest::ImportManifest;
use crate::domains::registry::catalog::{APPLICATION, APPLICATION_STATUS_HISTORY, ROUND};

/// Headline counts shown for a validated, imported or exported archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub applications: usize,
    pub rounds: usize,
    pub status_history: usize,
    pub custom_statuses: usize,
    pub custom_round_types: usize,
    pub files: usize,
}

impl TransferSummary {
    pub fn from_manifest(manifest: &ImportManifest, files: usize) -> Self {
        Self {
            applications: manifest.applications.len(),
            rounds: manifest.round_count(),
            status_history: manifest.status_history_count(),
            custom_statuses: manifest.custom_statuses.len(),
            custom_round_types: manifest.custom_round_types.len(),
            files,
        }
    }

    /// Counts of rows actually written; custom lists come from the manifest.
    pub fn from_report(report: &ImportReport, manifest: &ImportManifest, files: usize) -> Self {
        Self {
            applications: report.count(APPLICATION),
            rounds: report.count(ROUND),
            status_history: report.count(APPLICATION_STATUS_HISTORY),
            custom_statuses: manifest.custom_statuses.len(),
            custom_round_types: manifest.custom_round_types.len(),
            files,
        }
    }
}

/// Answer to a validate-only call. Problems go into `errors`; the call itself
/// never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportValidationResponse {
    pub valid: bool,
    pub summary: Option<TransferSummary>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ImportValidationResponse {
    pub fn invalid(errors: Vec<String>) -> Self {
        Self {
            valid: false,
            summary: None,
            warnings: Vec::new(),
            errors,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub summary: TransferSummary,
    /// Rows written per entity type.
    pub counts: BTreeMap<String, usize>,
    pub unresolved_references: usize,
    pub warnings: Vec<String>,
}

/// A finished export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportArchive {
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
    pub summary: TransferSummary,
}
