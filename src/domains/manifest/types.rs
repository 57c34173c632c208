use serde::{Deserialize, Serialize};

pub const MEDIA_TYPES: &[&str] = &["audio", "video", "transcript"];

/// Nested export document as written to `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportManifest {
    pub user: ManifestUser,
    #[serde(default)]
    pub custom_statuses: Vec<CustomStatus>,
    #[serde(default)]
    pub custom_round_types: Vec<CustomRoundType>,
    #[serde(default)]
    pub applications: Vec<ManifestApplication>,
}

impl ImportManifest {
    pub fn round_count(&self) -> usize {
        self.applications.iter().map(|a| a.rounds.len()).sum()
    }

    pub fn status_history_count(&self) -> usize {
        self.applications.iter().map(|a| a.status_history.len()).sum()
    }

    pub fn media_count(&self) -> usize {
        self.applications
            .iter()
            .flat_map(|a| a.rounds.iter())
            .map(|r| r.media.len())
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomStatus {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRoundType {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestApplication {
    /// Id in the source account; only used to link files and references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub company: String,
    pub job_title: String,
    #[serde(default)]
    pub job_description: Option<String>,
    #[serde(default)]
    pub job_url: Option<String>,
    pub status: String,
    #[serde(default)]
    pub cv_path: Option<String>,
    pub applied_at: String,
    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry>,
    #[serde(default)]
    pub rounds: Vec<ManifestRound>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    #[serde(default)]
    pub from_status: Option<String>,
    pub to_status: String,
    pub changed_at: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRound {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub round_type: String,
    #[serde(default)]
    pub scheduled_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub notes_summary: Option<String>,
    #[serde(default)]
    pub media: Vec<ManifestMedia>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMedia {
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(default)]
    pub path: Option<String>,
}
