use serde::Serialize;
use sqlx::FromRow;

/// Status visible to a user: their own plus the shared defaults.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct StatusRow {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub color: Option<String>,
    pub is_default: bool,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct RoundTypeRow {
    pub id: String,
    pub user_id: Option<String>,
    pub name: String,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct ApplicationRow {
    pub id: String,
    pub company: String,
    pub job_title: String,
    pub job_description: Option<String>,
    pub job_url: Option<String>,
    pub status_id: Option<String>,
    pub cv_path: Option<String>,
    pub applied_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct StatusHistoryRow {
    pub id: String,
    pub application_id: String,
    pub from_status_id: Option<String>,
    pub to_status_id: Option<String>,
    pub changed_at: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct RoundRow {
    pub id: String,
    pub application_id: String,
    pub round_type_id: Option<String>,
    pub scheduled_at: Option<String>,
    pub completed_at: Option<String>,
    pub outcome: Option<String>,
    pub notes_summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct RoundMediaRow {
    pub id: String,
    pub round_id: String,
    pub media_type: String,
    pub file_path: Option<String>,
}

/// Everything one user owns, read in a single pass for export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerSnapshot {
    pub user_id: String,
    pub email: String,
    pub statuses: Vec<StatusRow>,
    pub round_types: Vec<RoundTypeRow>,
    pub applications: Vec<ApplicationRow>,
    pub status_history: Vec<StatusHistoryRow>,
    pub rounds: Vec<RoundRow>,
    pub media: Vec<RoundMediaRow>,
}
