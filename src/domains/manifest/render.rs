use std::collections::HashMap;

use super::types::{
    CustomRoundType, CustomStatus, ImportManifest, ManifestApplication, ManifestMedia, ManifestRound,
    ManifestUser, StatusHistoryEntry,
};
use crate::domains::tracker::types::TrackerSnapshot;

const UNKNOWN_NAME: &str = "Unknown";

/// Renders a user's data as the nested manifest, ids included so files and
/// references can be linked again on import.
pub fn render_manifest(snapshot: &TrackerSnapshot) -> ImportManifest {
    let status_names: HashMap<&str, &str> = snapshot
        .statuses
        .iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect();
    let round_type_names: HashMap<&str, &str> = snapshot
        .round_types
        .iter()
        .map(|t| (t.id.as_str(), t.name.as_str()))
        .collect();

    let status_name = |id: Option<&str>| -> Option<String> {
        id.map(|id| match status_names.get(id) {
            Some(name) => name.to_string(),
            None => {
                log::warn!("Status {} not found while exporting, using {}", id, UNKNOWN_NAME);
                UNKNOWN_NAME.to_string()
            }
        })
    };

    let mut history_by_application: HashMap<&str, Vec<StatusHistoryEntry>> = HashMap::new();
    for row in &snapshot.status_history {
        history_by_application
            .entry(row.application_id.as_str())
            .or_default()
            .push(StatusHistoryEntry {
                from_status: status_name(row.from_status_id.as_deref()),
                to_status: status_name(row.to_status_id.as_deref())
                    .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                changed_at: row.changed_at.clone(),
                note: row.note.clone(),
            });
    }

    let mut media_by_round: HashMap<&str, Vec<ManifestMedia>> = HashMap::new();
    for row in &snapshot.media {
        media_by_round
            .entry(row.round_id.as_str())
            .or_default()
            .push(ManifestMedia {
                media_type: row.media_type.clone(),
                path: row.file_path.clone(),
            });
    }

    let mut rounds_by_application: HashMap<&str, Vec<ManifestRound>> = HashMap::new();
    for row in &snapshot.rounds {
        let round_type = row
            .round_type_id
            .as_deref()
            .and_then(|id| round_type_names.get(id))
            .map(|name| name.to_string())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string());
        rounds_by_application
            .entry(row.application_id.as_str())
            .or_default()
            .push(ManifestRound {
                id: Some(row.id.clone()),
                round_type,
                scheduled_at: row.scheduled_at.clone(),
                completed_at: row.completed_at.clone(),
                outcome: row.outcome.clone(),
                notes_summary: row.notes_summary.clone(),
                media: media_by_round.remove(row.id.as_str()).unwrap_or_default(),
            });
    }

    let applications = snapshot
        .applications
        .iter()
        .map(|row| ManifestApplication {
            id: Some(row.id.clone()),
            company: row.company.clone(),
            job_title: row.job_title.clone(),
            job_description: row.job_description.clone(),
            job_url: row.job_url.clone(),
            status: status_name(row.status_id.as_deref()).unwrap_or_else(|| UNKNOWN_NAME.to_string()),
            cv_path: row.cv_path.clone(),
            applied_at: row.applied_at.clone(),
            status_history: history_by_application.remove(row.id.as_str()).unwrap_or_default(),
            rounds: rounds_by_application.remove(row.id.as_str()).unwrap_or_default(),
        })
        .collect();

    ImportManifest {
        user: ManifestUser {
            id: Some(snapshot.user_id.clone()),
            email: snapshot.email.clone(),
        },
        custom_statuses: snapshot
            .statuses
            .iter()
            .filter(|s| s.user_id.is_some())
            .map(|s| CustomStatus {
                name: s.name.clone(),
                color: s.color.clone(),
                is_default: s.is_default,
                order: s.sort_order,
            })
            .collect(),
        custom_round_types: snapshot
            .round_types
            .iter()
            .filter(|t| t.user_id.is_some())
            .map(|t| CustomRoundType {
                name: t.name.clone(),
                is_default: t.is_default,
            })
            .collect(),
        applications,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tracker::types::{
        ApplicationRow, RoundMediaRow, RoundRow, RoundTypeRow, StatusHistoryRow, StatusRow,
    };

    fn snapshot() -> TrackerSnapshot {
        TrackerSnapshot {
            user_id: "user-1".to_string(),
            email: "jo@example.com".to_string(),
            statuses: vec![
                StatusRow {
                    id: "s-default".to_string(),
                    user_id: None,
                    name: "Applied".to_string(),
                    color: None,
                    is_default: true,
                    sort_order: Some(1),
                },
                StatusRow {
                    id: "s-custom".to_string(),
                    user_id: Some("user-1".to_string()),
                    name: "Screening".to_string(),
                    color: Some("#123456".to_string()),
                    is_default: false,
                    sort_order: None,
                },
            ],
            round_types: vec![RoundTypeRow {
                id: "rt-1".to_string(),
                user_id: None,
                name: "Technical".to_string(),
                is_default: true,
            }],
            applications: vec![ApplicationRow {
                id: "a-1".to_string(),
                company: "Acme".to_string(),
                job_title: "Engineer".to_string(),
                job_description: None,
                job_url: None,
                status_id: Some("s-custom".to_string()),
                cv_path: Some("applications/a-1/cv.pdf".to_string()),
                applied_at: "2026-01-02".to_string(),
            }],
            status_history: vec![StatusHistoryRow {
                id: "h-1".to_string(),
                application_id: "a-1".to_string(),
                from_status_id: Some("s-default".to_string()),
                to_status_id: Some("s-custom".to_string()),
                changed_at: "2026-01-03".to_string(),
                note: None,
            }],
            rounds: vec![RoundRow {
                id: "r-1".to_string(),
                application_id: "a-1".to_string(),
                round_type_id: Some("rt-missing".to_string()),
                scheduled_at: None,
                completed_at: None,
                outcome: None,
                notes_summary: None,
            }],
            media: vec![RoundMediaRow {
                id: "m-1".to_string(),
                round_id: "r-1".to_string(),
                media_type: "video".to_string(),
                file_path: Some("rounds/r-1/v.mp4".to_string()),
            }],
        }
    }

    #[test]
    fn test_render_nests_and_names_references() {
        let manifest = render_manifest(&snapshot());

        assert_eq!(manifest.user.email, "jo@example.com");
        assert_eq!(manifest.custom_statuses.len(), 1);
        assert_eq!(manifest.custom_statuses[0].name, "Screening");
        assert!(manifest.custom_round_types.is_empty());

        let application = &manifest.applications[0];
        assert_eq!(application.id.as_deref(), Some("a-1"));
        assert_eq!(application.status, "Screening");
        assert_eq!(application.status_history[0].from_status.as_deref(), Some("Applied"));
        assert_eq!(application.rounds[0].round_type, UNKNOWN_NAME);
        assert_eq!(application.rounds[0].media[0].path.as_deref(), Some("rounds/r-1/v.mp4"));
    }
}
