use super::{ExportRegistry, RegisteredType};
use crate::errors::TransferResult;

pub const APPLICATION_STATUS: &str = "ApplicationStatus";
pub const ROUND_TYPE: &str = "RoundType";
pub const APPLICATION: &str = "Application";
pub const APPLICATION_STATUS_HISTORY: &str = "ApplicationStatusHistory";
pub const ROUND: &str = "Round";
pub const ROUND_MEDIA: &str = "RoundMedia";

/// The job tracker's exportable types, registered parents first.
pub fn default_registry() -> TransferResult<ExportRegistry> {
    let mut registry = ExportRegistry::new();

    registry.register(
        RegisteredType::new(APPLICATION_STATUS, 1, "application_statuses")
            .fields(&["name", "color", "sort_order"])
            .user_owned(),
    )?;
    registry.register(
        RegisteredType::new(ROUND_TYPE, 1, "round_types")
            .fields(&["name"])
            .user_owned(),
    )?;
    registry.register(
        RegisteredType::new(APPLICATION, 2, "applications")
            .fields(&[
                "company",
                "job_title",
                "job_description",
                "job_url",
                "cv_path",
                "applied_at",
            ])
            .foreign_key("status_id", APPLICATION_STATUS)
            .user_owned(),
    )?;
    registry.register(
        RegisteredType::new(APPLICATION_STATUS_HISTORY, 3, "application_status_history")
            .fields(&["changed_at", "note"])
            .foreign_key("application_id", APPLICATION)
            .foreign_key("from_status_id", APPLICATION_STATUS)
            .foreign_key("to_status_id", APPLICATION_STATUS),
    )?;
    registry.register(
        RegisteredType::new(ROUND, 3, "rounds")
            .fields(&["scheduled_at", "completed_at", "outcome", "notes_summary"])
            .foreign_key("application_id", APPLICATION)
            .foreign_key("round_type_id", ROUND_TYPE),
    )?;
    registry.register(
        RegisteredType::new(ROUND_MEDIA, 4, "round_media")
            .fields(&["media_type", "file_path"])
            .foreign_key("round_id", ROUND),
    )?;

    registry.verify()?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry_order() {
        let registry = default_registry().unwrap();
        let names: Vec<&str> = registry
            .get_ordered_types()
            .into_iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                APPLICATION_STATUS,
                ROUND_TYPE,
                APPLICATION,
                APPLICATION_STATUS_HISTORY,
                ROUND,
                ROUND_MEDIA
            ]
        );
    }

    #[test]
    fn test_application_columns() {
        let registry = default_registry().unwrap();
        let application = registry.get(APPLICATION).unwrap();
        let columns = application.columns();
        assert_eq!(&columns[..2], &["id", "user_id"]);
        assert!(columns.contains(&"status_id"));
        assert_eq!(
            application.foreign_key_for("status_id").unwrap().references,
            APPLICATION_STATUS
        );

        let round = registry.get(ROUND).unwrap();
        assert!(!round.columns().contains(&"user_id"));
    }
}
