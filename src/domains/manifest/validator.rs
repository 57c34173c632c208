use once_cell::sync::Lazy;
use serde_json::{json, Value};

use super::types::{ImportManifest, ManifestApplication, ManifestRound, MEDIA_TYPES};
use crate::errors::{TransferError, TransferResult, ValidationError};
use crate::validation::{NestedValidator, ValidationBuilder};

/// Structural contract of `manifest.json`: shapes and required keys only.
/// Length, format and count rules are checked afterwards.
static MANIFEST_SCHEMA: Lazy<Value> = Lazy::new(|| {
    let optional_string = json!({"type": ["string", "null"]});
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["user"],
        "properties": {
            "user": {
                "type": "object",
                "required": ["email"],
                "properties": {
                    "id": optional_string,
                    "email": {"type": "string"}
                }
            },
            "custom_statuses": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "color": optional_string,
                        "is_default": {"type": "boolean"},
                        "order": {"type": ["integer", "null"]}
                    }
                }
            },
            "custom_round_types": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string"},
                        "is_default": {"type": "boolean"}
                    }
                }
            },
            "applications": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["company", "job_title", "status", "applied_at"],
                    "properties": {
                        "id": optional_string,
                        "company": {"type": "string"},
                        "job_title": {"type": "string"},
                        "job_description": optional_string,
                        "job_url": optional_string,
                        "status": {"type": "string"},
                        "cv_path": optional_string,
                        "applied_at": {"type": "string"},
                        "status_history": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["to_status", "changed_at"],
                                "properties": {
                                    "from_status": optional_string,
                                    "to_status": {"type": "string"},
                                    "changed_at": {"type": "string"},
                                    "note": optional_string
                                }
                            }
                        },
                        "rounds": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["type"],
                                "properties": {
                                    "id": optional_string,
                                    "type": {"type": "string"},
                                    "scheduled_at": optional_string,
                                    "completed_at": optional_string,
                                    "outcome": optional_string,
                                    "notes_summary": optional_string,
                                    "media": {
                                        "type": "array",
                                        "items": {
                                            "type": "object",
                                            "required": ["type"],
                                            "properties": {
                                                "type": {"type": "string"},
                                                "path": optional_string
                                            }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    })
});

static MANIFEST_VALIDATOR: Lazy<jsonschema::Validator> = Lazy::new(|| {
    jsonschema::validator_for(&MANIFEST_SCHEMA).expect("manifest schema is a valid draft-07 schema")
});

/// Decodes and validates an untrusted manifest. Every problem found is
/// returned together in `SchemaInvalid`.
pub fn parse_manifest(bytes: &[u8], max_applications: usize) -> TransferResult<ImportManifest> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        TransferError::SchemaInvalid(vec![format!("manifest is not valid JSON: {}", e)])
    })?;
    validate_manifest_value(&value, max_applications)
}

pub fn validate_manifest_value(value: &Value, max_applications: usize) -> TransferResult<ImportManifest> {
    let structural = structural_errors(value);
    if !structural.is_empty() {
        return Err(TransferError::SchemaInvalid(structural));
    }

    let manifest: ImportManifest = serde_json::from_value(value.clone())
        .map_err(|e| TransferError::SchemaInvalid(vec![e.to_string()]))?;

    let errors = semantic_errors(&manifest, max_applications);
    if !errors.is_empty() {
        log::debug!("Manifest rejected with {} errors", errors.len());
        return Err(TransferError::SchemaInvalid(errors));
    }
    Ok(manifest)
}

fn structural_errors(value: &Value) -> Vec<String> {
    MANIFEST_VALIDATOR
        .iter_errors(value)
        .map(|error| {
            let path = error.instance_path.to_string();
            if path.is_empty() {
                format!("manifest: {}", error)
            } else {
                format!("{}: {}", path, error)
            }
        })
        .collect()
}

fn text(field: &str, value: &str) -> ValidationBuilder<String> {
    ValidationBuilder::new(field, Some(value.to_string()))
}

fn optional_text(field: &str, value: &Option<String>) -> ValidationBuilder<String> {
    ValidationBuilder::new(field, value.clone())
}

fn semantic_errors(manifest: &ImportManifest, max_applications: usize) -> Vec<String> {
    let mut nested = NestedValidator::new();

    nested.check(text("user.email", &manifest.user.email).min_length(5).email());

    for (i, status) in manifest.custom_statuses.iter().enumerate() {
        let field = format!("custom_statuses[{}]", i);
        nested.check(text(&format!("{}.name", field), &status.name).min_length(1).max_length(100));
        nested.check(optional_text(&format!("{}.color", field), &status.color).hex_colour());
    }

    for (i, round_type) in manifest.custom_round_types.iter().enumerate() {
        nested.check(
            text(&format!("custom_round_types[{}].name", i), &round_type.name)
                .min_length(1)
                .max_length(100),
        );
    }

    if manifest.applications.len() > max_applications {
        nested.add_error(ValidationError::custom(&format!(
            "Cannot import more than {} applications at once",
            max_applications
        )));
    }

    for (i, application) in manifest.applications.iter().enumerate() {
        check_application(&mut nested, &format!("applications[{}]", i), application);
    }

    nested.into_errors().into_iter().map(|e| e.to_string()).collect()
}

fn check_application(nested: &mut NestedValidator, field: &str, application: &ManifestApplication) {
    nested.check(text(&format!("{}.company", field), &application.company).min_length(1).max_length(200));
    nested.check(text(&format!("{}.job_title", field), &application.job_title).min_length(1).max_length(200));
    nested.check(text(&format!("{}.status", field), &application.status).min_length(1).max_length(100));
    nested.check(optional_text(&format!("{}.job_url", field), &application.job_url).http_url());
    nested.check(optional_text(&format!("{}.cv_path", field), &application.cv_path).max_length(500));
    nested.check(text(&format!("{}.applied_at", field), &application.applied_at).min_length(1).iso8601());

    for (h, entry) in application.status_history.iter().enumerate() {
        let entry_field = format!("{}.status_history[{}]", field, h);
        nested.check(
            optional_text(&format!("{}.from_status", entry_field), &entry.from_status).max_length(100),
        );
        nested.check(
            text(&format!("{}.to_status", entry_field), &entry.to_status)
                .min_length(1)
                .max_length(100),
        );
        nested.check(
            text(&format!("{}.changed_at", entry_field), &entry.changed_at)
                .min_length(1)
                .iso8601(),
        );
    }

    for (r, round) in application.rounds.iter().enumerate() {
        check_round(nested, &format!("{}.rounds[{}]", field, r), round);
    }
}

fn check_round(nested: &mut NestedValidator, field: &str, round: &ManifestRound) {
    nested.check(text(&format!("{}.type", field), &round.round_type).min_length(1).max_length(100));
    nested.check(optional_text(&format!("{}.scheduled_at", field), &round.scheduled_at).iso8601());
    nested.check(optional_text(&format!("{}.completed_at", field), &round.completed_at).iso8601());

    for (m, media) in round.media.iter().enumerate() {
        let media_field = format!("{}.media[{}]", field, m);
        nested.check(
            text(&format!("{}.type", media_field), &media.media_type)
                .one_of(MEDIA_TYPES, Some("must be one of audio, video, transcript")),
        );
        nested.check(optional_text(&format!("{}.path", media_field), &media.path).max_length(500));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_manifest() -> Value {
        json!({
            "user": {"email": "jo@example.com"},
            "custom_statuses": [{"name": "Screening", "color": "#10B981"}],
            "applications": [{
                "id": "app-1",
                "company": "Acme",
                "job_title": "Backend Engineer",
                "job_url": "https://acme.example/jobs/1",
                "status": "Applied",
                "applied_at": "2026-01-05T09:00:00Z",
                "status_history": [
                    {"from_status": null, "to_status": "Applied", "changed_at": "2026-01-05T09:00:00Z"}
                ],
                "rounds": [{
                    "id": "round-1",
                    "type": "Technical",
                    "scheduled_at": "2026-01-12T14:00:00",
                    "media": [{"type": "audio", "path": "rounds/r1.mp3"}]
                }]
            }]
        })
    }

    fn errors_of(value: Value, max: usize) -> Vec<String> {
        match validate_manifest_value(&value, max) {
            Err(TransferError::SchemaInvalid(errors)) => errors,
            other => panic!("expected SchemaInvalid, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_manifest_parses() {
        let bytes = serde_json::to_vec(&valid_manifest()).unwrap();
        let manifest = parse_manifest(&bytes, 1000).unwrap();
        assert_eq!(manifest.applications.len(), 1);
        assert_eq!(manifest.round_count(), 1);
        assert_eq!(manifest.status_history_count(), 1);
        assert!(manifest.custom_round_types.is_empty());
    }

    #[test]
    fn test_lists_default_to_empty() {
        let manifest = validate_manifest_value(&json!({"user": {"email": "jo@example.com"}}), 1000).unwrap();
        assert!(manifest.applications.is_empty());
        assert!(manifest.custom_statuses.is_empty());
    }

    #[test]
    fn test_structural_errors_are_reported() {
        let errors = errors_of(json!({"applications": [{"company": 5}]}), 1000);
        assert!(errors.iter().any(|e| e.contains("user")));
        assert!(errors.iter().any(|e| e.starts_with("/applications/0")));
    }

    #[test]
    fn test_collects_every_field_error() {
        let mut value = valid_manifest();
        value["user"]["email"] = json!("jo@example");
        value["custom_statuses"][0]["color"] = json!("green");
        value["applications"][0]["company"] = json!("x".repeat(201));
        value["applications"][0]["job_url"] = json!("ftp://acme.example");
        value["applications"][0]["applied_at"] = json!("last tuesday");
        value["applications"][0]["rounds"][0]["media"][0]["type"] = json!("image");

        let errors = errors_of(value, 1000);
        assert_eq!(errors.len(), 6, "{:?}", errors);
        assert!(errors.iter().any(|e| e.contains("Invalid datetime format: last tuesday")));
        assert!(errors.iter().any(|e| e.contains("applications[0].company")));
        assert!(errors.iter().any(|e| e.contains("rounds[0].media[0].type")));
    }

    #[test]
    fn test_application_limit() {
        let mut value = valid_manifest();
        let app = value["applications"][0].clone();
        value["applications"] = json!([app.clone(), app.clone(), app]);

        let errors = errors_of(value, 2);
        assert_eq!(errors, vec!["Validation error: Cannot import more than 2 applications at once".to_string()]);
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_manifest(b"{not json", 1000).unwrap_err();
        assert!(matches!(err, TransferError::SchemaInvalid(ref e) if e[0].contains("not valid JSON")));
    }
}
