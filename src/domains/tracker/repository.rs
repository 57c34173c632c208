use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::{Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{query, query_as, query_scalar, Pool, Row, Sqlite, TypeInfo, ValueRef};

use super::types::{
    ApplicationRow, RoundMediaRow, RoundRow, RoundTypeRow, StatusHistoryRow, StatusRow, TrackerSnapshot,
};
use crate::domains::core::utils::quote_identifier;
use crate::domains::import::{EntityRecord, ExportData, ORIGINAL_ID_FIELD};
use crate::domains::registry::{ExportRegistry, RegisteredType};
use crate::errors::{DbError, DomainError, DomainResult};

/// Read access to the job tracker tables used by export and import.
#[async_trait]
pub trait TrackerRepository: Send + Sync {
    async fn find_user_email(&self, user_id: &str) -> DomainResult<Option<String>>;

    /// Inserts the user, or updates the email of an existing one.
    async fn upsert_user(&self, user_id: &str, email: &str) -> DomainResult<()>;

    /// Status names visible to the user mapped to ids. A user's own status
    /// wins over a shared default of the same name.
    async fn status_ids_by_name(&self, user_id: &str) -> DomainResult<HashMap<String, String>>;

    async fn round_type_ids_by_name(&self, user_id: &str) -> DomainResult<HashMap<String, String>>;

    async fn count_applications(&self, user_id: &str) -> DomainResult<i64>;

    async fn snapshot(&self, user_id: &str) -> DomainResult<TrackerSnapshot>;

    /// Every registered type's rows owned by the user, in registry format.
    async fn export_records(&self, registry: &ExportRegistry, user_id: &str) -> DomainResult<ExportData>;
}

pub struct SqliteTrackerRepository {
    pool: Pool<Sqlite>,
}

impl SqliteTrackerRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn names_to_ids(&self, table: &str, user_id: &str) -> DomainResult<HashMap<String, String>> {
        // User rows sort first so they shadow defaults with the same name.
        let sql = format!(
            "SELECT name, id FROM {} WHERE user_id = ? OR user_id IS NULL ORDER BY user_id IS NULL, rowid",
            quote_identifier(table)
        );
        let rows: Vec<(String, String)> = query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;

        let mut names = HashMap::new();
        for (name, id) in rows {
            names.entry(name).or_insert(id);
        }
        Ok(names)
    }
}

/// SQL condition selecting the rows of `schema` owned by one user. Child types
/// follow their first foreign key up to a user-owned ancestor; the single `?`
/// binds the user id.
fn ownership_clause(registry: &ExportRegistry, schema: &RegisteredType, seen: &mut HashSet<String>) -> Option<String> {
    if schema.user_owned {
        return Some("user_id = ?".to_string());
    }
    if !seen.insert(schema.name.clone()) {
        return None;
    }
    schema.foreign_keys.iter().find_map(|fk| {
        let parent = registry.get(&fk.references)?;
        let parent_clause = ownership_clause(registry, parent, seen)?;
        Some(format!(
            "{} IN (SELECT id FROM {} WHERE {})",
            quote_identifier(&fk.field),
            quote_identifier(&parent.table),
            parent_clause
        ))
    })
}

/// Decodes a column by its runtime SQLite storage class.
fn column_value(row: &SqliteRow, index: usize) -> DomainResult<Value> {
    let raw = row.try_get_raw(index).map_err(DbError::from)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();
    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(index).map_err(DbError::from)?),
        "REAL" => Number::from_f64(row.try_get::<f64, _>(index).map_err(DbError::from)?)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BLOB" => Value::String(hex::encode(row.try_get::<Vec<u8>, _>(index).map_err(DbError::from)?)),
        _ => Value::String(row.try_get::<String, _>(index).map_err(DbError::from)?),
    };
    Ok(value)
}

#[async_trait]
impl TrackerRepository for SqliteTrackerRepository {
    async fn find_user_email(&self, user_id: &str) -> DomainResult<Option<String>> {
        let email = query_scalar::<_, String>("SELECT email FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(email)
    }

    async fn upsert_user(&self, user_id: &str, email: &str) -> DomainResult<()> {
        query("INSERT INTO users (id, email) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET email = excluded.email")
            .bind(user_id)
            .bind(email)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    async fn status_ids_by_name(&self, user_id: &str) -> DomainResult<HashMap<String, String>> {
        self.names_to_ids("application_statuses", user_id).await
    }

    async fn round_type_ids_by_name(&self, user_id: &str) -> DomainResult<HashMap<String, String>> {
        self.names_to_ids("round_types", user_id).await
    }

    async fn count_applications(&self, user_id: &str) -> DomainResult<i64> {
        let count = query_scalar::<_, i64>("SELECT COUNT(*) FROM applications WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;
        Ok(count)
    }

    async fn snapshot(&self, user_id: &str) -> DomainResult<TrackerSnapshot> {
        let email = self
            .find_user_email(user_id)
            .await?
            .ok_or_else(|| DomainError::Database(DbError::NotFound("User".to_string(), user_id.to_string())))?;

        let statuses = query_as::<_, StatusRow>(
            "SELECT id, user_id, name, color, is_default, sort_order FROM application_statuses
             WHERE user_id = ? OR user_id IS NULL ORDER BY sort_order IS NULL, sort_order, name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let round_types = query_as::<_, RoundTypeRow>(
            "SELECT id, user_id, name, is_default FROM round_types
             WHERE user_id = ? OR user_id IS NULL ORDER BY name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let applications = query_as::<_, ApplicationRow>(
            "SELECT id, company, job_title, job_description, job_url, status_id, cv_path, applied_at
             FROM applications WHERE user_id = ? ORDER BY applied_at, rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let status_history = query_as::<_, StatusHistoryRow>(
            "SELECT h.id, h.application_id, h.from_status_id, h.to_status_id, h.changed_at, h.note
             FROM application_status_history h
             JOIN applications a ON a.id = h.application_id
             WHERE a.user_id = ? ORDER BY h.changed_at, h.rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let rounds = query_as::<_, RoundRow>(
            "SELECT r.id, r.application_id, r.round_type_id, r.scheduled_at, r.completed_at, r.outcome, r.notes_summary
             FROM rounds r
             JOIN applications a ON a.id = r.application_id
             WHERE a.user_id = ? ORDER BY r.scheduled_at IS NULL, r.scheduled_at, r.rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let media = query_as::<_, RoundMediaRow>(
            "SELECT m.id, m.round_id, m.media_type, m.file_path
             FROM round_media m
             JOIN rounds r ON r.id = m.round_id
             JOIN applications a ON a.id = r.application_id
             WHERE a.user_id = ? ORDER BY m.rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        log::debug!(
            "Snapshot for user {}: {} applications, {} rounds, {} history entries",
            user_id,
            applications.len(),
            rounds.len(),
            status_history.len()
        );

        Ok(TrackerSnapshot {
            user_id: user_id.to_string(),
            email,
            statuses,
            round_types,
            applications,
            status_history,
            rounds,
            media,
        })
    }

    async fn export_records(&self, registry: &ExportRegistry, user_id: &str) -> DomainResult<ExportData> {
        let mut data = ExportData::new();

        for schema in registry.get_ordered_types() {
            let Some(clause) = ownership_clause(registry, schema, &mut HashSet::new()) else {
                log::warn!("No ownership path for {}, leaving it out of the export", schema.name);
                continue;
            };

            let mut columns = vec!["id"];
            columns.extend(schema.fields.iter().map(String::as_str));
            let sql = format!(
                "SELECT {} FROM {} WHERE {} ORDER BY rowid",
                columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", "),
                quote_identifier(&schema.table),
                clause
            );

            let rows = query(&sql)
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::from)?;

            let records = data.models.entry(schema.name.clone()).or_default();
            for row in &rows {
                let mut record = EntityRecord::new();
                for (index, column) in columns.iter().enumerate() {
                    let value = column_value(row, index)?;
                    if *column == "id" {
                        record.insert(ORIGINAL_ID_FIELD.to_string(), value);
                    } else {
                        record.insert(column.to_string(), value);
                    }
                }
                records.push(record);
            }
        }
        Ok(data)
    }
}
