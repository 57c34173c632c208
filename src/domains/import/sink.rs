use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{query, Sqlite, SqlitePool, Transaction};

use super::types::EntityRecord;
use crate::domains::core::utils::quote_identifier;
use crate::domains::registry::RegisteredType;
use crate::errors::{DbError, DomainError, DomainResult, ValidationError};

/// Destination for imported records.
#[async_trait]
pub trait RecordSink: Send {
    /// Persist one record. `record` already carries its minted `id` (and
    /// `user_id` for user-owned types) plus declared fields only.
    async fn insert(&mut self, schema: &RegisteredType, record: &EntityRecord) -> DomainResult<()>;

    /// Overwrite one declared field of a record inserted earlier.
    async fn update_field(
        &mut self,
        schema: &RegisteredType,
        id: &str,
        field: &str,
        value: Value,
    ) -> DomainResult<()>;
}

/// Stages every row of one import inside a single SQLite transaction.
///
/// Nothing is visible to other connections until [`commit`](Self::commit).
/// Dropping the sink without committing rolls everything back.
pub struct SqliteRecordSink {
    tx: Transaction<'static, Sqlite>,
    inserted: usize,
}

impl SqliteRecordSink {
    pub async fn begin(pool: &SqlitePool) -> DomainResult<Self> {
        let tx = pool.begin().await.map_err(DbError::from)?;
        Ok(Self { tx, inserted: 0 })
    }

    pub fn inserted(&self) -> usize {
        self.inserted
    }

    pub async fn commit(self) -> DomainResult<()> {
        let inserted = self.inserted;
        self.tx.commit().await.map_err(DbError::from)?;
        log::debug!("Committed import transaction with {} rows", inserted);
        Ok(())
    }

    pub async fn rollback(self) -> DomainResult<()> {
        let inserted = self.inserted;
        self.tx.rollback().await.map_err(DbError::from)?;
        log::warn!("Rolled back import transaction, discarding {} rows", inserted);
        Ok(())
    }
}

/// Binds a JSON value as the closest SQLite storage class.
fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Option<&Value>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        None | Some(Value::Null) => query.bind(None::<String>),
        Some(Value::Bool(b)) => query.bind(*b),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Some(Value::String(s)) => query.bind(s.clone()),
        Some(other) => query.bind(other.to_string()),
    }
}

#[async_trait]
impl RecordSink for SqliteRecordSink {
    async fn insert(&mut self, schema: &RegisteredType, record: &EntityRecord) -> DomainResult<()> {
        let columns = schema.columns();
        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&schema.table),
            column_list,
            placeholders
        );

        let mut insert = query(&sql);
        for column in &columns {
            insert = bind_json(insert, record.get(*column));
        }
        insert
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;

        self.inserted += 1;
        Ok(())
    }

    async fn update_field(
        &mut self,
        schema: &RegisteredType,
        id: &str,
        field: &str,
        value: Value,
    ) -> DomainResult<()> {
        if !schema.has_field(field) {
            return Err(DomainError::Validation(ValidationError::invalid_value(
                field,
                &format!("not a declared field of {}", schema.name),
            )));
        }
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE id = ?",
            quote_identifier(&schema.table),
            quote_identifier(field)
        );
        let result = bind_json(query(&sql), Some(&value))
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::Database(DbError::NotFound(
                schema.name.clone(),
                id.to_string(),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;

    /// Collects records in memory. Optionally fails the Nth insert.
    #[derive(Debug, Default)]
    pub struct MemoryRecordSink {
        pub records: Vec<(String, EntityRecord)>,
        pub fail_on_insert: Option<usize>,
    }

    impl MemoryRecordSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing_on(index: usize) -> Self {
            Self {
                records: Vec::new(),
                fail_on_insert: Some(index),
            }
        }

        pub fn of_type(&self, entity_type: &str) -> Vec<&EntityRecord> {
            self.records
                .iter()
                .filter(|(t, _)| t == entity_type)
                .map(|(_, r)| r)
                .collect()
        }
    }

    #[async_trait]
    impl RecordSink for MemoryRecordSink {
        async fn insert(&mut self, schema: &RegisteredType, record: &EntityRecord) -> DomainResult<()> {
            if self.fail_on_insert == Some(self.records.len()) {
                return Err(DomainError::Database(DbError::Other("simulated insert failure".to_string())));
            }
            self.records.push((schema.name.clone(), record.clone()));
            Ok(())
        }

        async fn update_field(
            &mut self,
            schema: &RegisteredType,
            id: &str,
            field: &str,
            value: Value,
        ) -> DomainResult<()> {
            let target = self
                .records
                .iter_mut()
                .find(|(t, r)| t == &schema.name && r.get("id").and_then(Value::as_str) == Some(id))
                .ok_or_else(|| DomainError::Database(DbError::NotFound(schema.name.clone(), id.to_string())))?;
            target.1.insert(field.to_string(), value);
            Ok(())
        }
    }
}
