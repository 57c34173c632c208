pub mod types;
pub mod catalog;

pub use types::{ForeignKey, RegisteredType};
pub use catalog::default_registry;

use crate::domains::core::utils::is_safe_identifier;
use crate::errors::{TransferError, TransferResult};

/// Catalog of entity types that take part in export/import.
///
/// Constructed once at startup and shared behind an `Arc`. Types are kept in
/// first-registration position so equal orders sort stably.
#[derive(Debug, Clone, Default)]
pub struct ExportRegistry {
    types: Vec<RegisteredType>,
}

impl ExportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a type. Re-registering a name keeps its original
    /// position and overwrites everything else.
    ///
    /// The schema is checked for unsafe identifiers, for FK fields that are not
    /// declared, and for FK targets that are not yet registered with a smaller
    /// order, so registration has to happen in dependency order.
    pub fn register(&mut self, schema: RegisteredType) -> TransferResult<()> {
        self.check_schema(&schema)?;

        match self.types.iter_mut().find(|t| t.name == schema.name) {
            Some(existing) => {
                log::debug!("Re-registering export type {} (order {})", schema.name, schema.order);
                *existing = schema;
            }
            None => {
                log::debug!("Registering export type {} (order {})", schema.name, schema.order);
                self.types.push(schema);
            }
        }
        Ok(())
    }

    /// All types ascending by order; ties keep registration position.
    pub fn get_ordered_types(&self) -> Vec<&RegisteredType> {
        let mut ordered: Vec<&RegisteredType> = self.types.iter().collect();
        ordered.sort_by_key(|t| t.order);
        ordered
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Re-checks the whole catalog. A later re-registration can break a
    /// dependent type's ordering, so this runs once after startup wiring.
    pub fn verify(&self) -> TransferResult<()> {
        for schema in &self.types {
            self.check_schema(schema)?;
        }
        Ok(())
    }

    fn check_schema(&self, schema: &RegisteredType) -> TransferResult<()> {
        if schema.name.trim().is_empty() {
            return Err(TransferError::RegistryInvariant(
                "type name must not be empty".to_string(),
            ));
        }
        if !is_safe_identifier(&schema.table) {
            return Err(TransferError::RegistryInvariant(format!(
                "{}: unsafe table name '{}'",
                schema.name, schema.table
            )));
        }
        for field in &schema.fields {
            if !is_safe_identifier(field) || field == "id" || field == "user_id" {
                return Err(TransferError::RegistryInvariant(format!(
                    "{}: field '{}' cannot be declared",
                    schema.name, field
                )));
            }
        }

        for fk in &schema.foreign_keys {
            if !schema.has_field(&fk.field) {
                return Err(TransferError::RegistryInvariant(format!(
                    "{}: foreign key '{}' is not a declared field",
                    schema.name, fk.field
                )));
            }
            let target = self.get(&fk.references).ok_or_else(|| {
                TransferError::RegistryInvariant(format!(
                    "{}.{} references unregistered type {}",
                    schema.name, fk.field, fk.references
                ))
            })?;
            if target.order >= schema.order {
                return Err(TransferError::RegistryInvariant(format!(
                    "{}.{} references {} (order {}) which is not below {}",
                    schema.name, fk.field, target.name, target.order, schema.order
                )));
            }
        }
        Ok(())
    }
}
