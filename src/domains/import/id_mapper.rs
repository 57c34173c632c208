use std::collections::HashMap;

use serde_json::Value;

use super::types::EntityRecord;

/// Maps (entity type, original id) to the id minted during this import.
///
/// One mapper per import call; entries are never removed.
#[derive(Debug, Clone, Default)]
pub struct IdMapper {
    mappings: HashMap<String, String>,
}

impl IdMapper {
    pub fn new() -> Self {
        Self::default()
    }

    fn make_key(entity_type: &str, original_id: &str) -> String {
        format!("{}:{}", entity_type, original_id)
    }

    /// Stores a mapping, silently replacing any previous one.
    pub fn add(&mut self, entity_type: &str, original_id: &str, new_id: &str) {
        self.mappings
            .insert(Self::make_key(entity_type, original_id), new_id.to_string());
    }

    pub fn get(&self, entity_type: &str, original_id: &str) -> Option<&str> {
        self.mappings
            .get(&Self::make_key(entity_type, original_id))
            .map(String::as_str)
    }

    pub fn has_mapping(&self, entity_type: &str, original_id: &str) -> bool {
        self.mappings
            .contains_key(&Self::make_key(entity_type, original_id))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Returns a copy of `record` with `field` rewritten to the mapped id.
    ///
    /// String and integer references are looked up by their text form. The
    /// copy is unchanged when the field is absent, null or has no mapping for
    /// `referenced_type`.
    pub fn remap_foreign_key(
        &self,
        record: &EntityRecord,
        field: &str,
        referenced_type: &str,
    ) -> EntityRecord {
        let mut remapped = record.clone();
        if let Some(new_id) = record
            .get(field)
            .and_then(reference_key)
            .and_then(|old| self.get(referenced_type, &old))
        {
            remapped.insert(field.to_string(), Value::String(new_id.to_string()));
        }
        remapped
    }
}

/// Text form of an id or reference value. Empty strings, nulls and
/// non-scalar values carry no reference.
pub fn reference_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
