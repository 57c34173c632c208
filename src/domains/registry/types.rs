use serde::Serialize;

/// A declared reference from one entity type's field to another type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKey {
    pub field: String,
    pub references: String,
}

/// An entity type eligible for export/import.
///
/// `order` decides import sequence: every type referenced through
/// `foreign_keys` must be registered with a strictly smaller order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredType {
    pub name: String,
    pub order: i32,
    pub table: String,
    /// Columns accepted from an import record, excluding `id` and `user_id`.
    pub fields: Vec<String>,
    /// Rows carry a `user_id` column set to the importing user.
    pub user_owned: bool,
    pub foreign_keys: Vec<ForeignKey>,
}

impl RegisteredType {
    pub fn new(name: &str, order: i32, table: &str) -> Self {
        Self {
            name: name.to_string(),
            order,
            table: table.to_string(),
            fields: Vec::new(),
            user_owned: false,
            foreign_keys: Vec::new(),
        }
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields.extend(fields.iter().map(|f| f.to_string()));
        self
    }

    pub fn user_owned(mut self) -> Self {
        self.user_owned = true;
        self
    }

    /// Declares `field` as a reference to `references`. The field is added to
    /// the accepted columns when missing.
    pub fn foreign_key(mut self, field: &str, references: &str) -> Self {
        if !self.fields.iter().any(|f| f == field) {
            self.fields.push(field.to_string());
        }
        self.foreign_keys.push(ForeignKey {
            field: field.to_string(),
            references: references.to_string(),
        });
        self
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn foreign_key_for(&self, field: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.field == field)
    }

    /// Every column an inserted row carries, in insert order.
    pub fn columns(&self) -> Vec<&str> {
        let mut columns = vec!["id"];
        if self.user_owned {
            columns.push("user_id");
        }
        columns.extend(self.fields.iter().map(String::as_str));
        columns
    }
}
