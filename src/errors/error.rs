use serde::Serialize;
use thiserror::Error;
use crate::domains::core::file_storage_service::FileStorageError;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Record not found: {0} with ID {1}")]
    NotFound(String, String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(String),
}

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("DbError", 2)?;
        let kind = match self {
            DbError::Sqlx(_) => "Sqlx",
            DbError::Transaction(_) => "Transaction",
            DbError::NotFound(_, _) => "NotFound",
            DbError::Migration(_) => "Migration",
            DbError::Other(_) => "Other",
        };
        state.serialize_field("type", kind)?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Manual Clone implementation for DbError
impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            DbError::Sqlx(err) => DbError::Other(format!("SQLx error: {}", err)),
            DbError::Transaction(s) => DbError::Transaction(s.clone()),
            DbError::NotFound(s1, s2) => DbError::NotFound(s1.clone(), s2.clone()),
            DbError::Migration(s) => DbError::Migration(s.clone()),
            DbError::Other(s) => DbError::Other(s.clone()),
        }
    }
}

/// Domain-level errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum DomainError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("File error: {0}")]
    File(String),
}

impl From<FileStorageError> for DomainError {
    fn from(error: FileStorageError) -> Self {
        DomainError::File(format!("File storage error: {}", error))
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(error: sqlx::Error) -> Self {
        DomainError::Database(DbError::from(error))
    }
}

/// Service-level errors (application specific)
#[derive(Debug, Error, Clone, Serialize)]
pub enum ServiceError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upload too large: {size} bytes exceeds the {limit} byte limit")]
    UploadTooLarge {
        size: u64,
        limit: u64,
    },

    #[error("Background task failed: {0}")]
    BackgroundTask(String),
}

impl From<TransferError> for ServiceError {
    fn from(error: TransferError) -> Self {
        ServiceError::Domain(DomainError::Transfer(error))
    }
}

/// Errors raised by the export/import pipeline.
#[derive(Debug, Error, Clone, Serialize)]
pub enum TransferError {
    /// Path traversal, oversized content or a missing manifest.
    #[error("Unsafe archive: {0}")]
    UnsafeArchive(String),

    #[error("Invalid import data: {}", .0.join("; "))]
    SchemaInvalid(Vec<String>),

    #[error("Unsupported export version: {found}. Expected {expected}")]
    VersionMismatch {
        found: String,
        expected: String,
    },

    #[error("Invalid export data: {0}")]
    InvalidExportData(String),

    #[error("Failed to import {entity_type} record #{index}: {reason}")]
    RecordImportFailure {
        entity_type: String,
        index: usize,
        reason: String,
    },

    #[error("Replacing existing data during import is not supported")]
    OverrideUnsupported,

    #[error("Registry invariant violated: {0}")]
    RegistryInvariant(String),

    #[error("Archive I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl TransferError {
    pub fn unsafe_archive(reason: impl Into<String>) -> Self {
        Self::UnsafeArchive(reason.into())
    }
}

impl From<zip::result::ZipError> for TransferError {
    fn from(error: zip::result::ZipError) -> Self {
        TransferError::UnsafeArchive(format!("unreadable archive: {}", error))
    }
}

impl From<std::io::Error> for TransferError {
    fn from(error: std::io::Error) -> Self {
        TransferError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for TransferError {
    fn from(error: serde_json::Error) -> Self {
        TransferError::Serialization(error.to_string())
    }
}

/// Validation errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum ValidationError {
    #[error("Field '{field}' must be at least {min} characters")]
    MinLength {
        field: String,
        min: usize,
    },

    #[error("Field '{field}' cannot exceed {max} characters")]
    MaxLength {
        field: String,
        max: usize,
    },

    #[error("Field '{field}' contains invalid format: {reason}")]
    Format {
        field: String,
        reason: String,
    },

    #[error("Field '{field}' contains an invalid value: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    Custom(String),
}

impl ValidationError {
    pub fn min_length(field: &str, min: usize) -> Self {
        Self::MinLength {
            field: field.to_string(),
            min,
        }
    }

    pub fn max_length(field: &str, max: usize) -> Self {
        Self::MaxLength {
            field: field.to_string(),
            max,
        }
    }

    pub fn format(field: &str, reason: &str) -> Self {
        Self::Format {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn custom(message: &str) -> Self {
        Self::Custom(message.to_string())
    }
}
