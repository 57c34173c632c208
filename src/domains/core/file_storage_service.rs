use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;
use std::io;

#[derive(Debug, Error)]
pub enum FileStorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Invalid path component: {0}")]
    InvalidPathComponent(String),
}

pub type FileStorageResult<T> = Result<T, FileStorageError>;

/// Service trait for abstracting file storage operations
#[async_trait]
pub trait FileStorageService: Send + Sync {
    /// Save file data to storage, returning the path relative to the base
    /// directory and the number of bytes written.
    async fn save_file(
        &self,
        data: Vec<u8>,
        entity_type: &str, // e.g., "applications", "rounds"
        entity_id: &str,
        suggested_filename: &str, // Original filename for extension hint
    ) -> FileStorageResult<(String, u64)>;

    /// Delete a file from storage using its relative path.
    async fn delete_file(&self, relative_path: &str) -> FileStorageResult<()>;

    /// Root every stored file lives under.
    fn base_path(&self) -> &Path;

    /// Get the full absolute path for a given relative path
    fn get_absolute_path(&self, relative_path: &str) -> PathBuf;
}

// --- Local File Storage Implementation ---

pub struct LocalFileStorageService {
    base_path: PathBuf,
}

impl LocalFileStorageService {
    /// Creates a new LocalFileStorageService, ensuring the base directory exists.
    pub fn new(base_path: impl Into<PathBuf>) -> io::Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    /// Sanitizes a path component to prevent directory traversal issues.
    fn sanitize_component(component: &str) -> Result<String, FileStorageError> {
        if component.is_empty() || component.contains('/') || component.contains('\\') || component == "." || component == ".." {
            Err(FileStorageError::InvalidPathComponent(component.to_string()))
        } else {
            Ok(component.to_string())
        }
    }

    /// Generates a unique filename based on suggestion and a new UUID.
    fn generate_unique_filename(suggested_filename: &str) -> String {
        let extension = Path::new(suggested_filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|ext| format!(".{}", ext))
            .unwrap_or_default();
        format!("{}{}", Uuid::new_v4(), extension)
    }
}

#[async_trait]
impl FileStorageService for LocalFileStorageService {
    async fn save_file(
        &self,
        data: Vec<u8>,
        entity_type: &str,
        entity_id: &str,
        suggested_filename: &str,
    ) -> FileStorageResult<(String, u64)> {
        let sanitized_entity_type = Self::sanitize_component(entity_type)?;
        let sanitized_id = Self::sanitize_component(entity_id)?;
        let unique_filename = Self::generate_unique_filename(suggested_filename);

        // entity_type/entity_id/unique_filename.ext
        let relative_path = Path::new(&sanitized_entity_type)
            .join(&sanitized_id)
            .join(&unique_filename);
        let absolute_path = self.base_path.join(&relative_path);

        if let Some(parent) = absolute_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let size = data.len() as u64;
        fs::write(&absolute_path, data).await?;
        log::debug!("Stored {} bytes at {}", size, absolute_path.display());

        Ok((relative_path.to_string_lossy().replace('\\', "/"), size))
    }

    async fn delete_file(&self, relative_path: &str) -> FileStorageResult<()> {
        let absolute_path = self.get_absolute_path(relative_path);
        match fs::remove_file(&absolute_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FileStorageError::NotFound(relative_path.to_string()))
            }
            Err(e) => Err(FileStorageError::Io(e)),
        }
    }

    fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn get_absolute_path(&self, relative_path: &str) -> PathBuf {
        self.base_path.join(relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorageService::new(dir.path()).unwrap();

        let (relative, size) = storage
            .save_file(b"%PDF-1.4".to_vec(), "applications", "abc", "cv.pdf")
            .await
            .unwrap();
        assert_eq!(size, 8);
        assert!(relative.starts_with("applications/abc/"));
        assert!(relative.ends_with(".pdf"));
        assert!(storage.get_absolute_path(&relative).exists());

        storage.delete_file(&relative).await.unwrap();
        assert!(matches!(
            storage.delete_file(&relative).await,
            Err(FileStorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_traversal_components() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalFileStorageService::new(dir.path()).unwrap();
        let result = storage.save_file(vec![1], "..", "abc", "x.bin").await;
        assert!(matches!(result, Err(FileStorageError::InvalidPathComponent(_))));
    }
}
