use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use rand::Rng;
use tempfile::TempPath;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::config::TransferLimits;
use crate::errors::{DomainError, ServiceError, ServiceResult};

/// An upload streamed to an owner-only temp file. Dropping it overwrites the
/// file with random bytes and removes it.
#[derive(Debug)]
pub struct StagedUpload {
    path: Option<TempPath>,
    file_name: String,
    size: u64,
}

fn io_error(context: &str, error: std::io::Error) -> ServiceError {
    ServiceError::Domain(DomainError::File(format!("{}: {}", context, error)))
}

fn safe_file_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "import.zip".to_string()
    } else {
        cleaned.chars().take(64).collect()
    }
}

impl StagedUpload {
    /// Streams `reader` into `dir` in `limits.upload_chunk_bytes` chunks,
    /// failing once more than `limits.max_upload_bytes` arrive.
    pub async fn stage<R>(mut reader: R, file_name: &str, dir: &Path, limits: &TransferLimits) -> ServiceResult<Self>
    where
        R: AsyncRead + Unpin,
    {
        create_private_dir(dir)?;

        let named = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&format!("_{}", safe_file_name(file_name)))
            .tempfile_in(dir)
            .map_err(|e| io_error("Failed to create staging file", e))?;
        let (std_file, temp_path) = named.into_parts();

        // From here on the temp path is owned by `staged`, so an early return
        // still scrubs whatever was written.
        let mut staged = Self {
            path: Some(temp_path),
            file_name: file_name.to_string(),
            size: 0,
        };

        let mut file = tokio::fs::File::from_std(std_file);
        let mut buffer = vec![0u8; limits.upload_chunk_bytes.max(1)];
        loop {
            let read = reader
                .read(&mut buffer)
                .await
                .map_err(|e| io_error("Failed to read upload", e))?;
            if read == 0 {
                break;
            }
            staged.size += read as u64;
            if staged.size > limits.max_upload_bytes {
                log::warn!("Rejecting upload {}: over {} bytes", file_name, limits.max_upload_bytes);
                return Err(ServiceError::UploadTooLarge {
                    size: staged.size,
                    limit: limits.max_upload_bytes,
                });
            }
            file.write_all(&buffer[..read])
                .await
                .map_err(|e| io_error("Failed to write staging file", e))?;
        }
        file.flush()
            .await
            .map_err(|e| io_error("Failed to flush staging file", e))?;

        log::debug!("Staged upload {} ({} bytes)", file_name, staged.size);
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub async fn read_bytes(&self) -> ServiceResult<Vec<u8>> {
        tokio::fs::read(self.path())
            .await
            .map_err(|e| io_error("Failed to read staging file", e))
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = overwrite_with_random(&path, self.size) {
                log::warn!("Could not scrub staged upload {}: {}", path.display(), e);
            }
            if let Err(e) = path.close() {
                log::warn!("Could not remove staged upload: {}", e);
            }
        }
    }
}

fn overwrite_with_random(path: &Path, size: u64) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    let mut rng = rand::rng();
    let mut chunk = vec![0u8; 64 * 1024];
    let mut remaining = size;
    while remaining > 0 {
        let len = remaining.min(chunk.len() as u64) as usize;
        rng.fill(&mut chunk[..len]);
        file.write_all(&chunk[..len])?;
        remaining -= len as u64;
    }
    file.sync_all()
}

fn create_private_dir(dir: &Path) -> ServiceResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| io_error("Failed to create staging directory", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
            .map_err(|e| io_error("Failed to secure staging directory", e))?;
    }
    Ok(())
}
