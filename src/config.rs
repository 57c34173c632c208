use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::ServiceError;

pub const DEFAULT_MAX_APPLICATIONS: usize = 1000;
pub const DEFAULT_MAX_UNCOMPRESSED_BYTES: u64 = 512 * 1024 * 1024;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_UPLOAD_CHUNK_BYTES: usize = 1024 * 1024;

/// Ceilings applied to every import. Attacker-controlled archives are checked
/// against these before anything is extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_applications: usize,
    pub max_uncompressed_bytes: u64,
    pub max_upload_bytes: u64,
    pub upload_chunk_bytes: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_applications: DEFAULT_MAX_APPLICATIONS,
            max_uncompressed_bytes: DEFAULT_MAX_UNCOMPRESSED_BYTES,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            upload_chunk_bytes: DEFAULT_UPLOAD_CHUNK_BYTES,
        }
    }
}

/// Runtime configuration for the export/import core.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub database_url: String,
    /// Trusted root for media files. Nothing outside it is ever archived.
    pub upload_dir: PathBuf,
    /// Staging area for uploads; created with owner-only permissions.
    pub secure_temp_dir: PathBuf,
    pub limits: TransferLimits,
    pub progress_poll_interval: Duration,
    pub progress_max_polls: u32,
    pub blocking_workers: usize,
    pub log_level: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:job_tracker.sqlite?mode=rwc".to_string(),
            upload_dir: PathBuf::from("./uploads"),
            secure_temp_dir: env::temp_dir().join("secure_imports"),
            limits: TransferLimits::default(),
            progress_poll_interval: Duration::from_secs(1),
            progress_max_polls: 300,
            blocking_workers: 2,
            log_level: "info".to_string(),
        }
    }
}

impl TransferConfig {
    /// Reads `JOB_TRACKER_*` variables (after loading a `.env` file when one
    /// exists), falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ServiceError> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let limits = TransferLimits {
            max_applications: read_var("JOB_TRACKER_MAX_APPLICATIONS", defaults.limits.max_applications)?,
            max_uncompressed_bytes: read_var("JOB_TRACKER_MAX_UNCOMPRESSED_BYTES", defaults.limits.max_uncompressed_bytes)?,
            max_upload_bytes: read_var("JOB_TRACKER_MAX_UPLOAD_BYTES", defaults.limits.max_upload_bytes)?,
            upload_chunk_bytes: read_var("JOB_TRACKER_UPLOAD_CHUNK_BYTES", defaults.limits.upload_chunk_bytes)?,
        };

        let config = Self {
            database_url: env::var("JOB_TRACKER_DATABASE_URL").unwrap_or(defaults.database_url),
            upload_dir: env::var("JOB_TRACKER_UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            secure_temp_dir: env::var("JOB_TRACKER_SECURE_TEMP_DIR").map(PathBuf::from).unwrap_or(defaults.secure_temp_dir),
            limits,
            progress_poll_interval: Duration::from_millis(read_var(
                "JOB_TRACKER_PROGRESS_POLL_MS",
                defaults.progress_poll_interval.as_millis() as u64,
            )?),
            progress_max_polls: read_var("JOB_TRACKER_PROGRESS_MAX_POLLS", defaults.progress_max_polls)?,
            blocking_workers: read_var("JOB_TRACKER_BLOCKING_WORKERS", defaults.blocking_workers)?,
            log_level: env::var("JOB_TRACKER_LOG_LEVEL").unwrap_or(defaults.log_level),
        };

        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ServiceError> {
        if self.limits.upload_chunk_bytes == 0 {
            return Err(ServiceError::Configuration("JOB_TRACKER_UPLOAD_CHUNK_BYTES must be positive".to_string()));
        }
        if self.limits.max_applications == 0 {
            return Err(ServiceError::Configuration("JOB_TRACKER_MAX_APPLICATIONS must be positive".to_string()));
        }
        if self.blocking_workers == 0 {
            return Err(ServiceError::Configuration("JOB_TRACKER_BLOCKING_WORKERS must be positive".to_string()));
        }
        Ok(())
    }
}

fn read_var<T: FromStr>(key: &str, default: T) -> Result<T, ServiceError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ServiceError::Configuration(format!("{} has an invalid value: {}", key, raw))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for key in [
            "JOB_TRACKER_MAX_APPLICATIONS",
            "JOB_TRACKER_MAX_UNCOMPRESSED_BYTES",
            "JOB_TRACKER_UPLOAD_CHUNK_BYTES",
            "JOB_TRACKER_BLOCKING_WORKERS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = TransferConfig::from_env().expect("defaults load");
        assert_eq!(config.limits.max_applications, 1000);
        assert_eq!(config.limits.upload_chunk_bytes, 1024 * 1024);
        assert_eq!(config.progress_max_polls, 300);
    }

    #[test]
    fn test_env_overrides_limits() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("JOB_TRACKER_MAX_APPLICATIONS", "25");
        env::set_var("JOB_TRACKER_MAX_UNCOMPRESSED_BYTES", "4096");
        let config = TransferConfig::from_env().expect("config loads");
        assert_eq!(config.limits.max_applications, 25);
        assert_eq!(config.limits.max_uncompressed_bytes, 4096);
        reset_env();
    }

    #[test]
    fn test_rejects_garbage_and_zero_values() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("JOB_TRACKER_MAX_APPLICATIONS", "lots");
        assert!(TransferConfig::from_env().is_err());
        env::set_var("JOB_TRACKER_MAX_APPLICATIONS", "10");
        env::set_var("JOB_TRACKER_UPLOAD_CHUNK_BYTES", "0");
        assert!(TransferConfig::from_env().is_err());
        reset_env();
    }
}
