use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::config::TransferConfig;
use crate::db_migration::initialize_database;
use crate::domains::core::file_storage_service::{FileStorageService, LocalFileStorageService};
use crate::domains::import::ProgressTracker;
use crate::domains::registry::{default_registry, ExportRegistry};
use crate::domains::tracker::{SqliteTrackerRepository, TrackerRepository};
use crate::domains::transfer::TransferService;
use crate::errors::{DomainError, ServiceError, ServiceResult};

/// Starts `env_logger` once. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Everything the export/import core needs, built once at startup and shared.
pub struct TransferContext {
    pub config: TransferConfig,
    pub pool: SqlitePool,
    pub registry: Arc<ExportRegistry>,
    pub progress: Arc<ProgressTracker>,
    pub tracker: Arc<dyn TrackerRepository>,
    pub storage: Arc<dyn FileStorageService>,
    pub service: Arc<TransferService>,
}

impl TransferContext {
    pub async fn initialize(config: TransferConfig) -> ServiceResult<Self> {
        init_logging(&config.log_level);
        log::info!("Initializing transfer context");
        log::debug!("Database URL: {}", config.database_url);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await
            .map_err(DomainError::from)?;
        initialize_database(&pool).await.map_err(DomainError::from)?;

        Self::with_pool(config, pool)
    }

    /// Builds the context over an existing, migrated pool.
    pub fn with_pool(config: TransferConfig, pool: SqlitePool) -> ServiceResult<Self> {
        let registry = Arc::new(default_registry()?);
        registry.verify()?;
        log::debug!("Export registry ready with {} types", registry.len());

        let storage: Arc<dyn FileStorageService> = Arc::new(
            LocalFileStorageService::new(&config.upload_dir).map_err(|e| {
                ServiceError::Configuration(format!(
                    "upload directory {} is unusable: {}",
                    config.upload_dir.display(),
                    e
                ))
            })?,
        );
        let tracker: Arc<dyn TrackerRepository> = Arc::new(SqliteTrackerRepository::new(pool.clone()));
        let progress = Arc::new(ProgressTracker::new());

        let service = Arc::new(TransferService::new(
            pool.clone(),
            Arc::clone(&registry),
            Arc::clone(&tracker),
            Arc::clone(&storage),
            Arc::clone(&progress),
            config.clone(),
        ));

        log::info!("Transfer context initialized");
        Ok(Self {
            config,
            pool,
            registry,
            progress,
            tracker,
            storage,
            service,
        })
    }
}
