use std::sync::Arc;

use chrono::Utc;
use futures::Stream;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::{ExportArchive, ImportSummary, ImportValidationResponse, TransferSummary};
use super::upload::StagedUpload;
use crate::config::{TransferConfig, TransferLimits};
use crate::domains::archive::{build_archive, inspect_archive, read_archive, ArchiveContents};
use crate::domains::core::blocking_pool::BlockingPool;
use crate::domains::core::file_storage_service::FileStorageService;
use crate::domains::core::utils::sanitize_identifier;
use crate::domains::import::{
    progress_stream, ExportData, ImportOptions, ImportOrchestrator, ImportProgress, ImportReport,
    ProgressEvent, ProgressTracker, ProgressUpdate, RecordSink, SqliteRecordSink, TypeProgress,
};
use crate::domains::manifest::{parse_manifest, plan_import, render_manifest, ImportManifest, ImportPlan};
use crate::domains::registry::ExportRegistry;
use crate::domains::tracker::TrackerRepository;
use crate::errors::{DbError, DomainError, ServiceError, ServiceResult, TransferError};

/// Percent reached when record import starts and ends; per-type progress is
/// spread between the two.
const IMPORT_START_PERCENT: usize = 40;
const IMPORT_END_PERCENT: usize = 80;

/// Entry point for archive export, validation and import.
pub struct TransferService {
    pool: SqlitePool,
    orchestrator: ImportOrchestrator,
    tracker: Arc<dyn TrackerRepository>,
    storage: Arc<dyn FileStorageService>,
    progress: Arc<ProgressTracker>,
    blocking: BlockingPool,
    config: TransferConfig,
}

/// Message for a failed call, without the wrapping layers.
pub fn describe_error(error: &ServiceError) -> String {
    match error {
        ServiceError::Domain(DomainError::Transfer(transfer)) => transfer.to_string(),
        ServiceError::Domain(domain) => domain.to_string(),
        other => other.to_string(),
    }
}

fn error_list(error: &ServiceError) -> Vec<String> {
    match error {
        ServiceError::Domain(DomainError::Transfer(TransferError::SchemaInvalid(errors))) => errors.clone(),
        other => vec![describe_error(other)],
    }
}

impl TransferService {
    pub fn new(
        pool: SqlitePool,
        registry: Arc<ExportRegistry>,
        tracker: Arc<dyn TrackerRepository>,
        storage: Arc<dyn FileStorageService>,
        progress: Arc<ProgressTracker>,
        config: TransferConfig,
    ) -> Self {
        Self {
            pool,
            orchestrator: ImportOrchestrator::new(registry),
            tracker,
            storage,
            progress,
            blocking: BlockingPool::new(config.blocking_workers),
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn progress_tracker(&self) -> &Arc<ProgressTracker> {
        &self.progress
    }

    pub async fn stage_upload<R>(&self, reader: R, file_name: &str) -> ServiceResult<StagedUpload>
    where
        R: AsyncRead + Unpin,
    {
        StagedUpload::stage(reader, file_name, &self.config.secure_temp_dir, &self.config.limits).await
    }

    /// Checks a staged archive without writing anything. Every problem is
    /// reported in the response rather than as an error.
    pub async fn validate_upload(&self, staged: &StagedUpload, user_id: &str) -> ImportValidationResponse {
        match staged.read_bytes().await {
            Ok(bytes) => self.validate_archive(bytes, user_id).await,
            Err(e) => ImportValidationResponse::invalid(error_list(&e)),
        }
    }

    pub async fn validate_archive(&self, bytes: Vec<u8>, user_id: &str) -> ImportValidationResponse {
        match self.check_archive(bytes, user_id).await {
            Ok(response) => response,
            Err(e) => {
                log::info!("Archive for user {} failed validation: {}", user_id, describe_error(&e));
                ImportValidationResponse::invalid(error_list(&e))
            }
        }
    }

    async fn check_archive(&self, bytes: Vec<u8>, user_id: &str) -> ServiceResult<ImportValidationResponse> {
        let contents = self.read_contents(bytes).await?;
        let manifest = self.parse(&contents).await?;
        let plan = self.plan(&manifest, &contents, user_id).await?;

        let mut warnings = Vec::new();
        let existing = self.tracker.count_applications(user_id).await?;
        if existing > 0 {
            warnings.push(format!(
                "You have {} existing applications. Import will add to these.",
                existing
            ));
        }
        warnings.extend(plan.warnings());

        Ok(ImportValidationResponse {
            valid: true,
            summary: Some(TransferSummary::from_manifest(&manifest, contents.info.media_file_count())),
            warnings,
            errors: Vec::new(),
        })
    }

    /// Imports a staged archive on a background task and returns the id its
    /// progress is tracked under. The task owns the upload and scrubs it when
    /// done.
    pub async fn start_import(
        self: &Arc<Self>,
        staged: StagedUpload,
        user_id: &str,
        override_existing: bool,
    ) -> ServiceResult<String> {
        if override_existing {
            return Err(TransferError::OverrideUnsupported.into());
        }

        let import_id = Uuid::new_v4().to_string();
        self.progress.create(&import_id).await;
        log::info!("Starting import {} for user {} ({} bytes)", import_id, user_id, staged.size());

        let service = Arc::clone(self);
        let user_id = user_id.to_string();
        let task_id = import_id.clone();
        tokio::spawn(async move {
            let outcome = match staged.read_bytes().await {
                Ok(bytes) => service.import_archive(bytes, &user_id, false, Some(&task_id)).await,
                Err(e) => Err(e),
            };
            drop(staged);

            match outcome {
                Ok(summary) => {
                    log::info!(
                        "Import {} finished: {} applications, {} files",
                        task_id,
                        summary.summary.applications,
                        summary.summary.files
                    );
                    let result = serde_json::to_value(&summary).ok();
                    service.progress.complete(&task_id, true, result).await;
                }
                Err(e) => {
                    let message = describe_error(&e);
                    log::error!("Import {} failed: {}", task_id, message);
                    service
                        .progress
                        .complete(&task_id, false, Some(json!({ "error": message })))
                        .await;
                }
            }
        });

        Ok(import_id)
    }

    /// Runs a whole import inside one transaction: records first, then media
    /// files. Any failure rolls back every row and removes stored files.
    pub async fn import_archive(
        &self,
        bytes: Vec<u8>,
        user_id: &str,
        override_existing: bool,
        import_id: Option<&str>,
    ) -> ServiceResult<ImportSummary> {
        if override_existing {
            return Err(TransferError::OverrideUnsupported.into());
        }
        if self.tracker.find_user_email(user_id).await?.is_none() {
            return Err(DomainError::Database(DbError::NotFound("User".to_string(), user_id.to_string())).into());
        }

        self.report(import_id, ProgressUpdate::stage("extracting", 10, "Extracting archive...")).await;
        let contents = self.read_contents(bytes).await?;

        self.report(import_id, ProgressUpdate::stage("validating", 20, "Validating data...")).await;
        let manifest = self.parse(&contents).await?;

        self.report(import_id, ProgressUpdate::stage("planning", 30, "Preparing records...")).await;
        let plan = self.plan(&manifest, &contents, user_id).await?;

        self.report(
            import_id,
            ProgressUpdate::stage("importing", IMPORT_START_PERCENT as u8, "Importing records..."),
        )
        .await;
        let mut sink = SqliteRecordSink::begin(&self.pool).await?;
        let report = match self.import_records(&plan, user_id, &mut sink, import_id).await {
            Ok(report) => report,
            Err(e) => {
                Self::discard(sink).await;
                return Err(e);
            }
        };

        self.report(import_id, ProgressUpdate::stage("restoring_files", 85, "Restoring files...")).await;
        let mut stored = Vec::new();
        let restored = match self.restore_files(&plan, &contents, &report, &mut sink, &mut stored).await {
            Ok(restored) => restored,
            Err(e) => {
                self.remove_files(&stored).await;
                Self::discard(sink).await;
                return Err(e);
            }
        };

        if let Err(e) = sink.commit().await {
            self.remove_files(&stored).await;
            return Err(e.into());
        }

        let mut warnings = plan.warnings();
        warnings.extend(report.warnings.iter().cloned());
        log::info!(
            "Imported {} records and {} files for user {}",
            report.total(),
            restored,
            user_id
        );

        Ok(ImportSummary {
            summary: TransferSummary::from_report(&report, &manifest, restored),
            counts: report.counts.clone(),
            unresolved_references: report.unresolved_references.len(),
            warnings,
        })
    }

    async fn import_records(
        &self,
        plan: &ImportPlan,
        user_id: &str,
        sink: &mut dyn RecordSink,
        import_id: Option<&str>,
    ) -> ServiceResult<ImportReport> {
        let (updates, mut received) = mpsc::unbounded_channel::<ProgressUpdate>();
        let forwarder = import_id.map(|id| {
            let progress = Arc::clone(&self.progress);
            let id = id.to_string();
            tokio::spawn(async move {
                while let Some(update) = received.recv().await {
                    progress.update(&id, update).await;
                }
            })
        });

        let options = ImportOptions {
            known_ids: plan.known_ids.clone(),
            on_progress: Some(Box::new(move |step: TypeProgress<'_>| {
                let span = IMPORT_END_PERCENT - IMPORT_START_PERCENT;
                let percent = IMPORT_START_PERCENT + span * (step.position + 1) / step.type_count.max(1);
                let message = format!("Imported {} {} records", step.imported, step.entity_type);
                let _ = updates.send(ProgressUpdate::stage("importing", percent as u8, message));
            })),
        };

        let result = self
            .orchestrator
            .import_with_options(&plan.export_data, user_id, false, sink, options)
            .await;

        // The sender went away with `options`, so the forwarder drains and
        // stops before anything marks the import complete.
        if let Some(forwarder) = forwarder {
            if let Err(e) = forwarder.await {
                log::warn!("Progress forwarder stopped early: {}", e);
            }
        }

        Ok(result?)
    }

    /// Stores every planned media file and points its record at the stored
    /// path. Paths written so far are pushed to `stored`.
    async fn restore_files(
        &self,
        plan: &ImportPlan,
        contents: &ArchiveContents,
        report: &ImportReport,
        sink: &mut dyn RecordSink,
        stored: &mut Vec<String>,
    ) -> ServiceResult<usize> {
        let registry = self.orchestrator.registry();

        for media in &plan.media {
            let Some(new_id) = report.id_mapper.get(media.entity_type, &media.original_id) else {
                log::warn!("No imported record for {}, skipping file", media.archive_name);
                continue;
            };
            let Some(data) = contents.file(&media.archive_name) else {
                continue;
            };
            let schema = registry.get(media.entity_type).ok_or_else(|| {
                TransferError::RegistryInvariant(format!("{} is not registered", media.entity_type))
            })?;

            let (relative_path, size) = self
                .storage
                .save_file(data.to_vec(), media.storage_kind, new_id, &media.archive_name)
                .await
                .map_err(DomainError::from)?;
            stored.push(relative_path.clone());
            log::debug!("Restored {} ({} bytes) to {}", media.archive_name, size, relative_path);

            sink.update_field(schema, new_id, media.field, Value::String(relative_path))
                .await?;
        }

        Ok(stored.len())
    }

    async fn discard(sink: SqliteRecordSink) {
        if let Err(e) = sink.rollback().await {
            log::error!("Failed to roll back import: {}", e);
        }
    }

    async fn remove_files(&self, paths: &[String]) {
        for path in paths {
            if let Err(e) = self.storage.delete_file(path).await {
                log::warn!("Failed to remove restored file {}: {}", path, e);
            }
        }
    }

    async fn report(&self, import_id: Option<&str>, update: ProgressUpdate) {
        if let Some(id) = import_id {
            self.progress.update(id, update).await;
        }
    }

    async fn read_contents(&self, bytes: Vec<u8>) -> ServiceResult<ArchiveContents> {
        let limits = self.config.limits.clone();
        let contents = self.blocking.run(move || read_archive(&bytes, &limits)).await??;
        Ok(contents)
    }

    async fn parse(&self, contents: &ArchiveContents) -> ServiceResult<ImportManifest> {
        let manifest_bytes = contents.manifest.clone();
        let max_applications = self.config.limits.max_applications;
        let manifest = self
            .blocking
            .run(move || parse_manifest(&manifest_bytes, max_applications))
            .await??;
        Ok(manifest)
    }

    async fn plan(
        &self,
        manifest: &ImportManifest,
        contents: &ArchiveContents,
        user_id: &str,
    ) -> ServiceResult<ImportPlan> {
        let statuses = self.tracker.status_ids_by_name(user_id).await?;
        let round_types = self.tracker.round_type_ids_by_name(user_id).await?;
        let archive_files: Vec<String> = contents.files.keys().cloned().collect();
        Ok(plan_import(manifest, &statuses, &round_types, &archive_files))
    }

    /// Packs the user's applications, history, rounds and media files into a
    /// downloadable archive.
    pub async fn export_archive(&self, user_id: &str) -> ServiceResult<ExportArchive> {
        let snapshot = self.tracker.snapshot(user_id).await?;
        let manifest = render_manifest(&snapshot);
        let manifest_json = serde_json::to_string_pretty(&manifest).map_err(TransferError::from)?;

        let base_dir = self.storage.base_path().to_path_buf();
        let owner = user_id.to_string();
        let bytes = self
            .blocking
            .run(move || build_archive(&manifest_json, &owner, &base_dir))
            .await??;

        let unbounded = TransferLimits {
            max_uncompressed_bytes: u64::MAX,
            ..self.config.limits.clone()
        };
        let info = inspect_archive(&bytes, &unbounded)?;
        let sha256 = hex::encode(Sha256::digest(&bytes));

        Ok(ExportArchive {
            file_name: format!(
                "job-tracker-export-{}-{}.zip",
                sanitize_identifier(user_id),
                Utc::now().format("%Y%m%d")
            ),
            bytes,
            sha256,
            summary: TransferSummary::from_manifest(&manifest, info.media_file_count()),
        })
    }

    /// Registry-format snapshot of everything the user owns.
    pub async fn export_data(&self, user_id: &str) -> ServiceResult<ExportData> {
        let data = self
            .tracker
            .export_records(self.orchestrator.registry(), user_id)
            .await?;
        Ok(data)
    }

    pub async fn progress(&self, import_id: &str) -> ImportProgress {
        self.progress.get(import_id).await
    }

    pub fn progress_events(&self, import_id: &str) -> impl Stream<Item = ProgressEvent> + Send + 'static {
        progress_stream(
            Arc::clone(&self.progress),
            import_id,
            self.config.progress_poll_interval,
            self.config.progress_max_polls,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db_migration::initialize_database;
    use crate::domains::core::file_storage_service::{FileStorageError, FileStorageResult, LocalFileStorageService};
    use crate::domains::import::ProgressStatus;
    use crate::domains::registry::catalog::{default_registry, APPLICATION, APPLICATION_STATUS_HISTORY, ROUND_MEDIA};
    use crate::domains::tracker::SqliteTrackerRepository;
    use async_trait::async_trait;
    use futures::StreamExt;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::io::{Cursor, Write};
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    struct Harness {
        service: Arc<TransferService>,
        pool: SqlitePool,
        uploads: TempDir,
        staging: TempDir,
    }

    /// Storage that accepts nothing.
    struct FailingStorage {
        base: PathBuf,
    }

    #[async_trait]
    impl FileStorageService for FailingStorage {
        async fn save_file(
            &self,
            _data: Vec<u8>,
            _entity_type: &str,
            _entity_id: &str,
            _suggested_filename: &str,
        ) -> FileStorageResult<(String, u64)> {
            Err(FileStorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")))
        }

        async fn delete_file(&self, relative_path: &str) -> FileStorageResult<()> {
            Err(FileStorageError::NotFound(relative_path.to_string()))
        }

        fn base_path(&self) -> &Path {
            &self.base
        }

        fn get_absolute_path(&self, relative_path: &str) -> PathBuf {
            self.base.join(relative_path)
        }
    }

    async fn harness_with(failing_storage: bool) -> Harness {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        initialize_database(&pool).await.unwrap();

        let uploads = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        let config = TransferConfig {
            upload_dir: uploads.path().to_path_buf(),
            secure_temp_dir: staging.path().join("secure"),
            progress_poll_interval: Duration::from_millis(10),
            ..TransferConfig::default()
        };

        let tracker = Arc::new(SqliteTrackerRepository::new(pool.clone()));
        tracker.upsert_user("user-1", "jo@example.com").await.unwrap();
        tracker.upsert_user("user-2", "sam@example.com").await.unwrap();

        let storage: Arc<dyn FileStorageService> = if failing_storage {
            Arc::new(FailingStorage {
                base: uploads.path().to_path_buf(),
            })
        } else {
            Arc::new(LocalFileStorageService::new(uploads.path()).unwrap())
        };

        let service = TransferService::new(
            pool.clone(),
            Arc::new(default_registry().unwrap()),
            tracker,
            storage,
            Arc::new(ProgressTracker::new()),
            config,
        );

        Harness {
            service: Arc::new(service),
            pool,
            uploads,
            staging,
        }
    }

    async fn harness() -> Harness {
        harness_with(false).await
    }

    fn manifest() -> Value {
        json!({
            "user": {"email": "jo@example.com"},
            "applications": [{
                "id": "app-1",
                "company": "Acme",
                "job_title": "Backend Engineer",
                "status": "Screening",
                "cv_path": "applications/app-1/cv.pdf",
                "applied_at": "2026-01-05T09:00:00Z",
                "status_history": [
                    {"from_status": "Applied", "to_status": "Screening", "changed_at": "2026-01-07T10:00:00Z"}
                ],
                "rounds": [{
                    "id": "round-1",
                    "type": "Technical",
                    "scheduled_at": "2026-01-12T14:00:00Z",
                    "media": [{"type": "audio", "path": "rounds/round-1/call.mp3"}]
                }]
            }]
        })
    }

    fn archive(manifest: &Value, files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("manifest.json", FileOptions::default()).unwrap();
        writer.write_all(manifest.to_string().as_bytes()).unwrap();
        for (name, data) in files {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn full_archive() -> Vec<u8> {
        archive(
            &manifest(),
            &[
                ("files/applications/cv_app-1.pdf", &b"%PDF-cv"[..]),
                ("files/rounds/round-1_audio.mp3", &b"ID3-audio"[..]),
            ],
        )
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await.unwrap()
    }

    async fn seed_application(pool: &SqlitePool, id: &str, user_id: &str) {
        sqlx::query(
            "INSERT INTO applications (id, user_id, company, job_title, status_id, applied_at)
             VALUES (?, ?, 'Existing', 'Analyst', '00000000-0000-4000-8000-000000000001', '2025-12-01')",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_validate_reports_summary_and_warnings() {
        let h = harness().await;
        seed_application(&h.pool, "existing-1", "user-1").await;

        let response = h.service.validate_archive(full_archive(), "user-1").await;

        assert!(response.valid, "{:?}", response.errors);
        assert!(response.errors.is_empty());
        assert_eq!(
            response.summary,
            Some(TransferSummary {
                applications: 1,
                rounds: 1,
                status_history: 1,
                custom_statuses: 0,
                custom_round_types: 0,
                files: 2,
            })
        );
        assert_eq!(
            response.warnings,
            vec![
                "You have 1 existing applications. Import will add to these.".to_string(),
                "Will create 1 new statuses: Screening".to_string(),
            ]
        );
        assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM applications").await, 1);
        assert_eq!(
            count(&h.pool, "SELECT COUNT(*) FROM application_statuses WHERE name = 'Screening'").await,
            0
        );
    }

    #[tokio::test]
    async fn test_validate_collects_every_schema_error() {
        let h = harness().await;
        let bad = json!({
            "user": {"email": "not-an-email"},
            "applications": [{"company": "", "job_title": "Engineer", "status": "Applied", "applied_at": "soon"}]
        });

        let response = h.service.validate_archive(archive(&bad, &[]), "user-1").await;

        assert!(!response.valid);
        assert!(response.summary.is_none());
        assert!(response.errors.len() >= 3, "{:?}", response.errors);
        assert!(response.errors.iter().any(|e| e.contains("applications[0].company")));
        assert!(response.errors.iter().any(|e| e.contains("applications[0].applied_at")));
    }

    #[tokio::test]
    async fn test_validate_rejects_unsafe_archive() {
        let h = harness().await;
        let evil = archive(&manifest(), &[("../../etc/cron.d/job", &b"x"[..])]);

        let response = h.service.validate_archive(evil, "user-1").await;
        assert!(!response.valid);
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].starts_with("Unsafe archive"), "{}", response.errors[0]);

        let garbage = h.service.validate_archive(b"not a zip".to_vec(), "user-1").await;
        assert!(!garbage.valid);
    }

    #[tokio::test]
    async fn test_import_creates_missing_status_and_restores_files() {
        let h = harness().await;

        let summary = h
            .service
            .import_archive(full_archive(), "user-1", false, None)
            .await
            .unwrap();

        assert_eq!(summary.summary.applications, 1);
        assert_eq!(summary.summary.rounds, 1);
        assert_eq!(summary.summary.status_history, 1);
        assert_eq!(summary.summary.files, 2);
        assert_eq!(summary.counts.get(APPLICATION), Some(&1));
        assert_eq!(summary.unresolved_references, 0);
        assert_eq!(summary.warnings, vec!["Will create 1 new statuses: Screening".to_string()]);

        let screening: String = sqlx::query_scalar(
            "SELECT id FROM application_statuses WHERE user_id = 'user-1' AND name = 'Screening'",
        )
        .fetch_one(&h.pool)
        .await
        .unwrap();
        let (from_status, to_status): (Option<String>, Option<String>) = sqlx::query_as(
            "SELECT from_status_id, to_status_id FROM application_status_history",
        )
        .fetch_one(&h.pool)
        .await
        .unwrap();
        assert_eq!(from_status.as_deref(), Some("00000000-0000-4000-8000-000000000001"));
        assert_eq!(to_status, Some(screening.clone()));

        let (status_id, cv_path): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT status_id, cv_path FROM applications WHERE user_id = 'user-1'")
                .fetch_one(&h.pool)
                .await
                .unwrap();
        assert_eq!(status_id, Some(screening));
        let cv_path = cv_path.unwrap();
        assert!(cv_path.starts_with("applications/"));
        assert_eq!(std::fs::read(h.uploads.path().join(&cv_path)).unwrap(), b"%PDF-cv");

        let media_path: Option<String> = sqlx::query_scalar("SELECT file_path FROM round_media")
            .fetch_one(&h.pool)
            .await
            .unwrap();
        assert!(media_path.unwrap().starts_with("rounds/"));
    }

    #[tokio::test]
    async fn test_importing_twice_adds_records_again() {
        let h = harness().await;

        h.service.import_archive(full_archive(), "user-1", false, None).await.unwrap();
        let second = h.service.import_archive(full_archive(), "user-1", false, None).await.unwrap();

        assert!(second.warnings.is_empty(), "{:?}", second.warnings);
        assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM applications WHERE user_id = 'user-1'").await, 2);
        assert_eq!(
            count(&h.pool, "SELECT COUNT(*) FROM application_statuses WHERE name = 'Screening'").await,
            1
        );
    }

    #[tokio::test]
    async fn test_failed_file_restore_rolls_back_every_row() {
        let h = harness_with(true).await;

        let err = h
            .service
            .import_archive(full_archive(), "user-1", false, None)
            .await
            .unwrap_err();

        assert!(describe_error(&err).contains("disk full"), "{}", describe_error(&err));
        assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM applications").await, 0);
        assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM rounds").await, 0);
        assert_eq!(
            count(&h.pool, "SELECT COUNT(*) FROM application_statuses WHERE user_id IS NOT NULL").await,
            0
        );
    }

    #[tokio::test]
    async fn test_override_and_unknown_user_are_rejected() {
        let h = harness().await;

        let err = h
            .service
            .import_archive(full_archive(), "user-1", true, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::Transfer(TransferError::OverrideUnsupported))
        ));

        let staged = h
            .service
            .stage_upload(&full_archive()[..], "export.zip")
            .await
            .unwrap();
        assert!(h.service.start_import(staged, "user-1", true).await.is_err());

        let err = h
            .service
            .import_archive(full_archive(), "nobody", false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::Database(DbError::NotFound(_, _)))));
        assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM applications").await, 0);
    }

    #[tokio::test]
    async fn test_background_import_streams_progress_until_complete() {
        let h = harness().await;
        let staged = h
            .service
            .stage_upload(&full_archive()[..], "export.zip")
            .await
            .unwrap();

        let import_id = h.service.start_import(staged, "user-1", false).await.unwrap();
        let events: Vec<ProgressEvent> = h.service.progress_events(&import_id).collect().await;

        let last = &events.last().unwrap().progress;
        assert_eq!(last.status, ProgressStatus::Complete);
        assert_eq!(last.success, Some(true));
        assert_eq!(last.result.as_ref().unwrap()["summary"]["applications"], json!(1));

        assert_eq!(h.service.progress(&import_id).await.status, ProgressStatus::Unknown);
        assert_eq!(std::fs::read_dir(h.staging.path().join("secure")).unwrap().count(), 0);
        assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM applications").await, 1);
    }

    #[tokio::test]
    async fn test_background_import_failure_is_reported() {
        let h = harness().await;
        let staged = h
            .service
            .stage_upload(&b"garbage"[..], "export.zip")
            .await
            .unwrap();

        let import_id = h.service.start_import(staged, "user-1", false).await.unwrap();
        let events: Vec<ProgressEvent> = h.service.progress_events(&import_id).collect().await;

        let last = &events.last().unwrap().progress;
        assert_eq!(last.success, Some(false));
        assert!(last.result.as_ref().unwrap()["error"].as_str().unwrap().starts_with("Unsafe archive"));
    }

    #[tokio::test]
    async fn test_export_then_import_into_second_account() {
        let h = harness().await;
        seed_application(&h.pool, "a-1", "user-1").await;
        sqlx::raw_sql(
            "UPDATE applications SET cv_path = 'applications/a-1/cv.pdf' WHERE id = 'a-1';
             INSERT INTO application_status_history (id, application_id, from_status_id, to_status_id, changed_at)
                VALUES ('h-1', 'a-1', NULL, '00000000-0000-4000-8000-000000000001', '2025-12-01');
             INSERT INTO rounds (id, application_id, round_type_id, scheduled_at)
                VALUES ('r-1', 'a-1', '00000000-0000-4000-8000-000000000102', '2025-12-10T10:00:00Z');
             INSERT INTO round_media (id, round_id, media_type, file_path)
                VALUES ('m-1', 'r-1', 'audio', 'rounds/r-1/call.mp3');",
        )
        .execute(&h.pool)
        .await
        .unwrap();
        for (path, data) in [("applications/a-1/cv.pdf", &b"cv"[..]), ("rounds/r-1/call.mp3", &b"audio"[..])] {
            let absolute = h.uploads.path().join(path);
            std::fs::create_dir_all(absolute.parent().unwrap()).unwrap();
            std::fs::write(absolute, data).unwrap();
        }

        let export = h.service.export_archive("user-1").await.unwrap();
        assert!(export.file_name.starts_with("job-tracker-export-user1-"));
        assert_eq!(export.sha256.len(), 64);
        assert_eq!(export.summary.applications, 1);
        assert_eq!(export.summary.files, 2);

        let summary = h
            .service
            .import_archive(export.bytes, "user-2", false, None)
            .await
            .unwrap();
        assert_eq!(summary.summary.applications, 1);
        assert_eq!(summary.summary.files, 2);
        assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);

        assert_eq!(count(&h.pool, "SELECT COUNT(*) FROM applications WHERE user_id = 'user-2'").await, 1);
        let cv_path: String = sqlx::query_scalar("SELECT cv_path FROM applications WHERE user_id = 'user-2'")
            .fetch_one(&h.pool)
            .await
            .unwrap();
        assert_ne!(cv_path, "applications/a-1/cv.pdf");
        assert_eq!(std::fs::read(h.uploads.path().join(cv_path)).unwrap(), b"cv");
    }

    #[tokio::test]
    async fn test_export_data_is_scoped_to_user() {
        let h = harness().await;
        h.service.import_archive(full_archive(), "user-1", false, None).await.unwrap();
        seed_application(&h.pool, "other", "user-2").await;

        let data = h.service.export_data("user-1").await.unwrap();

        assert_eq!(data.record_count(APPLICATION), 1);
        assert_eq!(data.record_count(APPLICATION_STATUS_HISTORY), 1);
        assert_eq!(data.record_count(ROUND_MEDIA), 1);
        assert_eq!(data.records(APPLICATION)[0]["company"], json!("Acme"));
    }
}
