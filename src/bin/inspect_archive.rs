use std::env;

use job_tracker_core::db_migration::initialize_database;
use job_tracker_core::{init_logging, TransferConfig, TransferContext};
use sqlx::sqlite::SqlitePoolOptions;

const SCRATCH_USER: &str = "inspect-user";

/// Validates an export archive against an empty scratch database and prints
/// the validation response as JSON.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let Some(archive_path) = env::args().nth(1) else {
        eprintln!("usage: inspect_archive <export.zip>");
        std::process::exit(2);
    };

    let scratch = tempfile::tempdir()?;
    let config = TransferConfig {
        upload_dir: scratch.path().join("uploads"),
        secure_temp_dir: scratch.path().join("staging"),
        ..TransferConfig::from_env()?
    };
    init_logging(&config.log_level);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    initialize_database(&pool).await?;
    let context = TransferContext::with_pool(config, pool)?;
    context.tracker.upsert_user(SCRATCH_USER, "inspect@example.com").await?;

    let file = tokio::fs::File::open(&archive_path).await?;
    let staged = context.service.stage_upload(file, &archive_path).await?;
    log::info!("Inspecting {} ({} bytes)", archive_path, staged.size());

    let response = context.service.validate_upload(&staged, SCRATCH_USER).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    drop(staged);
    drop(scratch);
    if !response.valid {
        std::process::exit(1);
    }
    Ok(())
}
