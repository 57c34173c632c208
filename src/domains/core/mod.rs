pub mod blocking_pool;
pub mod file_storage_service;
pub mod utils;

pub use blocking_pool::BlockingPool;
pub use file_storage_service::{FileStorageService, LocalFileStorageService};
