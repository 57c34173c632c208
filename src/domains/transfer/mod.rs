pub mod types;
pub mod upload;
pub mod service;

pub use types::{ExportArchive, ImportSummary, ImportValidationResponse, TransferSummary};
pub use upload::StagedUpload;
pub use service::{describe_error, TransferService};
