pub mod types;
pub mod id_mapper;
pub mod sink;
pub mod progress;
pub mod service;

pub use types::{EntityRecord, ExportData, ImportReport, TypeProgress, UnresolvedReference, ORIGINAL_ID_FIELD, SUPPORTED_VERSION};
pub use id_mapper::IdMapper;
pub use sink::{RecordSink, SqliteRecordSink};
pub use progress::{progress_stream, ImportProgress, ProgressEvent, ProgressStatus, ProgressTracker, ProgressUpdate};
pub use service::{ImportOptions, ImportOrchestrator};
