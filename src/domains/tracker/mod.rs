pub mod types;
pub mod repository;

pub use types::TrackerSnapshot;
pub use repository::{SqliteTrackerRepository, TrackerRepository};
