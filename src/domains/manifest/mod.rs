pub mod types;
pub mod validator;
pub mod planner;
pub mod render;

pub use types::ImportManifest;
pub use validator::{parse_manifest, validate_manifest_value};
pub use planner::{missing_status_warning, plan_import, ExistingNames, ImportPlan, PlannedMedia};
pub use render::render_manifest;
