pub mod types;
pub mod paths;
pub mod codec;

pub use types::{
    application_cv_name, round_media_name, ArchiveContents, ArchiveInfo, MediaOwner, MediaReference,
    LEGACY_MANIFEST_NAME, MANIFEST_NAME,
};
pub use paths::{check_member_path, is_path_safe, resolve_media_path};
pub use codec::{build_archive, collect_media_references, inspect_archive, read_archive};
