use std::path::{Component, Path, PathBuf};

use crate::errors::{TransferError, TransferResult};

/// True when `target` resolves to a location inside `base`. Both paths must
/// exist; anything that cannot be resolved is unsafe.
pub fn is_path_safe(base: &Path, target: &Path) -> bool {
    let (Ok(base), Ok(target)) = (base.canonicalize(), target.canonicalize()) else {
        return false;
    };
    target.starts_with(&base)
}

/// Resolves a path declared in a manifest against the trusted base
/// directory. Relative paths are taken relative to `base`.
///
/// Returns `None` when the file is missing or lies outside `base`.
pub fn resolve_media_path(base: &Path, declared: &str) -> Option<PathBuf> {
    if declared.trim().is_empty() {
        return None;
    }
    let declared = Path::new(declared);
    let candidate = if declared.is_absolute() {
        declared.to_path_buf()
    } else {
        base.join(declared)
    };

    if !is_path_safe(base, &candidate) {
        return None;
    }
    candidate.canonicalize().ok().filter(|p| p.is_file())
}

/// Rejects archive member names that are absolute or climb out of the root.
pub fn check_member_path(name: &str) -> TransferResult<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(TransferError::unsafe_archive(format!(
            "invalid member name {:?}",
            name
        )));
    }

    let normalized = name.replace('\\', "/");
    let has_drive = normalized.len() >= 2 && normalized.as_bytes()[1] == b':';
    if normalized.starts_with('/') || has_drive {
        return Err(TransferError::unsafe_archive(format!(
            "absolute member path {}",
            name
        )));
    }

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(TransferError::unsafe_archive(format!(
                    "member path {} escapes the archive root",
                    name
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(TransferError::unsafe_archive(format!(
                    "absolute member path {}",
                    name
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_member_paths() {
        assert!(check_member_path("manifest.json").is_ok());
        assert!(check_member_path("files/rounds/r1_audio.mp3").is_ok());
        assert!(check_member_path("./files/a.pdf").is_ok());

        for bad in [
            "../../etc/passwd",
            "files/../../x",
            "/etc/passwd",
            "C:/Windows/x",
            "files\\..\\..\\x",
            "",
        ] {
            assert!(
                matches!(check_member_path(bad), Err(TransferError::UnsafeArchive(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_is_path_safe() {
        let base = tempfile::tempdir().unwrap();
        let inside = base.path().join("cv.pdf");
        fs::write(&inside, b"cv").unwrap();

        let outside_dir = tempfile::tempdir().unwrap();
        let outside = outside_dir.path().join("secret.txt");
        fs::write(&outside, b"secret").unwrap();

        assert!(is_path_safe(base.path(), &inside));
        assert!(!is_path_safe(base.path(), &outside));
        assert!(!is_path_safe(base.path(), &base.path().join("missing.pdf")));
        assert!(!is_path_safe(base.path(), &base.path().join("..").join("x")));
    }

    #[test]
    fn test_resolve_media_path() {
        let base = tempfile::tempdir().unwrap();
        fs::create_dir_all(base.path().join("applications/a1")).unwrap();
        fs::write(base.path().join("applications/a1/cv.pdf"), b"cv").unwrap();

        let relative = resolve_media_path(base.path(), "applications/a1/cv.pdf");
        assert!(relative.is_some());

        let absolute = base.path().join("applications/a1/cv.pdf");
        assert!(resolve_media_path(base.path(), absolute.to_str().unwrap()).is_some());

        assert!(resolve_media_path(base.path(), "../../etc/passwd").is_none());
        assert!(resolve_media_path(base.path(), "applications/a1").is_none());
        assert!(resolve_media_path(base.path(), "").is_none());
    }
}
