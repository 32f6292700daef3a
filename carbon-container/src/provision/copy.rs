//! Recursive directory copy.

use carbon_shared::errors::{CarbonError, CarbonResult};
use std::path::Path;
use walkdir::WalkDir;

/// Copy the contents of `source` into `target`, preserving structure,
/// permissions and symlinks. Existing files are overwritten; unrelated
/// content in `target` is left alone.
pub fn copy_dir_all(source: &Path, target: &Path) -> CarbonResult<u64> {
    if !source.is_dir() {
        return Err(CarbonError::Provisioning(format!(
            "distribution directory does not exist: {}",
            source.display()
        )));
    }

    std::fs::create_dir_all(target).map_err(|e| {
        CarbonError::Provisioning(format!("failed to create {}: {}", target.display(), e))
    })?;

    let mut files = 0u64;
    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| {
            CarbonError::Provisioning(format!("failed to walk {}: {}", source.display(), e))
        })?;
        let relative = entry.path().strip_prefix(source).map_err(|e| {
            CarbonError::Internal(format!("walked outside of {}: {}", source.display(), e))
        })?;
        let dest = target.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&dest).map_err(|e| {
                CarbonError::Provisioning(format!("failed to create {}: {}", dest.display(), e))
            })?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
            files += 1;
        } else {
            std::fs::copy(entry.path(), &dest).map_err(|e| {
                CarbonError::Provisioning(format!(
                    "failed to copy {} -> {}: {}",
                    entry.path().display(),
                    dest.display(),
                    e
                ))
            })?;
            files += 1;
        }
    }

    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(link: &Path, dest: &Path) -> CarbonResult<()> {
    let target = std::fs::read_link(link).map_err(|e| {
        CarbonError::Provisioning(format!("failed to read link {}: {}", link.display(), e))
    })?;
    if dest.symlink_metadata().is_ok() {
        let _ = std::fs::remove_file(dest);
    }
    std::os::unix::fs::symlink(&target, dest).map_err(|e| {
        CarbonError::Provisioning(format!("failed to create link {}: {}", dest.display(), e))
    })
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, dest: &Path) -> CarbonResult<()> {
    std::fs::copy(link, dest).map(|_| ()).map_err(|e| {
        CarbonError::Provisioning(format!("failed to copy {}: {}", link.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_preserves_structure() {
        let src = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("bin")).unwrap();
        std::fs::create_dir_all(src.path().join("conf/security")).unwrap();
        std::fs::create_dir_all(src.path().join("empty")).unwrap();
        std::fs::write(src.path().join("bin/start.sh"), b"#!/bin/sh\n").unwrap();
        std::fs::write(src.path().join("conf/security/keystore"), b"ks").unwrap();

        let dst = TempDir::new().unwrap();
        let copied = copy_dir_all(src.path(), dst.path()).unwrap();

        assert_eq!(copied, 2);
        assert!(dst.path().join("empty").is_dir());
        assert_eq!(
            std::fs::read(dst.path().join("conf/security/keystore")).unwrap(),
            b"ks"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_symlinks() {
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("real.txt"), b"x").unwrap();
        std::os::unix::fs::symlink("real.txt", src.path().join("link.txt")).unwrap();

        let dst = TempDir::new().unwrap();
        copy_dir_all(src.path(), dst.path()).unwrap();

        let link = std::fs::read_link(dst.path().join("link.txt")).unwrap();
        assert_eq!(link, Path::new("real.txt"));
    }

    #[test]
    fn test_missing_source() {
        let dst = TempDir::new().unwrap();
        let err = copy_dir_all(&dst.path().join("missing"), dst.path()).unwrap_err();
        assert!(matches!(err, CarbonError::Provisioning(_)));
    }
}
