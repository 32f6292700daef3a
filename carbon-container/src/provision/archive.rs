//! Archive extraction (zip, tar.gz).

use carbon_shared::errors::{CarbonError, CarbonResult};
use std::io::Read;
use std::path::{Component, Path};

const MAX_LINK_TARGET: u64 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from the file name.
    pub fn detect(path: &Path) -> CarbonResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".zip") {
            Ok(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(ArchiveFormat::TarGz)
        } else {
            Err(CarbonError::Provisioning(format!(
                "unsupported distribution archive: {} (expect .zip or .tar.gz)",
                path.display()
            )))
        }
    }
}

/// Extract `archive` into `out_dir`, creating it if needed.
pub fn extract(archive: &Path, format: ArchiveFormat, out_dir: &Path) -> CarbonResult<()> {
    std::fs::create_dir_all(out_dir).map_err(|e| {
        CarbonError::Provisioning(format!("failed to create {}: {}", out_dir.display(), e))
    })?;

    tracing::debug!(
        archive = %archive.display(),
        target = %out_dir.display(),
        format = ?format,
        "Extracting distribution archive"
    );

    match format {
        ArchiveFormat::Zip => extract_zip(archive, out_dir),
        ArchiveFormat::TarGz => extract_tar_gz(archive, out_dir),
    }
}

/// Stream entries out of the archive file; every file entry is checked
/// against its recorded CRC and size as it is written.
fn extract_zip(zip_path: &Path, out_dir: &Path) -> CarbonResult<()> {
    let file = std::fs::File::open(zip_path).map_err(|e| {
        CarbonError::Provisioning(format!("failed to open {}: {}", zip_path.display(), e))
    })?;
    let mut buffer = vec![0u8; rawzip::RECOMMENDED_BUFFER_SIZE];
    let archive = rawzip::ZipArchive::from_file(file, &mut buffer)
        .map_err(|e| CarbonError::Provisioning(format!("invalid zip archive: {:?}", e)))?;

    let mut entries = archive.entries(&mut buffer);
    while let Some(entry) = entries
        .next_entry()
        .map_err(|e| CarbonError::Provisioning(format!("zip entry error: {:?}", e)))?
    {
        let filename = entry
            .file_path()
            .try_normalize()
            .map_err(|e| {
                CarbonError::Provisioning(format!("failed to normalize zip path: {:?}", e))
            })?
            .as_ref()
            .to_string();

        let path = Path::new(&filename);
        if !is_contained(path) {
            return Err(CarbonError::Provisioning(format!(
                "unsupported or malicious path in zip: {}",
                filename
            )));
        }

        let out_path = out_dir.join(&filename);
        if entry.is_dir() {
            create_dir(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            create_dir(parent)?;
        }

        let zip_entry = archive.get_entry(entry.wayfinder()).map_err(|e| {
            CarbonError::Provisioning(format!("failed to get entry data: {:?}", e))
        })?;
        let mut reader: Box<dyn Read + '_> = match entry.compression_method() {
            rawzip::CompressionMethod::Store => Box::new(zip_entry.verifying_reader(zip_entry.reader())),
            rawzip::CompressionMethod::Deflate => Box::new(
                zip_entry.verifying_reader(flate2::read::DeflateDecoder::new(zip_entry.reader())),
            ),
            method => {
                return Err(CarbonError::Provisioning(format!(
                    "unsupported compression method {:?} for {}",
                    method, filename
                )));
            }
        };
        let extract_err = |e: std::io::Error| {
            CarbonError::Provisioning(format!(
                "failed to extract {} to {}: {}",
                filename,
                out_path.display(),
                e
            ))
        };

        if entry.mode().is_symlink() {
            let mut target = String::new();
            reader
                .take(MAX_LINK_TARGET)
                .read_to_string(&mut target)
                .map_err(extract_err)?;
            write_symlink(path, &target, &out_path)?;
            continue;
        }

        let mut out = std::fs::File::create(&out_path).map_err(|e| {
            CarbonError::Provisioning(format!("failed to create {}: {}", out_path.display(), e))
        })?;
        std::io::copy(&mut reader, &mut out).map_err(extract_err)?;
    }
    Ok(())
}

/// Recreate a zip symlink entry. Targets that would resolve outside the
/// extracted tree are refused.
fn write_symlink(entry: &Path, target: &str, out_path: &Path) -> CarbonResult<()> {
    let resolved = entry
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(target);
    if target.is_empty() || Path::new(target).is_absolute() || !stays_inside(&resolved) {
        return Err(CarbonError::Provisioning(format!(
            "symlink {} points outside the distribution: {}",
            entry.display(),
            target
        )));
    }

    #[cfg(unix)]
    let created = std::os::unix::fs::symlink(target, out_path);
    #[cfg(not(unix))]
    let created = std::fs::write(out_path, target);

    created.map_err(|e| {
        CarbonError::Provisioning(format!(
            "failed to create symlink {}: {}",
            out_path.display(),
            e
        ))
    })
}

/// Whether `path`, resolved lexically, never climbs above its root.
fn stays_inside(path: &Path) -> bool {
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn extract_tar_gz(path: &Path, out_dir: &Path) -> CarbonResult<()> {
    let file = std::fs::File::open(path).map_err(|e| {
        CarbonError::Provisioning(format!("failed to open {}: {}", path.display(), e))
    })?;
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    archive.set_preserve_permissions(true);

    let entries = archive
        .entries()
        .map_err(|e| CarbonError::Provisioning(format!("invalid tar archive: {}", e)))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| CarbonError::Provisioning(format!("tar entry error: {}", e)))?;
        let entry_path = entry
            .path()
            .map_err(|e| CarbonError::Provisioning(format!("invalid tar entry path: {}", e)))?
            .into_owned();

        if !is_contained(&entry_path) {
            return Err(CarbonError::Provisioning(format!(
                "unsupported or malicious path in tar: {}",
                entry_path.display()
            )));
        }

        entry.unpack_in(out_dir).map_err(|e| {
            CarbonError::Provisioning(format!(
                "failed to extract {}: {}",
                entry_path.display(),
                e
            ))
        })?;
    }
    Ok(())
}

fn is_contained(path: &Path) -> bool {
    !path.is_absolute()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn create_dir(path: &Path) -> CarbonResult<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| CarbonError::Provisioning(format!("failed to create {}: {}", path.display(), e)))
}


#[cfg(test)]
mod tests {
    use super::test_support::{write_stored_zip, write_stored_zip_with_modes};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_format() {
        assert_eq!(ArchiveFormat::detect(Path::new("a/dist.ZIP")).unwrap(), ArchiveFormat::Zip);
        assert_eq!(
            ArchiveFormat::detect(Path::new("dist.tar.gz")).unwrap(),
            ArchiveFormat::TarGz
        );
        assert_eq!(ArchiveFormat::detect(Path::new("dist.tgz")).unwrap(), ArchiveFormat::TarGz);
        assert!(ArchiveFormat::detect(Path::new("dist.rar")).is_err());
    }

    #[test]
    fn test_extract_zip() {
        let tmp = TempDir::new().unwrap();
        let zip = tmp.path().join("dist.zip");
        write_stored_zip(
            &zip,
            &[
                ("carbon/", b""),
                ("carbon/bin/carbon.sh", b"#!/bin/sh\n"),
                ("carbon/conf/carbon.yaml", b"id: carbon\n"),
            ],
        );

        let out = tmp.path().join("out");
        extract(&zip, ArchiveFormat::Zip, &out).unwrap();
        assert_eq!(
            std::fs::read(out.join("carbon/conf/carbon.yaml")).unwrap(),
            b"id: carbon\n"
        );
        assert!(out.join("carbon/bin/carbon.sh").is_file());
    }

    #[test]
    fn test_extract_zip_keeps_unrelated_content() {
        let tmp = TempDir::new().unwrap();
        let zip = tmp.path().join("dist.zip");
        write_stored_zip(&zip, &[("a.txt", b"a")]);

        let out = tmp.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("keep.txt"), b"keep").unwrap();

        extract(&zip, ArchiveFormat::Zip, &out).unwrap();
        assert!(out.join("keep.txt").is_file());
        assert!(out.join("a.txt").is_file());
    }

    #[test]
    fn test_corrupt_zip_is_provisioning_error() {
        let tmp = TempDir::new().unwrap();
        let zip = tmp.path().join("broken.zip");
        std::fs::write(&zip, b"definitely not a zip").unwrap();

        let err = extract(&zip, ArchiveFormat::Zip, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, CarbonError::Provisioning(_)));
    }

    #[test]
    fn test_zip_crc_mismatch_fails() {
        let tmp = TempDir::new().unwrap();
        let zip = tmp.path().join("dist.zip");
        write_stored_zip(&zip, &[("conf.txt", b"port=9443")]);

        // Local header is 30 bytes plus the name; flip the first data byte.
        let mut bytes = std::fs::read(&zip).unwrap();
        bytes[30 + "conf.txt".len()] ^= 0xff;
        std::fs::write(&zip, bytes).unwrap();

        let err = extract(&zip, ArchiveFormat::Zip, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, CarbonError::Provisioning(ref m) if m.contains("conf.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_zip_symlink_entries() {
        let tmp = TempDir::new().unwrap();
        let zip = tmp.path().join("dist.zip");
        write_stored_zip_with_modes(
            &zip,
            &[
                ("carbon/lib/kernel-5.1.0.jar", b"jar", Some(0o100644)),
                ("carbon/lib/kernel.jar", b"kernel-5.1.0.jar", Some(0o120777)),
            ],
        );

        let out = tmp.path().join("out");
        extract(&zip, ArchiveFormat::Zip, &out).unwrap();
        let link = out.join("carbon/lib/kernel.jar");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap(), Path::new("kernel-5.1.0.jar"));
        assert_eq!(std::fs::read(&link).unwrap(), b"jar");
    }

    #[test]
    fn test_zip_symlink_escaping_tree_is_refused() {
        let tmp = TempDir::new().unwrap();
        let zip = tmp.path().join("dist.zip");
        write_stored_zip_with_modes(&zip, &[("carbon/evil", b"../../../etc/passwd", Some(0o120777))]);

        let out = tmp.path().join("out");
        let err = extract(&zip, ArchiveFormat::Zip, &out).unwrap_err();
        assert!(matches!(err, CarbonError::Provisioning(ref m) if m.contains("outside")));
        assert!(!out.join("carbon/evil").exists());
    }

    #[test]
    fn test_stays_inside() {
        assert!(stays_inside(Path::new("a/b/../c")));
        assert!(stays_inside(Path::new("a/..")));
        assert!(!stays_inside(Path::new("a/../..")));
        assert!(!stays_inside(Path::new("/abs")));
    }

    #[test]
    fn test_extract_tar_gz() {
        let tmp = TempDir::new().unwrap();
        let archive_path = tmp.path().join("dist.tar.gz");
        {
            let file = std::fs::File::create(&archive_path).unwrap();
            let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            let mut builder = tar::Builder::new(encoder);
            let data = b"server.port=9443\n";
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, "carbon/conf/server.properties", &data[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let out = tmp.path().join("out");
        extract(&archive_path, ArchiveFormat::TarGz, &out).unwrap();
        assert_eq!(
            std::fs::read_to_string(out.join("carbon/conf/server.properties")).unwrap(),
            "server.port=9443\n"
        );
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained(Path::new("a/b/c")));
        assert!(!is_contained(Path::new("../a")));
        assert!(!is_contained(Path::new("/etc/passwd")));
    }
}
