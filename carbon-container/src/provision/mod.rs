//! Archive provisioner.
//!
//! Materialises a runnable distribution tree from a directory, a local
//! archive or a remote artifact.

mod archive;
mod copy;
mod fetch;

#[cfg(test)]
pub(crate) use archive::test_support;
pub use archive::{ArchiveFormat, extract};
pub use copy::copy_dir_all;
pub use fetch::{ArtifactLocation, ArtifactResolver};

use crate::layout::DistributionLayout;
use crate::options::{ArtifactReference, DistributionSource};
use carbon_shared::errors::{CarbonError, CarbonResult};
use std::path::{Path, PathBuf};

/// Provision `source` into `target` and locate the distribution home.
pub async fn provision(
    source: DistributionSource<'_>,
    target: &Path,
    resolver: &ArtifactResolver,
) -> CarbonResult<DistributionLayout> {
    tokio::fs::create_dir_all(target).await.map_err(|e| {
        CarbonError::Provisioning(format!(
            "target {} is not writable: {}",
            target.display(),
            e
        ))
    })?;

    match source {
        DistributionSource::Directory(dir) => {
            tracing::info!(source = %dir.display(), target = %target.display(), "Copying distribution directory");
            let (src, dst) = (dir.to_path_buf(), target.to_path_buf());
            let files = run_blocking(move || copy_dir_all(&src, &dst)).await?;
            tracing::debug!(files, "Distribution directory copied");
        }
        DistributionSource::Archive(path) => {
            tracing::info!(archive = %path.display(), target = %target.display(), "Extracting distribution archive");
            extract_blocking(path.to_path_buf(), target.to_path_buf()).await?;
        }
        DistributionSource::Artifact(reference) => {
            tracing::info!(artifact = %reference, target = %target.display(), "Fetching distribution artifact");
            fetch_and_extract(reference, target, resolver).await?;
        }
    }

    DistributionLayout::discover(target)
}

async fn fetch_and_extract(
    reference: &ArtifactReference,
    target: &Path,
    resolver: &ArtifactResolver,
) -> CarbonResult<()> {
    let suffix = format!("-{}", archive_file_name(reference));
    let download = tempfile::Builder::new()
        .prefix(".distribution")
        .suffix(&suffix)
        .tempfile_in(target)
        .map_err(|e| {
            CarbonError::Provisioning(format!(
                "failed to create download file in {}: {}",
                target.display(),
                e
            ))
        })?
        .into_temp_path();

    resolver.fetch(reference, &download).await?;
    extract_blocking(download.to_path_buf(), target.to_path_buf()).await?;

    download.close().map_err(|e| {
        CarbonError::Provisioning(format!("failed to remove downloaded archive: {}", e))
    })
}

async fn extract_blocking(archive: PathBuf, target: PathBuf) -> CarbonResult<()> {
    let format = ArchiveFormat::detect(&archive)?;
    run_blocking(move || extract(&archive, format, &target)).await
}

async fn run_blocking<T, F>(f: F) -> CarbonResult<T>
where
    F: FnOnce() -> CarbonResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CarbonError::Internal(format!("provisioning task panicked: {}", e)))?
}

fn archive_file_name(reference: &ArtifactReference) -> String {
    match reference {
        ArtifactReference::Maven(artifact) => artifact.file_name(),
        ArtifactReference::Url(url) => url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("distribution.zip")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::write_stored_zip;
    use super::*;
    use crate::options::MavenArtifact;
    use tempfile::TempDir;

    fn offline_resolver(repository: Option<&Path>) -> ArtifactResolver {
        let repos = repository
            .map(|p| vec![reqwest::Url::from_file_path(p).unwrap().to_string()])
            .unwrap_or_default();
        ArtifactResolver::new(None, repos).unwrap()
    }

    #[tokio::test]
    async fn test_provision_directory() {
        let src = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("bin")).unwrap();
        std::fs::write(src.path().join("bin/start.sh"), b"#!/bin/sh\n").unwrap();
        let target = TempDir::new().unwrap();

        let layout = provision(
            DistributionSource::Directory(src.path()),
            target.path(),
            &offline_resolver(None),
        )
        .await
        .unwrap();

        assert_eq!(layout.home(), target.path());
        assert!(layout.bin_dir().join("start.sh").is_file());
    }

    #[tokio::test]
    async fn test_provision_archive_with_nested_home() {
        let tmp = TempDir::new().unwrap();
        let zip = tmp.path().join("wso2carbon-5.1.0.zip");
        write_stored_zip(
            &zip,
            &[("wso2carbon-5.1.0/bin/carbon.sh", b"#!/bin/sh\n")],
        );
        let target = tmp.path().join("work");

        let layout = provision(
            DistributionSource::Archive(&zip),
            &target,
            &offline_resolver(None),
        )
        .await
        .unwrap();

        assert_eq!(layout.home(), target.join("wso2carbon-5.1.0"));
    }

    #[tokio::test]
    async fn test_provision_maven_artifact() {
        let repo = TempDir::new().unwrap();
        let artifact = MavenArtifact::new("org.wso2.carbon", "kernel-test", "5.1.0").packaging("zip");
        let stored = repo.path().join(artifact.repository_path());
        std::fs::create_dir_all(stored.parent().unwrap()).unwrap();
        write_stored_zip(&stored, &[("bin/carbon.sh", b"#!/bin/sh\n"), ("conf/a", b"a")]);

        let target = TempDir::new().unwrap();
        let reference = ArtifactReference::Maven(artifact);
        let layout = provision(
            DistributionSource::Artifact(&reference),
            target.path(),
            &offline_resolver(Some(repo.path())),
        )
        .await
        .unwrap();

        assert_eq!(layout.home(), target.path());
        assert!(target.path().join("conf/a").is_file());
        let leftovers: Vec<_> = std::fs::read_dir(target.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".distribution"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_provision_unsupported_archive() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("dist.rar");
        std::fs::write(&archive, b"x").unwrap();

        let err = provision(
            DistributionSource::Archive(&archive),
            &tmp.path().join("work"),
            &offline_resolver(None),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CarbonError::Provisioning(_)));
    }
}
