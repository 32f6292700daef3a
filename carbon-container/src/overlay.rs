//! Bundle and configuration overlays applied after provisioning.
//!
//! Every item is independent: a failure is logged and recorded in the
//! report, and the remaining items are still applied.

use crate::layout::DistributionLayout;
use crate::options::{ArtifactReference, ConfigFileCopy};
use crate::provision::ArtifactResolver;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct OverlayFailure {
    pub item: String,
    pub error: String,
}

/// Outcome of applying a set of overlays.
#[derive(Debug, Clone, Default)]
pub struct OverlayReport {
    pub applied: Vec<PathBuf>,
    pub failures: Vec<OverlayFailure>,
}

impl OverlayReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, item: String, error: String) {
        self.failures.push(OverlayFailure { item, error });
    }

    pub fn merge(&mut self, other: OverlayReport) {
        self.applied.extend(other.applied);
        self.failures.extend(other.failures);
    }
}

/// Download each bundle into `osgi/dropins/<uuid>_<name>.jar`.
pub async fn copy_external_bundles(
    layout: &DistributionLayout,
    bundles: &[ArtifactReference],
    resolver: &ArtifactResolver,
) -> OverlayReport {
    let mut report = OverlayReport::default();
    if bundles.is_empty() {
        return report;
    }

    let dropins = layout.dropins_dir();
    if let Err(e) = tokio::fs::create_dir_all(&dropins).await {
        tracing::error!(dir = %dropins.display(), error = %e, "Failed to create dropins directory");
        for bundle in bundles {
            report.fail(bundle.to_string(), e.to_string());
        }
        return report;
    }

    for bundle in bundles {
        let destination = unique_bundle_path(&dropins, bundle);
        match resolver.fetch(bundle, &destination).await {
            Ok(()) => {
                tracing::debug!(bundle = %bundle, path = %destination.display(), "Copied external bundle");
                report.applied.push(destination);
            }
            Err(e) => {
                tracing::error!(bundle = %bundle, error = %e, "Error while copying external bundle");
                report.fail(bundle.to_string(), e.to_string());
            }
        }
    }

    report
}

/// Copy each configuration file over its destination inside the distribution.
pub async fn copy_config_files(layout: &DistributionLayout, copies: &[ConfigFileCopy]) -> OverlayReport {
    let mut report = OverlayReport::default();

    for copy in copies {
        let destination = layout.resolve(&copy.destination);
        match copy_config_file(&copy.source, &destination).await {
            Ok(()) => {
                tracing::debug!(
                    source = %copy.source.display(),
                    destination = %destination.display(),
                    "Copied configuration file"
                );
                report.applied.push(destination);
            }
            Err(e) => {
                tracing::error!(
                    source = %copy.source.display(),
                    destination = %destination.display(),
                    error = %e,
                    "Error while copying configuration file"
                );
                report.fail(copy.source.display().to_string(), e.to_string());
            }
        }
    }

    report
}

async fn copy_config_file(source: &Path, destination: &Path) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(source, destination).await.map(|_| ())
}

fn unique_bundle_path(dropins: &Path, bundle: &ArtifactReference) -> PathBuf {
    let prefix = uuid::Uuid::new_v4();
    dropins.join(format!("{}_{}.jar", prefix, bundle.base_name()))
}
