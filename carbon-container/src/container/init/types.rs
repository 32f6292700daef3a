//! Type definitions for the startup pipeline.

use crate::cleanup::remove_dir_or_defer;
use crate::launcher::{ProcessHandler, ScriptHandler};
use crate::layout::{DistributionLayout, WorkingDirectory};
use crate::options::ContainerOptions;
use crate::overlay::OverlayReport;
use crate::provision::ArtifactResolver;
use crate::remote::{RbcClient, Registry};
use std::path::PathBuf;
use std::sync::Arc;

/// RAII guard undoing a partial start.
///
/// Kills the launched process group and removes the working directory
/// (unless it is kept) if dropped without being disarmed.
pub struct CleanupGuard {
    container_id: String,
    keep_directory: bool,
    working_dir: Option<PathBuf>,
    handler: Option<ScriptHandler>,
    armed: bool,
}

impl CleanupGuard {
    pub fn new(container_id: String, keep_directory: bool) -> Self {
        Self {
            container_id,
            keep_directory,
            working_dir: None,
            handler: None,
            armed: true,
        }
    }

    pub fn set_working_dir(&mut self, path: PathBuf) {
        self.working_dir = Some(path);
    }

    pub fn set_handler(&mut self, handler: ScriptHandler) {
        self.handler = Some(handler);
    }

    pub fn take_handler(&mut self) -> Option<ScriptHandler> {
        self.handler.take()
    }

    /// Disarm the guard (call on success).
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        tracing::warn!(container_id = %self.container_id, "Container start failed, cleaning up");

        if let Some(ref mut handler) = self.handler {
            tracing::debug!(container_id = %self.container_id, pid = handler.pid(), "Killing partially started runtime");
            handler.kill();
        }

        if self.keep_directory {
            return;
        }
        if let Some(ref dir) = self.working_dir
            && let Err(e) = remove_dir_or_defer(dir)
        {
            tracing::warn!(container_id = %self.container_id, "Failed to remove working directory: {}", e);
        }
    }
}

/// Shared startup pipeline context.
pub struct InitPipelineContext {
    pub container_id: String,
    pub options: Arc<ContainerOptions>,
    pub resolver: Arc<ArtifactResolver>,
    pub guard: CleanupGuard,
    pub working_dir: Option<WorkingDirectory>,
    pub layout: Option<DistributionLayout>,
    pub registry: Option<Registry>,
    pub client: Option<RbcClient>,
    pub bundles_report: Option<OverlayReport>,
    pub config_report: Option<OverlayReport>,
}

impl InitPipelineContext {
    pub fn new(
        container_id: String,
        options: Arc<ContainerOptions>,
        resolver: Arc<ArtifactResolver>,
    ) -> Self {
        let guard = CleanupGuard::new(container_id.clone(), options.keep_runtime_directory);
        Self {
            container_id,
            options,
            resolver,
            guard,
            working_dir: None,
            layout: None,
            registry: None,
            client: None,
            bundles_report: None,
            config_report: None,
        }
    }
}

/// Everything a successful start produces.
pub struct StartedRuntime {
    pub working_dir: WorkingDirectory,
    pub layout: DistributionLayout,
    pub handler: ScriptHandler,
    pub registry: Registry,
    pub client: RbcClient,
    pub overlay: OverlayReport,
}
