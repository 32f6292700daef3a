//! Lifecycle controller.
//!
//! [`CarbonTestContainer`] owns one runtime instance: its working directory,
//! its process and its control channel. `start`, `stop` and every remote
//! operation are serialised through one async mutex, so a second concurrent
//! `start` waits for the first and then fails with `InvalidState`.

mod init;
mod lifecycle;
mod state;

pub use state::ContainerState;

use crate::launcher::ProcessHandler;
use crate::options::ContainerOptions;
use crate::overlay::OverlayReport;
use crate::pipeline::PipelineMetrics;
use crate::remote::{RbcClient, RemoteBundleContext};
use carbon_shared::errors::{CarbonError, CarbonResult};
use carbon_shared::protocol::{BundleId, BundleState, Endpoint, SYSTEM_BUNDLE_ID, TestAddress};
use chrono::{DateTime, Utc};
use init::{ContainerBuilder, StartedRuntime};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Point-in-time view of a container.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub state: ContainerState,
    pub working_directory: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub endpoint: Option<Endpoint>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub startup: Option<PipelineMetrics>,
    pub overlay_failures: usize,
}

#[derive(Default)]
struct Inner {
    runtime: Option<StartedRuntime>,
    metrics: Option<PipelineMetrics>,
    started_at: Option<DateTime<Utc>>,
}

/// A Carbon distribution running as a separate process under test.
pub struct CarbonTestContainer {
    id: String,
    options: Arc<ContainerOptions>,
    state: RwLock<ContainerState>,
    inner: Mutex<Inner>,
}

impl CarbonTestContainer {
    /// Create a container. Nothing is provisioned until [`start`](Self::start).
    pub fn new(options: ContainerOptions) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(container_id = %id, distribution = options.distribution.display_name(), "Container created");
        Self {
            id,
            options: Arc::new(options),
            state: RwLock::new(ContainerState::Created),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    pub fn state(&self) -> ContainerState {
        *self.state.read()
    }

    fn set_state(&self, state: ContainerState) {
        let mut current = self.state.write();
        tracing::debug!(container_id = %self.id, from = %*current, to = %state, "State transition");
        *current = state;
    }

    /// Provision, launch and wait until the runtime is ready.
    ///
    /// Configuration errors are reported before anything touches the file
    /// system. Any later failure kills the process, removes the working
    /// directory (unless kept) and leaves the container in `Created`. So does
    /// dropping the returned future before it completes.
    pub async fn start(&self) -> CarbonResult<()> {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if !state.can_start() {
            return Err(CarbonError::InvalidState(format!(
                "cannot start container in {} state",
                state
            )));
        }

        let builder = ContainerBuilder::new(self.id.clone(), Arc::clone(&self.options))?;

        tracing::info!(
            container_id = %self.id,
            distribution = self.options.distribution.display_name(),
            "Starting container"
        );
        self.set_state(ContainerState::Starting);
        let attempt = StartAttempt::new(self);

        match builder.build().await {
            Ok((runtime, metrics)) => {
                inner.runtime = Some(runtime);
                inner.metrics = Some(metrics);
                inner.started_at = Some(Utc::now());
                attempt.commit();
                tracing::info!(container_id = %self.id, "Container started");
                Ok(())
            }
            Err(e) => {
                drop(attempt);
                tracing::error!(container_id = %self.id, error = %e, "Container failed to start");
                Err(e)
            }
        }
    }

    /// Stop the runtime and remove its working directory.
    ///
    /// Only valid once, from `Started`. Remote and cleanup errors are logged;
    /// a directory that cannot be removed now is removed at process exit.
    pub async fn stop(&self) -> CarbonResult<()> {
        let mut inner = self.inner.lock().await;

        let state = self.state();
        if !state.can_stop() {
            return Err(CarbonError::InvalidState(format!(
                "cannot stop container in {} state",
                state
            )));
        }

        let runtime = inner
            .runtime
            .take()
            .ok_or_else(|| CarbonError::Internal("started container has no runtime".into()))?;

        self.set_state(ContainerState::Stopping);
        lifecycle::shutdown(
            &self.id,
            runtime,
            self.options.stop_grace_period(),
            self.options.keep_runtime_directory,
        )
        .await;
        self.set_state(ContainerState::Stopped);
        Ok(())
    }

    /// Run a remote test.
    pub async fn call(&self, address: &TestAddress) -> CarbonResult<()> {
        let mut inner = self.inner.lock().await;
        let client = self.client(&mut inner, "call")?;
        tracing::debug!(container_id = %self.id, caption = %address.caption, "Calling remote test");
        client.call(address).await
    }

    pub async fn install(&self, location: &str, content: Vec<u8>) -> CarbonResult<BundleId> {
        let mut inner = self.inner.lock().await;
        self.client(&mut inner, "install")?
            .install(location, content)
            .await
    }

    pub async fn install_probe(&self, content: Vec<u8>) -> CarbonResult<BundleId> {
        let mut inner = self.inner.lock().await;
        self.client(&mut inner, "install_probe")?
            .install_probe(content)
            .await
    }

    pub async fn uninstall_probe(&self) -> CarbonResult<()> {
        let mut inner = self.inner.lock().await;
        self.client(&mut inner, "uninstall_probe")?
            .uninstall_probe()
            .await
    }

    pub async fn bundle_state(&self, bundle_id: BundleId) -> CarbonResult<BundleState> {
        let mut inner = self.inner.lock().await;
        self.client(&mut inner, "bundle_state")?
            .bundle_state(bundle_id)
            .await
    }

    /// Wait until the system bundle is active.
    ///
    /// A timeout leaves the runtime running; the caller decides whether to stop it.
    pub async fn wait_for_ready(&self, timeout: Duration) -> CarbonResult<()> {
        let poll_interval = self.options.ready_poll_interval();
        let mut inner = self.inner.lock().await;
        self.client(&mut inner, "wait_for_ready")?
            .wait_for_state(SYSTEM_BUNDLE_ID, BundleState::Active, timeout, poll_interval)
            .await
    }

    /// Overlay results of the current run.
    pub async fn overlay_report(&self) -> Option<OverlayReport> {
        let inner = self.inner.lock().await;
        inner.runtime.as_ref().map(|r| r.overlay.clone())
    }

    pub async fn info(&self) -> ContainerInfo {
        let inner = self.inner.lock().await;
        let runtime = inner.runtime.as_ref();
        ContainerInfo {
            id: self.id.clone(),
            name: self.options.distribution.display_name().to_string(),
            state: self.state(),
            working_directory: runtime.map(|r| r.working_dir.path().to_path_buf()),
            home: runtime.map(|r| r.layout.home().to_path_buf()),
            endpoint: runtime.map(|r| r.registry.endpoint().clone()),
            pid: runtime.map(|r| r.handler.pid()),
            started_at: inner.started_at,
            startup: inner.metrics.clone(),
            overlay_failures: runtime.map(|r| r.overlay.failures.len()).unwrap_or(0),
        }
    }

    fn client<'a>(&self, inner: &'a mut Inner, operation: &str) -> CarbonResult<&'a mut RbcClient> {
        let state = self.state();
        if !state.accepts_calls() {
            return Err(CarbonError::InvalidState(format!(
                "cannot {} in {} state",
                operation, state
            )));
        }
        inner
            .runtime
            .as_mut()
            .map(|r| &mut r.client)
            .ok_or_else(|| CarbonError::Internal("started container has no runtime".into()))
    }
}

/// Moves a container out of `Starting`.
///
/// Unless committed, dropping it returns the container to `Created`. That
/// covers a `start()` future dropped mid-way as well as a failed start; the
/// startup pipeline's own guard has already released the resources.
struct StartAttempt<'a> {
    container: &'a CarbonTestContainer,
    committed: bool,
}

impl<'a> StartAttempt<'a> {
    fn new(container: &'a CarbonTestContainer) -> Self {
        Self {
            container,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
        self.container.set_state(ContainerState::Started);
    }
}

impl Drop for StartAttempt<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.container.set_state(ContainerState::Created);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_without_start() {
        let base = tempfile::tempdir().unwrap();
        let mut options = ContainerOptions::from_directory(base.path().join("dist"));
        options.distribution.unpack_directory = Some(base.path().join("work"));
        let container = CarbonTestContainer::new(options);

        let err = container.stop().await.unwrap_err();
        assert!(matches!(err, CarbonError::InvalidState(_)));
        assert_eq!(container.state(), ContainerState::Created);
        assert!(!base.path().join("work").exists());
    }

    #[tokio::test]
    async fn test_calls_rejected_before_start() {
        let container = CarbonTestContainer::new(ContainerOptions::from_directory("/nonexistent"));
        let err = container.call(&TestAddress::new("anything")).await.unwrap_err();
        assert!(matches!(err, CarbonError::InvalidState(_)));
        let err = container
            .wait_for_ready(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CarbonError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_source_count_checked_without_side_effects() {
        let base = tempfile::tempdir().unwrap();
        let work = base.path().join("work");

        let mut none = ContainerOptions::default();
        none.distribution.unpack_directory = Some(work.clone());
        let err = CarbonTestContainer::new(none).start().await.unwrap_err();
        assert!(matches!(err, CarbonError::Config(_)));

        let mut two = ContainerOptions::from_directory(base.path());
        two.distribution.archive = Some(base.path().join("dist.zip"));
        two.distribution.unpack_directory = Some(work.clone());
        let container = CarbonTestContainer::new(two);
        let err = container.start().await.unwrap_err();
        assert!(matches!(err, CarbonError::Config(ref m) if m.contains("2 distribution sources")));
        assert_eq!(container.state(), ContainerState::Created);

        assert!(!work.exists());
    }

    #[tokio::test]
    async fn test_failed_provision_cleans_up() {
        let base = tempfile::tempdir().unwrap();
        let work = base.path().join("work");
        let mut options = ContainerOptions::from_archive(base.path().join("missing.zip"));
        options.distribution.unpack_directory = Some(work.clone());
        let container = CarbonTestContainer::new(options);

        let err = container.start().await.unwrap_err();
        assert!(matches!(err, CarbonError::Provisioning(_)));
        assert_eq!(container.state(), ContainerState::Created);
        // Only the unpack base remains; the per-run directory is gone.
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);

        let info = container.info().await;
        assert!(info.working_directory.is_none());
        assert!(info.pid.is_none());
    }
}
