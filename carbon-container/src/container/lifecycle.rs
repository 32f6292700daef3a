//! Container shutdown and the Drop fallback.

use super::CarbonTestContainer;
use super::init::StartedRuntime;
use crate::cleanup::{defer_removal, remove_dir_or_defer};
use crate::launcher::ProcessHandler;
use crate::remote::RemoteBundleContext;
use std::time::Duration;

/// Tear a started runtime down. Failures are logged, never returned.
///
/// Order: remote stop (bounded by `grace`), release the control channel and registry, terminate
/// the process group, remove the working directory.
pub(super) async fn shutdown(
    container_id: &str,
    runtime: StartedRuntime,
    grace: Duration,
    keep_directory: bool,
) {
    let StartedRuntime {
        working_dir,
        mut handler,
        registry,
        mut client,
        ..
    } = runtime;

    tracing::info!(container_id, pid = handler.pid(), "Stopping container");

    // A wedged runtime must not keep the process group alive.
    match tokio::time::timeout(grace, client.stop()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(container_id, error = %e, "Remote stop failed"),
        Err(_) => tracing::warn!(container_id, ?grace, "Remote stop timed out"),
    }
    drop(client);
    drop(registry);

    if let Err(e) = handler.stop(grace).await {
        tracing::warn!(container_id, error = %e, "Failed to stop runtime process, killing");
        handler.kill();
    }

    if keep_directory {
        tracing::info!(container_id, path = %working_dir.path().display(), "Keeping working directory");
    } else if let Err(e) = remove_dir_or_defer(working_dir.path()) {
        tracing::warn!(container_id, error = %e, "Working directory removal deferred");
    }

    tracing::info!(container_id, "Container stopped");
}

impl Drop for CarbonTestContainer {
    fn drop(&mut self) {
        let Some(mut runtime) = self.inner.get_mut().runtime.take() else {
            return;
        };

        tracing::warn!(
            container_id = %self.id,
            pid = runtime.handler.pid(),
            "Container dropped while running, killing runtime"
        );
        runtime.handler.kill();

        if !self.options.keep_runtime_directory {
            defer_removal(runtime.working_dir.path());
        }
    }
}
