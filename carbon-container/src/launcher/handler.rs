//! ProcessHandler - runtime operations on a launched distribution.

use crate::util::{kill_process_group, terminate_process_group};
use async_trait::async_trait;
use carbon_shared::errors::{CarbonError, CarbonResult};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;

/// Operations on a running distribution process.
///
/// Separates runtime operations from launching, the same way the lifecycle
/// controller separates `start` from everything that follows it.
#[async_trait]
pub trait ProcessHandler: Send {
    /// Terminate the process group: SIGTERM, then SIGKILL after `grace`.
    async fn stop(&mut self, grace: Duration) -> CarbonResult<()>;

    /// Non-blocking check for an exit status.
    fn try_exit_status(&mut self) -> Option<ExitStatus>;

    /// Resolves once the process exits.
    async fn wait(&mut self) -> CarbonResult<ExitStatus>;

    fn is_running(&mut self) -> bool {
        self.try_exit_status().is_none()
    }

    fn pid(&self) -> u32;

    /// Kill without waiting. Used on drop and failure paths.
    fn kill(&mut self);
}

/// Handler for an entry-point script spawned by this process.
#[derive(Debug)]
pub struct ScriptHandler {
    child: Child,
    pid: u32,
}

impl ScriptHandler {
    pub(crate) fn new(child: Child) -> CarbonResult<Self> {
        let pid = child
            .id()
            .ok_or_else(|| CarbonError::Launch("process exited before its pid was read".into()))?;
        Ok(Self { child, pid })
    }
}

#[async_trait]
impl ProcessHandler for ScriptHandler {
    async fn stop(&mut self, grace: Duration) -> CarbonResult<()> {
        if let Some(status) = self.try_exit_status() {
            tracing::debug!(pid = self.pid, ?status, "Process already exited");
            // Stragglers forked by the script may still hold the group.
            kill_process_group(self.pid);
            return Ok(());
        }

        terminate_process_group(self.pid);
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(pid = self.pid, ?status, "Process terminated");
                kill_process_group(self.pid);
                Ok(())
            }
            Ok(Err(e)) => Err(CarbonError::Internal(format!(
                "failed to wait for process {}: {}",
                self.pid, e
            ))),
            Err(_) => {
                tracing::warn!(pid = self.pid, grace = ?grace, "Process ignored SIGTERM, killing");
                kill_process_group(self.pid);
                self.child.kill().await.map_err(|e| {
                    CarbonError::Internal(format!("failed to kill process {}: {}", self.pid, e))
                })
            }
        }
    }

    fn try_exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    async fn wait(&mut self) -> CarbonResult<ExitStatus> {
        self.child.wait().await.map_err(|e| {
            CarbonError::Internal(format!("failed to wait for process {}: {}", self.pid, e))
        })
    }

    fn pid(&self) -> u32 {
        self.pid
    }

    fn kill(&mut self) {
        kill_process_group(self.pid);
        let _ = self.child.start_kill();
    }
}
