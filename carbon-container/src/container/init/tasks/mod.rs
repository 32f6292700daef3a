//! Startup pipeline tasks.

mod connect;
mod launch;
mod overlay;
mod provision;
mod ready;

pub use connect::ConnectTask;
pub use launch::LaunchTask;
pub use overlay::{BundlesTask, ConfigFilesTask};
pub use provision::ProvisionTask;
pub use ready::ReadyTask;

use super::types::InitPipelineContext;
use carbon_shared::errors::CarbonError;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type InitCtx = Arc<Mutex<InitPipelineContext>>;

/// Log task start and return the container id for later log lines.
async fn task_start(ctx: &InitCtx, task_name: &str) -> String {
    let container_id = ctx.lock().await.container_id.clone();
    tracing::debug!(container_id = %container_id, task = task_name, "Starting task");
    container_id
}

fn log_task_error(container_id: &str, task_name: &str, err: &CarbonError) {
    tracing::error!(container_id, task = task_name, error = %err, "Task failed");
}
