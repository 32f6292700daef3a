//! Task: poll the system bundle until it is active.

use super::{InitCtx, log_task_error, task_start};
use crate::pipeline::PipelineTask;
use crate::remote::RemoteBundleContext;
use async_trait::async_trait;
use carbon_shared::errors::{CarbonError, CarbonResult};
use carbon_shared::protocol::{BundleState, SYSTEM_BUNDLE_ID};

pub struct ReadyTask;

#[async_trait]
impl PipelineTask<InitCtx> for ReadyTask {
    async fn run(self: Box<Self>, ctx: InitCtx) -> CarbonResult<()> {
        let task_name = self.name();
        let container_id = task_start(&ctx, task_name).await;

        let mut ctx = ctx.lock().await;
        let timeout = ctx.options.ready_timeout();
        let poll_interval = ctx.options.ready_poll_interval();
        let client = ctx
            .client
            .as_mut()
            .ok_or_else(|| CarbonError::Internal("connect task must run first".into()))?;

        client
            .wait_for_state(SYSTEM_BUNDLE_ID, BundleState::Active, timeout, poll_interval)
            .await
            .inspect_err(|e| log_task_error(&container_id, task_name, e))?;

        tracing::info!(container_id = %container_id, "Runtime ready");
        Ok(())
    }

    fn name(&self) -> &str {
        "ready"
    }
}
