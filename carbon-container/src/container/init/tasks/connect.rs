//! Task: wait for the launched runtime to dial the registry.

use super::{InitCtx, log_task_error, task_start};
use crate::launcher::ProcessHandler;
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use carbon_shared::errors::{CarbonError, CarbonResult};

pub struct ConnectTask;

#[async_trait]
impl PipelineTask<InitCtx> for ConnectTask {
    async fn run(self: Box<Self>, ctx: InitCtx) -> CarbonResult<()> {
        let task_name = self.name();
        let container_id = task_start(&ctx, task_name).await;

        let (registry, mut handler, timeout, request_timeout) = {
            let mut ctx = ctx.lock().await;
            let registry = ctx
                .registry
                .take()
                .ok_or_else(|| CarbonError::Internal("launch task must run first".into()))?;
            let handler = ctx
                .guard
                .take_handler()
                .ok_or_else(|| CarbonError::Internal("launch task must run first".into()))?;
            (
                registry,
                handler,
                ctx.options.ready_timeout(),
                ctx.options.request_timeout(),
            )
        };

        // A runtime that dies during boot never connects; stop waiting then.
        let result = tokio::select! {
            accepted = registry.accept(timeout) => accepted,
            status = handler.wait() => match status {
                Ok(status) => Err(CarbonError::Launch(format!(
                    "runtime exited with {} before connecting to the registry",
                    status
                ))),
                Err(e) => Err(e),
            },
        };

        let mut ctx = ctx.lock().await;
        ctx.guard.set_handler(handler);
        ctx.registry = Some(registry);

        let client = result.inspect_err(|e| log_task_error(&container_id, task_name, e))?;
        tracing::info!(container_id = %container_id, name = client.name(), "Runtime connected");
        ctx.client = Some(client.with_request_timeout(request_timeout));
        Ok(())
    }

    fn name(&self) -> &str {
        "connect"
    }
}
