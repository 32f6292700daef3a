//! Task: provision the distribution into a fresh working directory.

use super::{InitCtx, log_task_error, task_start};
use crate::layout::WorkingDirectory;
use crate::pipeline::PipelineTask;
use crate::provision::provision;
use async_trait::async_trait;
use carbon_shared::errors::CarbonResult;
use std::sync::Arc;

pub struct ProvisionTask;

#[async_trait]
impl PipelineTask<InitCtx> for ProvisionTask {
    async fn run(self: Box<Self>, ctx: InitCtx) -> CarbonResult<()> {
        let task_name = self.name();
        let container_id = task_start(&ctx, task_name).await;

        let (options, resolver) = {
            let ctx = ctx.lock().await;
            (Arc::clone(&ctx.options), Arc::clone(&ctx.resolver))
        };

        let working_dir = WorkingDirectory::allocate(&options.distribution.unpack_base())
            .inspect_err(|e| log_task_error(&container_id, task_name, e))?;
        // Registered before provisioning so a failed unpack is removed too.
        ctx.lock()
            .await
            .guard
            .set_working_dir(working_dir.path().to_path_buf());

        let source = options.distribution.source()?;
        let layout = provision(source, working_dir.path(), &resolver)
            .await
            .inspect_err(|e| log_task_error(&container_id, task_name, e))?;

        tracing::info!(
            container_id = %container_id,
            distribution = options.distribution.display_name(),
            home = %layout.home().display(),
            "Distribution provisioned"
        );

        let mut ctx = ctx.lock().await;
        ctx.working_dir = Some(working_dir);
        ctx.layout = Some(layout);
        Ok(())
    }

    fn name(&self) -> &str {
        "provision"
    }
}
