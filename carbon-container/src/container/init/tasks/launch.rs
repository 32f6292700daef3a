//! Task: open the registry and launch the entry point.

use super::{InitCtx, log_task_error, task_start};
use crate::launcher::{CARBON_HOME_PROPERTY, LaunchSpec, launch, make_scripts_executable};
use crate::layout::DistributionLayout;
use crate::options::SystemProperty;
use crate::pipeline::PipelineTask;
use crate::remote::{REGISTRY_HOST, Registry};
use async_trait::async_trait;
use carbon_shared::Endpoint;
use carbon_shared::errors::{CarbonError, CarbonResult};
use carbon_shared::protocol::INJECT_PROPERTY;
use std::sync::Arc;

pub struct LaunchTask;

#[async_trait]
impl PipelineTask<InitCtx> for LaunchTask {
    async fn run(self: Box<Self>, ctx: InitCtx) -> CarbonResult<()> {
        let task_name = self.name();
        let container_id = task_start(&ctx, task_name).await;

        let (layout, options) = {
            let ctx = ctx.lock().await;
            let layout = ctx
                .layout
                .clone()
                .ok_or_else(|| CarbonError::Internal("provision task must run first".into()))?;
            (layout, Arc::clone(&ctx.options))
        };

        let registry = Registry::bind(options.port_range, REGISTRY_HOST)
            .await
            .inspect_err(|e| log_task_error(&container_id, task_name, e))?;

        let scripts = make_scripts_executable(&layout.bin_dir())
            .inspect_err(|e| log_task_error(&container_id, task_name, e))?;
        tracing::debug!(container_id = %container_id, scripts, "Marked scripts executable");

        let injected = injected_properties(&layout, registry.endpoint());
        let spec = LaunchSpec::build(&layout, &options.launch, &injected);
        let handler =
            launch(&spec).inspect_err(|e| log_task_error(&container_id, task_name, e))?;

        let mut ctx = ctx.lock().await;
        ctx.guard.set_handler(handler);
        ctx.registry = Some(registry);
        Ok(())
    }

    fn name(&self) -> &str {
        "launch"
    }
}

/// Properties every launch carries ahead of the user's own.
fn injected_properties(layout: &DistributionLayout, endpoint: &Endpoint) -> Vec<SystemProperty> {
    let mut properties = vec![SystemProperty::new(
        CARBON_HOME_PROPERTY,
        layout.home().display().to_string(),
    )];
    properties.extend(
        endpoint
            .to_properties()
            .into_iter()
            .map(|(key, value)| SystemProperty::new(key, value)),
    );
    properties.push(SystemProperty::new(INJECT_PROPERTY, "true"));
    properties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_properties() {
        let layout = DistributionLayout::new("/work/abc/wso2carbon");
        let endpoint = Endpoint {
            host: "127.0.0.1".into(),
            port: 21042,
            name: "CarbonTestContainer-x".into(),
        };
        let flags: Vec<String> = injected_properties(&layout, &endpoint)
            .iter()
            .map(SystemProperty::to_flag)
            .collect();
        assert_eq!(
            flags,
            vec![
                "-Dcarbon.home=/work/abc/wso2carbon",
                "-Dcarbon.test.rbc.host=127.0.0.1",
                "-Dcarbon.test.rbc.port=21042",
                "-Dcarbon.test.rbc.name=CarbonTestContainer-x",
                "-Dcarbon.test.inject=true",
            ]
        );
    }
}
