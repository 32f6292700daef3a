//! Container startup orchestration.
//!
//! ```text
//!   1. Provision            (working directory + distribution tree)
//!   2. ExternalBundles ─┬─  (osgi/dropins)
//!      ConfigFiles     ─┘   (overlay configuration)
//!   3. Launch               (registry + entry point)
//!   4. Connect              (runtime dials back)
//!   5. Ready                (system bundle active)
//! ```
//!
//! `CleanupGuard` undoes a partial start when any task fails.

mod tasks;
mod types;

pub(crate) use types::StartedRuntime;

use crate::options::ContainerOptions;
use crate::overlay::OverlayReport;
use crate::pipeline::{BoxedTask, ExecutionPlan, PipelineExecutor, PipelineMetrics, Stage};
use crate::provision::ArtifactResolver;
use carbon_shared::errors::{CarbonError, CarbonResult};
use std::sync::Arc;
use tokio::sync::Mutex;

use tasks::{BundlesTask, ConfigFilesTask, ConnectTask, InitCtx, LaunchTask, ProvisionTask, ReadyTask};
use types::InitPipelineContext;

fn execution_plan() -> ExecutionPlan<InitCtx> {
    let stages: Vec<Stage<BoxedTask<InitCtx>>> = vec![
        Stage::sequential(vec![Box::new(ProvisionTask)]),
        // Disjoint parts of the tree.
        Stage::parallel(vec![Box::new(BundlesTask), Box::new(ConfigFilesTask)]),
        Stage::sequential(vec![Box::new(LaunchTask)]),
        Stage::sequential(vec![Box::new(ConnectTask)]),
        Stage::sequential(vec![Box::new(ReadyTask)]),
    ];
    ExecutionPlan::new(stages)
}

/// Runs the startup pipeline for one container.
pub(crate) struct ContainerBuilder {
    container_id: String,
    options: Arc<ContainerOptions>,
}

impl ContainerBuilder {
    pub(crate) fn new(container_id: String, options: Arc<ContainerOptions>) -> CarbonResult<Self> {
        options.sanitize()?;
        Ok(Self {
            container_id,
            options,
        })
    }

    /// Start the runtime. On error everything created so far is undone.
    pub(crate) async fn build(self) -> CarbonResult<(StartedRuntime, PipelineMetrics)> {
        let ContainerBuilder {
            container_id,
            options,
        } = self;

        let resolver = Arc::new(ArtifactResolver::from_options(&options)?);
        let ctx = InitPipelineContext::new(container_id.clone(), options, resolver);
        let ctx = Arc::new(Mutex::new(ctx));

        let metrics = PipelineExecutor::execute(execution_plan(), Arc::clone(&ctx)).await?;
        metrics.log(&container_id);

        let mut ctx = ctx.lock().await;
        let handler = ctx
            .guard
            .take_handler()
            .ok_or_else(|| CarbonError::Internal("launch task must run first".into()))?;
        let working_dir = ctx
            .working_dir
            .take()
            .ok_or_else(|| CarbonError::Internal("provision task must run first".into()))?;
        let layout = ctx
            .layout
            .take()
            .ok_or_else(|| CarbonError::Internal("provision task must run first".into()))?;
        let registry = ctx
            .registry
            .take()
            .ok_or_else(|| CarbonError::Internal("launch task must run first".into()))?;
        let client = ctx
            .client
            .take()
            .ok_or_else(|| CarbonError::Internal("connect task must run first".into()))?;

        let mut overlay = OverlayReport::default();
        overlay.merge(ctx.bundles_report.take().unwrap_or_default());
        overlay.merge(ctx.config_report.take().unwrap_or_default());
        if !overlay.is_complete() {
            tracing::warn!(
                container_id = %container_id,
                failed = overlay.failures.len(),
                "Some overlays could not be applied"
            );
        }

        ctx.guard.disarm();

        Ok((
            StartedRuntime {
                working_dir,
                layout,
                handler,
                registry,
                client,
                overlay,
            },
            metrics,
        ))
    }
}
