//! Tasks: external bundles and configuration files.
//!
//! Both only touch their own part of the tree and run in parallel. Item
//! failures are recorded in the report, never returned.

use super::{InitCtx, task_start};
use crate::overlay::{copy_config_files, copy_external_bundles};
use crate::pipeline::PipelineTask;
use async_trait::async_trait;
use carbon_shared::errors::{CarbonError, CarbonResult};
use std::sync::Arc;

pub struct BundlesTask;

#[async_trait]
impl PipelineTask<InitCtx> for BundlesTask {
    async fn run(self: Box<Self>, ctx: InitCtx) -> CarbonResult<()> {
        let task_name = self.name();
        let container_id = task_start(&ctx, task_name).await;

        let (layout, options, resolver) = {
            let ctx = ctx.lock().await;
            let layout = ctx
                .layout
                .clone()
                .ok_or_else(|| CarbonError::Internal("provision task must run first".into()))?;
            (layout, Arc::clone(&ctx.options), Arc::clone(&ctx.resolver))
        };

        let report = copy_external_bundles(&layout, &options.external_bundles, &resolver).await;
        tracing::debug!(
            container_id = %container_id,
            applied = report.applied.len(),
            failed = report.failures.len(),
            "External bundles copied"
        );

        ctx.lock().await.bundles_report = Some(report);
        Ok(())
    }

    fn name(&self) -> &str {
        "external_bundles"
    }
}

pub struct ConfigFilesTask;

#[async_trait]
impl PipelineTask<InitCtx> for ConfigFilesTask {
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

        let report = copy_config_files(&layout, &options.config_files).await;
        tracing::debug!(
            container_id = %container_id,
            applied = report.applied.len(),
            failed = report.failures.len(),
            "Configuration files copied"
        );

        ctx.lock().await.config_report = Some(report);
        Ok(())
    }

    fn name(&self) -> &str {
        "config_files"
    }
}
