use super::metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
use super::stage::{ExecutionMode, Stage};
use super::task::BoxedTask;
use carbon_shared::errors::CarbonResult;
use futures::future::try_join_all;
use std::time::Instant;

/// Ordered stages to run.
pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<BoxedTask<Ctx>>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<BoxedTask<Ctx>>>) -> Self {
        Self { stages }
    }
}

/// Run one task and time it.
async fn run_timed<Ctx>(task: BoxedTask<Ctx>, ctx: Ctx) -> CarbonResult<TaskMetrics> {
    let name = task.name().to_string();
    let started = Instant::now();
    task.run(ctx).await?;
    Ok(TaskMetrics {
        name,
        duration_ms: started.elapsed().as_millis(),
    })
}

pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run every stage of `plan` in order, sharing `ctx` between tasks.
    pub async fn execute<Ctx>(plan: ExecutionPlan<Ctx>, ctx: Ctx) -> CarbonResult<PipelineMetrics>
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::with_capacity(plan.stages.len());

        for (index, stage) in plan.stages.into_iter().enumerate() {
            let execution = stage.execution;
            let stage_start = Instant::now();

            let tasks = match execution {
                ExecutionMode::Parallel => {
                    try_join_all(
                        stage
                            .tasks
                            .into_iter()
                            .map(|task| run_timed(task, ctx.clone())),
                    )
                    .await?
                }
                ExecutionMode::Sequential => {
                    let mut tasks = Vec::with_capacity(stage.tasks.len());
                    for task in stage.tasks {
                        tasks.push(run_timed(task, ctx.clone()).await?);
                    }
                    tasks
                }
            };

            stage_metrics.push(StageMetrics {
                index,
                execution,
                duration_ms: stage_start.elapsed().as_millis(),
                tasks,
            });
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            stages: stage_metrics,
        })
    }
}
