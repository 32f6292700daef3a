use async_trait::async_trait;
use carbon_shared::errors::CarbonResult;

/// A unit of work run by the pipeline against a shared context.
///
/// The context is cloned per task, so it is normally an `Arc` around
/// interior-mutable state.
#[async_trait]
pub trait PipelineTask<Ctx>: Send + Sync {
    async fn run(self: Box<Self>, ctx: Ctx) -> CarbonResult<()>;

    /// Stable name used in logs and metrics.
    fn name(&self) -> &str;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;
