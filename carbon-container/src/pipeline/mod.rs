//! Staged task execution.
//!
//! ```text
//! ExecutionPlan → Stages → Tasks
//!
//! - ExecutionPlan: ordered stages, run one after another
//! - Stage: tasks plus an execution mode (parallel/sequential)
//! - Task: one unit of work against a shared context
//! ```
//!
//! The first failing task aborts the plan. Tasks that already ran are
//! expected to register their side effects with the context so the caller
//! can undo them.

mod executor;
mod metrics;
mod stage;
mod task;

pub use executor::{ExecutionPlan, PipelineExecutor};
pub use metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
pub use stage::{ExecutionMode, Stage};
pub use task::{BoxedTask, PipelineTask};
