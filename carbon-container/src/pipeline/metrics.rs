use super::ExecutionMode;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct TaskMetrics {
    pub name: String,
    pub duration_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageMetrics {
    pub index: usize,
    #[serde(skip)]
    pub execution: ExecutionMode,
    pub duration_ms: u128,
    pub tasks: Vec<TaskMetrics>,
}

/// Wall-clock timings of one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineMetrics {
    pub total_duration_ms: u128,
    pub stages: Vec<StageMetrics>,
}

impl PipelineMetrics {
    pub fn task_duration_ms(&self, name: &str) -> Option<u128> {
        self.tasks()
            .find(|task| task.name == name)
            .map(|task| task.duration_ms)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskMetrics> {
        self.stages.iter().flat_map(|stage| stage.tasks.iter())
    }

    /// Emit one log line per task.
    pub fn log(&self, container_id: &str) {
        for task in self.tasks() {
            tracing::debug!(
                container_id,
                task = %task.name,
                duration_ms = task.duration_ms as u64,
                "Startup task timing"
            );
        }
        tracing::info!(
            container_id,
            total_ms = self.total_duration_ms as u64,
            stages = self.stages.len(),
            "Startup pipeline completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_lookup_across_stages() {
        let metrics = PipelineMetrics {
            total_duration_ms: 30,
            stages: vec![
                StageMetrics {
                    index: 0,
                    execution: ExecutionMode::Sequential,
                    duration_ms: 10,
                    tasks: vec![TaskMetrics {
                        name: "provision".into(),
                        duration_ms: 10,
                    }],
                },
                StageMetrics {
                    index: 1,
                    execution: ExecutionMode::Parallel,
                    duration_ms: 20,
                    tasks: vec![
                        TaskMetrics {
                            name: "bundles".into(),
                            duration_ms: 20,
                        },
                        TaskMetrics {
                            name: "config_files".into(),
                            duration_ms: 5,
                        },
                    ],
                },
            ],
        };
        assert_eq!(metrics.task_duration_ms("config_files"), Some(5));
        assert_eq!(metrics.task_duration_ms("launch"), None);
        assert_eq!(metrics.tasks().count(), 3);
    }
}
