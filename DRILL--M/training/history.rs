use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::executor::TaskResult;

/// Record of one scenario run.
///
/// `success` is true whenever the task loop ran to the end without an abort,
/// even if individual tasks failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRunResult {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// Scenario id.
    pub scenario_id: String,
    /// Scenario display name.
    pub scenario_name: String,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// When the run finished or aborted.
    pub ended_at: DateTime<Utc>,
    /// Wall-clock run time.
    pub total_duration_seconds: f64,
    /// Task results in execution order.
    pub tasks: Vec<TaskResult>,
    /// Ran to completion without an abort.
    pub success: bool,
    /// Stopped by cancellation.
    #[serde(default)]
    pub cancelled: bool,
    /// Abort reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScenarioRunResult {
    pub(crate) fn start(scenario_id: &str, scenario_name: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            scenario_id: scenario_id.to_string(),
            scenario_name: scenario_name.to_string(),
            started_at: now,
            ended_at: now,
            total_duration_seconds: 0.0,
            tasks: Vec::new(),
            success: false,
            cancelled: false,
            error: None,
        }
    }

    /// Tasks that completed.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|task| task.is_completed()).count()
    }

    /// Tasks that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.tasks.len() - self.completed_count()
    }
}

/// Append-only log of finished runs, in completion order.
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    entries: Arc<RwLock<Vec<Arc<ScenarioRunResult>>>>,
}

impl TrainingHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, run: ScenarioRunResult) -> Arc<ScenarioRunResult> {
        let run = Arc::new(run);
        self.entries.write().push(Arc::clone(&run));
        run
    }

    /// Every run so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<ScenarioRunResult>> {
        self.entries.read().clone()
    }

    /// Most recently appended run.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<ScenarioRunResult>> {
        self.entries.read().last().cloned()
    }

    /// Runs for one scenario, oldest first.
    #[must_use]
    pub fn for_scenario(&self, scenario_id: &str) -> Vec<Arc<ScenarioRunResult>> {
        self.entries
            .read()
            .iter()
            .filter(|run| run.scenario_id == scenario_id)
            .cloned()
            .collect()
    }

    /// Number of runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has run yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
