use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{executor::TaskResult, history::ScenarioRunResult};

/// Rolling statistics for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPerformanceRecord {
    /// Agent identifier.
    pub agent_id: String,
    /// Tasks executed, successful or not.
    pub tasks_completed: u64,
    /// Sum of task durations.
    pub total_duration_seconds: f64,
    /// Incremental mean of 100/0 per-task scores.
    pub success_rate: f64,
    /// Every criterion this agent has ever passed; only grows.
    pub capabilities: IndexSet<String>,
    /// Time of the most recent update.
    pub last_updated: DateTime<Utc>,
}

impl AgentPerformanceRecord {
    fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            tasks_completed: 0,
            total_duration_seconds: 0.0,
            success_rate: 0.0,
            capabilities: IndexSet::new(),
            last_updated: Utc::now(),
        }
    }

    /// Mean task duration, zero before the first task.
    #[must_use]
    pub fn average_duration_seconds(&self) -> f64 {
        if self.tasks_completed == 0 {
            0.0
        } else {
            self.total_duration_seconds / self.tasks_completed as f64
        }
    }

    fn apply(&mut self, result: &TaskResult) {
        self.tasks_completed += 1;
        let n = self.tasks_completed as f64;
        let score = if result.is_completed() { 100.0 } else { 0.0 };
        self.success_rate = self.success_rate.mul_add(n - 1.0, score) / n;
        self.total_duration_seconds += result.duration_seconds;
        for criterion in result.passed_criteria() {
            if !self.capabilities.contains(criterion) {
                self.capabilities.insert(criterion.to_string());
            }
        }
        self.last_updated = Utc::now();
    }
}

/// Per-agent performance records, created lazily for any agent id.
///
/// Clones share storage; every update takes the write lock, so concurrent
/// recorders are applied one at a time.
#[derive(Debug, Clone, Default)]
pub struct AgentPerformanceLedger {
    inner: Arc<RwLock<IndexMap<String, AgentPerformanceRecord>>>,
}

impl AgentPerformanceLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger by replaying every task of `runs` in order.
    #[must_use]
    pub fn replay<'a>(runs: impl IntoIterator<Item = &'a ScenarioRunResult>) -> Self {
        let ledger = Self::new();
        for run in runs {
            for result in &run.tasks {
                ledger.record_result(&result.assigned_agent, result);
            }
        }
        ledger
    }

    /// Folds a task result into the agent's record and returns the updated record.
    pub fn record_result(&self, agent_id: &str, result: &TaskResult) -> AgentPerformanceRecord {
        let mut inner = self.inner.write();
        let record = inner
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentPerformanceRecord::new(agent_id));
        record.apply(result);
        record.clone()
    }

    /// Record for one agent.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<AgentPerformanceRecord> {
        self.inner.read().get(agent_id).cloned()
    }

    /// Every record, in order of first appearance.
    #[must_use]
    pub fn list(&self) -> Vec<AgentPerformanceRecord> {
        self.inner.read().values().cloned().collect()
    }

    /// Number of agents seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether no agent has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
