use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::TrainingError;

/// Task urgency as declared by the scenario author.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default urgency.
    #[default]
    Medium,
    /// Time-sensitive work.
    High,
    /// Blocks the rest of the pipeline.
    Critical,
}

impl Priority {
    /// Label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Scenario difficulty tag.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Single hand-off or two.
    #[default]
    Basic,
    /// Multi-role pipeline.
    Intermediate,
    /// Full delivery pipeline.
    Advanced,
}

impl Complexity {
    /// Label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

/// One unit of work handed to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique within the owning scenario.
    #[serde(default)]
    pub id: String,
    /// Display name; also keys the canned output table.
    #[serde(default)]
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Agent roster key. Not checked against any closed set.
    #[serde(default)]
    pub assigned_agent: String,
    /// Declared urgency.
    #[serde(default)]
    pub priority: Priority,
    /// What a good result looks like.
    #[serde(default)]
    pub expected_outcome: String,
    /// Criteria judged individually after a successful run.
    #[serde(default)]
    pub success_criteria: Vec<String>,
}

impl TaskDefinition {
    /// Creates a task with empty description, outcome, and criteria.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        assigned_agent: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            assigned_agent: assigned_agent.into(),
            priority: Priority::default(),
            expected_outcome: String::new(),
            success_criteria: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the expected outcome.
    #[must_use]
    pub fn with_expected_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.expected_outcome = outcome.into();
        self
    }

    /// Appends a success criterion.
    #[must_use]
    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.success_criteria.push(criterion.into());
        self
    }

    /// Checks the required fields.
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.id.trim().is_empty() {
            return Err(TrainingError::invalid_task(&self.id, "missing id"));
        }
        if self.name.trim().is_empty() {
            return Err(TrainingError::invalid_task(&self.id, "missing name"));
        }
        if self.assigned_agent.trim().is_empty() {
            return Err(TrainingError::invalid_task(&self.id, "missing assigned agent"));
        }
        Ok(())
    }
}

/// Ordered pipeline of tasks. Task order is execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Unique registry key.
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Difficulty tag.
    #[serde(default)]
    pub complexity: Complexity,
    /// Advisory only; never enforced.
    #[serde(default)]
    pub expected_duration_minutes: u32,
    /// Tasks in execution order.
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
}

impl ScenarioDefinition {
    /// Creates an empty scenario.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            complexity: Complexity::default(),
            expected_duration_minutes: 0,
            tasks: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets complexity.
    #[must_use]
    pub const fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    /// Sets the advisory duration.
    #[must_use]
    pub const fn with_expected_duration(mut self, minutes: u32) -> Self {
        self.expected_duration_minutes = minutes;
        self
    }

    /// Appends a task at the end of the pipeline.
    #[must_use]
    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.tasks.push(task);
        self
    }

    /// Distinct agents in order of first assignment.
    #[must_use]
    pub fn agents(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tasks
            .iter()
            .map(|task| task.assigned_agent.as_str())
            .filter(|agent| seen.insert(*agent))
            .collect()
    }

    /// Checks the scenario and every task; task ids must be unique.
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.id.trim().is_empty() {
            return Err(TrainingError::InvalidScenarioDefinition(
                "missing scenario id".into(),
            ));
        }
        let mut ids = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !ids.insert(task.id.as_str()) {
                return Err(TrainingError::invalid_task(
                    &task.id,
                    format!("duplicate task id in scenario `{}`", self.id),
                ));
            }
        }
        Ok(())
    }
}
