use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    error::TrainingError,
    scenario::TaskDefinition,
    work::{random_seed, WorkFunction, WorkOutcome},
};

/// Output recorded for every unsuccessful task.
pub const ADDITIONAL_TRAINING_OUTPUT: &str =
    "Task did not reach its expected outcome and requires additional training.";

/// Output recorded for successful tasks without a canned entry.
pub const GENERIC_SUCCESS_OUTPUT: &str =
    "Task completed successfully and all deliverables were handed off.";

/// Final state of an executed task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The work succeeded.
    Completed,
    /// The work did not succeed or ran out of time.
    Failed,
}

impl TaskStatus {
    /// Label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Verdict for one success criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionCheck {
    /// Criterion text, as declared on the task.
    pub criterion: String,
    /// Whether it was met.
    pub passed: bool,
}

/// Immutable record of one task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task id.
    pub task_id: String,
    /// Task display name.
    pub task_name: String,
    /// Agent the task was assigned to.
    pub assigned_agent: String,
    /// Outcome.
    pub status: TaskStatus,
    /// Duration reported by the work function (or the timeout budget).
    pub duration_seconds: f64,
    /// Synthesized output text.
    pub output: String,
    /// Per-criterion verdicts in declaration order.
    pub criteria: Vec<CriterionCheck>,
    /// Set when the work ran past the executor's timeout.
    #[serde(default)]
    pub timed_out: bool,
    /// When the result was produced.
    pub completed_at: DateTime<Utc>,
}

impl TaskResult {
    /// Whether the task completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Criteria that passed, in declaration order.
    pub fn passed_criteria(&self) -> impl Iterator<Item = &str> {
        self.criteria
            .iter()
            .filter(|check| check.passed)
            .map(|check| check.criterion.as_str())
    }
}

/// How individual criteria are judged on a successful task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionPolicy {
    /// Chance each criterion passes independently.
    pub pass_probability: f64,
}

impl CriterionPolicy {
    /// Policy with the given probability, clamped to `[0, 1]`. NaN falls back to
    /// the default.
    #[must_use]
    pub fn new(pass_probability: f64) -> Self {
        if pass_probability.is_nan() {
            return Self::default();
        }
        Self {
            pass_probability: pass_probability.clamp(0.0, 1.0),
        }
    }

    /// Every criterion of a successful task passes.
    #[must_use]
    pub const fn always_pass() -> Self {
        Self {
            pass_probability: 1.0,
        }
    }
}

impl Default for CriterionPolicy {
    fn default() -> Self {
        Self {
            pass_probability: 0.9,
        }
    }
}

/// Executes one task through a work function and synthesizes its result.
pub struct TaskExecutor {
    policy: CriterionPolicy,
    rng: Mutex<SmallRng>,
    timeout: Option<Duration>,
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl TaskExecutor {
    /// Creates an executor whose criterion draws come from `seed`.
    #[must_use]
    pub fn new(policy: CriterionPolicy, seed: u64) -> Self {
        Self {
            policy,
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
            timeout: None,
        }
    }

    /// Bounds each work call; overruns become task failures.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Criterion policy in use.
    #[must_use]
    pub const fn policy(&self) -> CriterionPolicy {
        self.policy
    }

    /// Per-task timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Runs `task` through `work`.
    ///
    /// An invalid task is rejected before the work function is called. A work
    /// function error is returned as [`TrainingError::Work`]; a timeout is not
    /// an error and yields a failed result.
    pub async fn execute(
        &self,
        task: &TaskDefinition,
        work: &dyn WorkFunction,
    ) -> Result<TaskResult, TrainingError> {
        task.validate()?;
        let attempt = match self.timeout {
            Some(budget) => tokio::time::timeout(budget, work.perform(task))
                .await
                .map_err(|_| budget),
            None => Ok(work.perform(task).await),
        };
        match attempt {
            Ok(Ok(outcome)) => Ok(self.synthesize(task, outcome)),
            Ok(Err(source)) => Err(TrainingError::Work {
                task_id: task.id.clone(),
                source,
            }),
            Err(budget) => Ok(timed_out(task, budget)),
        }
    }

    fn synthesize(&self, task: &TaskDefinition, outcome: WorkOutcome) -> TaskResult {
        let (status, output, criteria) = if outcome.succeeded {
            let criteria = {
                let mut rng = self.rng.lock();
                task.success_criteria
                    .iter()
                    .map(|criterion| CriterionCheck {
                        criterion: criterion.clone(),
                        passed: rng.gen_bool(self.policy.pass_probability),
                    })
                    .collect()
            };
            let output = canned_output(&task.name).unwrap_or(GENERIC_SUCCESS_OUTPUT);
            (TaskStatus::Completed, output.to_string(), criteria)
        } else {
            (
                TaskStatus::Failed,
                ADDITIONAL_TRAINING_OUTPUT.to_string(),
                failed_criteria(task),
            )
        };
        TaskResult {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            assigned_agent: task.assigned_agent.clone(),
            status,
            duration_seconds: outcome.duration_seconds.max(0.0),
            output,
            criteria,
            timed_out: false,
            completed_at: Utc::now(),
        }
    }
}

impl Default for TaskExecutor {
    fn default() -> Self {
        Self::new(CriterionPolicy::default(), random_seed())
    }
}

fn timed_out(task: &TaskDefinition, budget: Duration) -> TaskResult {
    TaskResult {
        task_id: task.id.clone(),
        task_name: task.name.clone(),
        assigned_agent: task.assigned_agent.clone(),
        status: TaskStatus::Failed,
        duration_seconds: budget.as_secs_f64(),
        output: format!(
            "Task exceeded its {:.1}s budget and requires additional training.",
            budget.as_secs_f64()
        ),
        criteria: failed_criteria(task),
        timed_out: true,
        completed_at: Utc::now(),
    }
}

fn failed_criteria(task: &TaskDefinition) -> Vec<CriterionCheck> {
    task.success_criteria
        .iter()
        .map(|criterion| CriterionCheck {
            criterion: criterion.clone(),
            passed: false,
        })
        .collect()
}

/// Canned deliverable text keyed by task name.
fn canned_output(task_name: &str) -> Option<&'static str> {
    let text = match task_name {
        "Requirements Analysis" => {
            "Captured stakeholder goals as 24 user stories with acceptance criteria and a prioritized backlog."
        }
        "System Architecture Design" => {
            "Produced a service-oriented architecture with catalogue, cart, checkout, and payment components plus a normalized data model."
        }
        "Backend Implementation" => {
            "Implemented REST endpoints for catalogue, cart, and checkout with unit tests and review sign-off."
        }
        "Quality Assurance Testing" => {
            "Executed the regression suite end to end; all critical paths verified with no open blockers."
        }
        "Production Deployment" => {
            "Rolled the release out with zero downtime; dashboards and alerts are live."
        }
        "Ticket Triage Analysis" => {
            "Clustered historic tickets into a ranked intent taxonomy with escalation rules."
        }
        "Knowledge Base Design" => {
            "Published answers for the top intents following the support tone guidelines."
        }
        "Assistant Conversation Flow" => {
            "Connected intents to answers with a tested fallback to human agents."
        }
        "Audience Research" => {
            "Profiled three target segments and selected a channel mix for each."
        }
        "Campaign Content Creation" => {
            "Delivered an on-brand copy deck with clear calls to action for every channel."
        }
        "Social Media Scheduling" => {
            "Scheduled the launch posts across the publishing calendar."
        }
        _ => return None,
    };
    Some(text)
}
