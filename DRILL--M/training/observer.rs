use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{executor::TaskResult, scenario::Priority};

/// Lifecycle notification emitted by the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingEvent {
    /// A task is about to be handed to its work function.
    TaskStarted {
        /// Run the task belongs to.
        run_id: Uuid,
        /// Scenario id.
        scenario_id: String,
        /// Task id.
        task_id: String,
        /// Task display name.
        task_name: String,
        /// Agent the task is assigned to.
        assigned_agent: String,
        /// Declared priority.
        priority: Priority,
        /// 1-based position in the scenario.
        position: usize,
        /// Number of tasks in the scenario.
        total: usize,
    },
    /// A task produced its result.
    TaskCompleted {
        /// Run the task belongs to.
        run_id: Uuid,
        /// Scenario id.
        scenario_id: String,
        /// The recorded result.
        result: TaskResult,
    },
    /// The task loop ran to the end.
    ScenarioCompleted {
        /// Run id.
        run_id: Uuid,
        /// Scenario id.
        scenario_id: String,
        /// Tasks recorded.
        tasks: usize,
        /// Tasks whose status is failed.
        failed_tasks: usize,
        /// Wall-clock run time.
        duration_seconds: f64,
    },
    /// The run was aborted or cancelled.
    ScenarioFailed {
        /// Run id.
        run_id: Uuid,
        /// Scenario id.
        scenario_id: String,
        /// Tasks recorded before the abort.
        tasks: usize,
        /// Abort reason.
        error: String,
        /// Whether cancellation caused the abort.
        cancelled: bool,
    },
}

impl TrainingEvent {
    /// Dotted event type used on the event bus.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::TaskStarted { .. } => "training.task_started",
            Self::TaskCompleted { .. } => "training.task_completed",
            Self::ScenarioCompleted { .. } => "training.scenario_completed",
            Self::ScenarioFailed { .. } => "training.scenario_failed",
        }
    }

    /// Scenario the event refers to.
    #[must_use]
    pub fn scenario_id(&self) -> &str {
        match self {
            Self::TaskStarted { scenario_id, .. }
            | Self::TaskCompleted { scenario_id, .. }
            | Self::ScenarioCompleted { scenario_id, .. }
            | Self::ScenarioFailed { scenario_id, .. } => scenario_id,
        }
    }
}

/// Receives runner lifecycle events. Called inline, so keep it quick.
pub trait TrainingObserver: Send + Sync {
    /// Handles one event.
    fn notify(&self, event: &TrainingEvent);
}

/// Forwards events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<TrainingEvent>,
}

impl ChannelObserver {
    /// Creates the observer and the receiving half.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TrainingEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TrainingObserver for ChannelObserver {
    fn notify(&self, event: &TrainingEvent) {
        // a dropped receiver just means nobody is listening anymore
        let _ = self.sender.send(event.clone());
    }
}

/// Closure adapter.
pub struct FnObserver<F> {
    func: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&TrainingEvent) + Send + Sync,
{
    /// Wraps the closure.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> TrainingObserver for FnObserver<F>
where
    F: Fn(&TrainingEvent) + Send + Sync,
{
    fn notify(&self, event: &TrainingEvent) {
        (self.func)(event);
    }
}
