use thiserror::Error;

/// Errors surfaced by the training engine.
#[derive(Debug, Error)]
pub enum TrainingError {
    /// No scenario registered under the id.
    #[error("scenario not found: {0}")]
    ScenarioNotFound(String),
    /// A scenario with the same id is already registered.
    #[error("scenario already registered: {0}")]
    DuplicateScenario(String),
    /// A task is missing a required field or clashes with a sibling.
    #[error("invalid task definition{}: {}", task_label(.task_id), .reason)]
    InvalidTaskDefinition {
        /// Task id, when one was supplied.
        task_id: Option<String>,
        /// What is wrong with the task.
        reason: String,
    },
    /// The scenario itself is malformed.
    #[error("invalid scenario definition: {0}")]
    InvalidScenarioDefinition(String),
    /// The scenario is already being run.
    #[error("scenario already running: {0}")]
    ScenarioBusy(String),
    /// The work function raised instead of reporting an outcome.
    #[error("work for task `{task_id}` failed: {source}")]
    Work {
        /// Task whose work raised.
        task_id: String,
        /// Underlying failure.
        #[source]
        source: WorkError,
    },
}

impl TrainingError {
    pub(crate) fn invalid_task(task_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTaskDefinition {
            task_id: (!task_id.trim().is_empty()).then(|| task_id.to_string()),
            reason: reason.into(),
        }
    }
}

fn task_label(task_id: &Option<String>) -> String {
    task_id
        .as_deref()
        .map(|id| format!(" `{id}`"))
        .unwrap_or_default()
}

/// Failure raised by a work function.
#[derive(Debug, Error)]
pub enum WorkError {
    /// The worker crashed mid-task.
    #[error("worker crashed: {0}")]
    Crashed(String),
    /// The worker could not be reached.
    #[error("worker unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_task_message_includes_id_when_present() {
        let err = TrainingError::invalid_task("qa-1", "missing name");
        assert_eq!(
            err.to_string(),
            "invalid task definition `qa-1`: missing name"
        );
        let err = TrainingError::invalid_task("  ", "missing id");
        assert_eq!(err.to_string(), "invalid task definition: missing id");
    }

    #[test]
    fn work_error_is_exposed_as_source() {
        let err = TrainingError::Work {
            task_id: "deploy".into(),
            source: WorkError::Crashed("segfault".into()),
        };
        assert!(err.to_string().contains("worker crashed: segfault"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
