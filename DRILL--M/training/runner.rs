//! Scenario orchestration: runs tasks in order, feeds the ledger, notifies
//! observers, and appends every finished run to the training history.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use shared_logging::LogLevel;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::{
    error::TrainingError,
    executor::TaskExecutor,
    history::{ScenarioRunResult, TrainingHistory},
    ledger::{AgentPerformanceLedger, AgentPerformanceRecord},
    observer::{TrainingEvent, TrainingObserver},
    registry::ScenarioRegistry,
    scenario::ScenarioDefinition,
    telemetry::TrainingTelemetry,
    work::{random_seed, RandomizedWork, WorkFunction},
};

/// Error text recorded on runs stopped by cancellation.
pub const CANCELLED_MESSAGE: &str = "run cancelled";

enum Abort {
    Cancelled,
    Failed(String),
}

/// Runs registered scenarios and owns the ledger and history they write to.
pub struct ScenarioRunner {
    registry: ScenarioRegistry,
    executor: TaskExecutor,
    ledger: AgentPerformanceLedger,
    history: TrainingHistory,
    work: Arc<dyn WorkFunction>,
    observers: Vec<Arc<dyn TrainingObserver>>,
    telemetry: Option<TrainingTelemetry>,
    inter_scenario_delay: Duration,
    cancel: CancellationToken,
    in_flight: Mutex<HashSet<String>>,
}

impl ScenarioRunner {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> ScenarioRunnerBuilder {
        ScenarioRunnerBuilder::default()
    }

    /// Registers a scenario definition.
    pub fn register_scenario(&self, scenario: ScenarioDefinition) -> Result<(), TrainingError> {
        let scenario_id = scenario.id.clone();
        self.registry.register(scenario)?;
        self.log(
            LogLevel::Debug,
            "training.scenario.registered",
            json!({ "scenario_id": scenario_id }),
        );
        Ok(())
    }

    /// Registered scenarios in registration order.
    #[must_use]
    pub fn list_scenarios(&self) -> Vec<Arc<ScenarioDefinition>> {
        self.registry.list()
    }

    /// Every finished run, in completion order.
    #[must_use]
    pub fn history(&self) -> Vec<Arc<ScenarioRunResult>> {
        self.history.snapshot()
    }

    /// Performance record for one agent.
    #[must_use]
    pub fn agent_performance(&self, agent_id: &str) -> Option<AgentPerformanceRecord> {
        self.ledger.get(agent_id)
    }

    /// Every agent record, in order of first appearance.
    #[must_use]
    pub fn agent_performances(&self) -> Vec<AgentPerformanceRecord> {
        self.ledger.list()
    }

    /// Scenario registry handle.
    #[must_use]
    pub const fn registry(&self) -> &ScenarioRegistry {
        &self.registry
    }

    /// Token that cancels `run` and `run_all` between tasks.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one scenario under the runner's own cancellation token.
    pub async fn run(&self, scenario_id: &str) -> Result<Arc<ScenarioRunResult>, TrainingError> {
        self.run_with_cancellation(scenario_id, &self.cancel).await
    }

    /// Runs one scenario, checking `cancel` before each task.
    ///
    /// Only lookup and single-flight errors are returned. A task that fails is
    /// recorded and the run continues; a work function error stops the run
    /// before the offending task is recorded. Either way the finished run is
    /// appended to the history and returned.
    #[instrument(skip(self, cancel))]
    pub async fn run_with_cancellation(
        &self,
        scenario_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<ScenarioRunResult>, TrainingError> {
        let scenario = self.registry.get(scenario_id)?;
        let _flight = InFlight::acquire(&self.in_flight, &scenario.id)?;

        let mut run = ScenarioRunResult::start(&scenario.id, &scenario.name);
        let clock = Instant::now();
        self.log(
            LogLevel::Info,
            "training.run.start",
            json!({
                "run_id": run.run_id,
                "scenario_id": scenario.id,
                "complexity": scenario.complexity.label(),
                "tasks": scenario.tasks.len(),
            }),
        );

        let abort = self.run_tasks(&scenario, &mut run, cancel).await;
        run.ended_at = Utc::now();
        run.total_duration_seconds = clock.elapsed().as_secs_f64();
        match abort {
            None => run.success = true,
            Some(Abort::Cancelled) => {
                run.cancelled = true;
                run.error = Some(CANCELLED_MESSAGE.into());
            }
            Some(Abort::Failed(message)) => run.error = Some(message),
        }

        let run = self.history.append(run);
        self.finish(&run).await;
        Ok(run)
    }

    /// Runs every registered scenario sequentially, in registration order.
    ///
    /// A failed run never blocks the next one. Once cancellation is observed no
    /// further scenarios are started.
    pub async fn run_all(&self) -> Vec<Arc<ScenarioRunResult>> {
        let scenarios = self.registry.list();
        let mut results = Vec::with_capacity(scenarios.len());
        for (index, scenario) in scenarios.iter().enumerate() {
            if index > 0 && !self.inter_scenario_delay.is_zero() {
                tokio::select! {
                    () = self.cancel.cancelled() => {}
                    () = tokio::time::sleep(self.inter_scenario_delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                tracing::warn!(remaining = scenarios.len() - index, "run_all cancelled");
                break;
            }
            match self.run(&scenario.id).await {
                Ok(run) => results.push(run),
                Err(err) => {
                    tracing::warn!(scenario = %scenario.id, error = %err, "scenario skipped");
                    self.log(
                        LogLevel::Warn,
                        "training.run.skipped",
                        json!({ "scenario_id": scenario.id, "error": err.to_string() }),
                    );
                }
            }
        }
        results
    }

    async fn run_tasks(
        &self,
        scenario: &ScenarioDefinition,
        run: &mut ScenarioRunResult,
        cancel: &CancellationToken,
    ) -> Option<Abort> {
        let total = scenario.tasks.len();
        for (index, task) in scenario.tasks.iter().enumerate() {
            if cancel.is_cancelled() {
                return Some(Abort::Cancelled);
            }
            self.emit(&TrainingEvent::TaskStarted {
                run_id: run.run_id,
                scenario_id: scenario.id.clone(),
                task_id: task.id.clone(),
                task_name: task.name.clone(),
                assigned_agent: task.assigned_agent.clone(),
                priority: task.priority,
                position: index + 1,
                total,
            })
            .await;
            let result = match self.executor.execute(task, self.work.as_ref()).await {
                Ok(result) => result,
                Err(err) => return Some(Abort::Failed(err.to_string())),
            };
            self.ledger.record_result(&task.assigned_agent, &result);
            if !result.is_completed() {
                self.log(
                    LogLevel::Warn,
                    "training.task.failed",
                    json!({
                        "run_id": run.run_id,
                        "task_id": task.id,
                        "agent": task.assigned_agent,
                        "timed_out": result.timed_out,
                    }),
                );
            }
            run.tasks.push(result.clone());
            self.emit(&TrainingEvent::TaskCompleted {
                run_id: run.run_id,
                scenario_id: scenario.id.clone(),
                result,
            })
            .await;
        }
        None
    }

    async fn finish(&self, run: &ScenarioRunResult) {
        if run.success {
            self.log(
                LogLevel::Info,
                "training.run.finished",
                json!({
                    "run_id": run.run_id,
                    "scenario_id": run.scenario_id,
                    "completed": run.completed_count(),
                    "failed": run.failed_count(),
                    "duration_seconds": run.total_duration_seconds,
                }),
            );
            self.emit(&TrainingEvent::ScenarioCompleted {
                run_id: run.run_id,
                scenario_id: run.scenario_id.clone(),
                tasks: run.tasks.len(),
                failed_tasks: run.failed_count(),
                duration_seconds: run.total_duration_seconds,
            })
            .await;
        } else {
            let error = run.error.clone().unwrap_or_default();
            self.log(
                LogLevel::Error,
                "training.run.aborted",
                json!({
                    "run_id": run.run_id,
                    "scenario_id": run.scenario_id,
                    "recorded_tasks": run.tasks.len(),
                    "cancelled": run.cancelled,
                    "error": error,
                }),
            );
            self.emit(&TrainingEvent::ScenarioFailed {
                run_id: run.run_id,
                scenario_id: run.scenario_id.clone(),
                tasks: run.tasks.len(),
                error,
                cancelled: run.cancelled,
            })
            .await;
        }
    }

    async fn emit(&self, event: &TrainingEvent) {
        for observer in &self.observers {
            observer.notify(event);
        }
        if let Some(telemetry) = &self.telemetry {
            // awaited so the sink sees events in order before `run` returns
            if let Err(err) = telemetry.emit(event).await {
                tracing::warn!(event = event.event_type(), error = %err, "event publish failed");
            }
        }
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(telemetry) = &self.telemetry {
            let _ = telemetry.log(level, message, metadata);
        }
    }
}

/// Marks a scenario as running until dropped.
struct InFlight<'a> {
    running: &'a Mutex<HashSet<String>>,
    scenario_id: String,
}

impl<'a> InFlight<'a> {
    fn acquire(
        running: &'a Mutex<HashSet<String>>,
        scenario_id: &str,
    ) -> Result<Self, TrainingError> {
        if !running.lock().insert(scenario_id.to_string()) {
            return Err(TrainingError::ScenarioBusy(scenario_id.to_string()));
        }
        Ok(Self {
            running,
            scenario_id: scenario_id.to_string(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.running.lock().remove(&self.scenario_id);
    }
}

/// Builder for [`ScenarioRunner`].
#[derive(Default)]
pub struct ScenarioRunnerBuilder {
    registry: Option<ScenarioRegistry>,
    executor: Option<TaskExecutor>,
    ledger: Option<AgentPerformanceLedger>,
    history: Option<TrainingHistory>,
    work: Option<Arc<dyn WorkFunction>>,
    observers: Vec<Arc<dyn TrainingObserver>>,
    telemetry: Option<TrainingTelemetry>,
    inter_scenario_delay: Duration,
    cancel: Option<CancellationToken>,
}

impl ScenarioRunnerBuilder {
    /// Uses an existing registry.
    #[must_use]
    pub fn registry(mut self, registry: ScenarioRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the task executor.
    #[must_use]
    pub fn executor(mut self, executor: TaskExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Shares a ledger, e.g. across runners.
    #[must_use]
    pub fn ledger(mut self, ledger: AgentPerformanceLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Shares a history store.
    #[must_use]
    pub fn history(mut self, history: TrainingHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Sets the work function.
    #[must_use]
    pub fn work(mut self, work: Arc<dyn WorkFunction>) -> Self {
        self.work = Some(work);
        self
    }

    /// Adds an observer; observers are notified in the order added.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn TrainingObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Sets telemetry.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TrainingTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Pause between scenarios in `run_all`.
    #[must_use]
    pub const fn inter_scenario_delay(mut self, delay: Duration) -> Self {
        self.inter_scenario_delay = delay;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Builds the runner. Unset parts get fresh defaults; work defaults to
    /// randomized outcomes.
    #[must_use]
    pub fn build(self) -> ScenarioRunner {
        ScenarioRunner {
            registry: self.registry.unwrap_or_default(),
            executor: self.executor.unwrap_or_default(),
            ledger: self.ledger.unwrap_or_default(),
            history: self.history.unwrap_or_default(),
            work: self
                .work
                .unwrap_or_else(|| Arc::new(RandomizedWork::new(random_seed()))),
            observers: self.observers,
            telemetry: self.telemetry,
            inter_scenario_delay: self.inter_scenario_delay,
            cancel: self.cancel.unwrap_or_default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        executor::{CriterionPolicy, TaskStatus, ADDITIONAL_TRAINING_OUTPUT},
        observer::{ChannelObserver, FnObserver},
        scenario::TaskDefinition,
        work::{ScriptedWork, WorkOutcome},
    };
    use shared_event_bus::{EventSubscriber, FileEventPublisher, MemoryEventBus};
    use tempfile::tempdir;

    fn pipeline(id: &str, tasks: usize) -> ScenarioDefinition {
        let agents = ["analyst", "architect", "developer"];
        (1..=tasks).fold(ScenarioDefinition::new(id, format!("Pipeline {id}")), |s, n| {
            s.with_task(
                TaskDefinition::new(format!("t{n}"), format!("Step {n}"), agents[(n - 1) % 3])
                    .with_criterion(format!("Step {n} reviewed")),
            )
        })
    }

    fn runner_with(work: Arc<dyn WorkFunction>, scenarios: &[ScenarioDefinition]) -> ScenarioRunner {
        let runner = ScenarioRunner::builder()
            .executor(TaskExecutor::new(CriterionPolicy::always_pass(), 3))
            .work(work)
            .build();
        for scenario in scenarios {
            runner.register_scenario(scenario.clone()).unwrap();
        }
        runner
    }

    #[tokio::test]
    async fn results_follow_task_order() {
        let runner = runner_with(Arc::new(ScriptedWork::always_succeed()), &[pipeline("s1", 5)]);
        let run = runner.run("s1").await.unwrap();
        assert!(run.success);
        let ids: Vec<_> = run.tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3", "t4", "t5"]);
        assert!(run.error.is_none());
        assert!(run.ended_at >= run.started_at);
    }

    #[tokio::test]
    async fn failed_tasks_do_not_abort_the_run() {
        let runner = runner_with(Arc::new(ScriptedWork::always_fail()), &[pipeline("s1", 4)]);
        let run = runner.run("s1").await.unwrap();
        assert!(run.success);
        assert_eq!(run.tasks.len(), 4);
        assert!(run.tasks.iter().all(|t| t.status == TaskStatus::Failed));
        assert!(run.tasks.iter().all(|t| t.output == ADDITIONAL_TRAINING_OUTPUT));
        assert_eq!(run.failed_count(), 4);
    }

    #[tokio::test]
    async fn work_error_aborts_remaining_tasks() {
        let work = Arc::new(ScriptedWork::always_succeed().fail_on_call(3));
        let runner = runner_with(work.clone(), &[pipeline("s1", 5)]);
        let run = runner.run("s1").await.unwrap();
        assert!(!run.success);
        assert!(!run.cancelled);
        // the crashing third task is not recorded
        assert_eq!(run.tasks.len(), 2);
        assert!(run.error.as_deref().unwrap().contains("worker crashed"));
        assert_eq!(work.calls(), 3);
        assert_eq!(runner.history().len(), 1);
        assert_eq!(runner.agent_performance("analyst").unwrap().tasks_completed, 1);
        assert!(runner.agent_performance("developer").is_none());
    }

    #[tokio::test]
    async fn ledger_accumulates_across_runs() {
        let runner = runner_with(
            Arc::new(ScriptedWork::always_succeed()),
            &[pipeline("s1", 3), pipeline("s2", 6)],
        );
        runner.run("s1").await.unwrap();
        let after_first = runner.agent_performance("developer").unwrap();
        runner.run("s2").await.unwrap();
        let after_second = runner.agent_performance("developer").unwrap();
        assert_eq!(after_first.tasks_completed, 1);
        assert_eq!(after_second.tasks_completed, 3);
        assert!(after_first
            .capabilities
            .iter()
            .all(|c| after_second.capabilities.contains(c)));
        assert_eq!(runner.agent_performances().len(), 3);
    }

    #[tokio::test]
    async fn success_rate_follows_incremental_mean() {
        let scenario = ScenarioDefinition::new("solo", "Solo")
            .with_task(TaskDefinition::new("a", "A", "dev"))
            .with_task(TaskDefinition::new("b", "B", "dev"))
            .with_task(TaskDefinition::new("c", "C", "dev"));
        let work = ScriptedWork::always_succeed().with_outcome("b", WorkOutcome::failure(1.0));
        let runner = runner_with(Arc::new(work), &[scenario]);
        runner.run("solo").await.unwrap();
        let rate = runner.agent_performance("dev").unwrap().success_rate;
        assert!((rate - 66.67).abs() < 0.01);
    }

    #[tokio::test]
    async fn unknown_scenario_leaves_history_untouched() {
        let runner = runner_with(Arc::new(ScriptedWork::always_succeed()), &[pipeline("s1", 1)]);
        runner.run("s1").await.unwrap();
        assert!(matches!(
            runner.run("nonexistent").await,
            Err(TrainingError::ScenarioNotFound(_))
        ));
        assert_eq!(runner.history().len(), 1);
    }

    #[tokio::test]
    async fn history_is_append_only() {
        let runner = runner_with(
            Arc::new(ScriptedWork::always_succeed()),
            &[pipeline("s1", 2), pipeline("s2", 2)],
        );
        let first = runner.run("s1").await.unwrap();
        let second = runner.run("s2").await.unwrap();
        let history = runner.history();
        assert_eq!(history.len(), 2);
        assert!(Arc::ptr_eq(&history[0], &first));
        assert!(Arc::ptr_eq(&history[1], &second));
    }

    #[tokio::test]
    async fn run_all_continues_after_an_abort() {
        let work = ScriptedWork::always_succeed().fail_on_task("boom");
        let crashing = ScenarioDefinition::new("s1", "Crashing")
            .with_task(TaskDefinition::new("boom", "Explode", "dev"))
            .with_task(TaskDefinition::new("after", "Never", "dev"));
        let runner = runner_with(Arc::new(work), &[crashing, pipeline("s2", 2)]);
        let results = runner.run_all().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].scenario_id, "s1");
        assert!(!results[0].success);
        assert!(results[0].tasks.is_empty());
        assert!(results[1].success);
        assert_eq!(runner.history().len(), 2);
    }

    #[tokio::test]
    async fn observers_see_events_in_order() {
        let (observer, mut rx) = ChannelObserver::channel();
        let runner = ScenarioRunner::builder()
            .work(Arc::new(ScriptedWork::always_succeed()))
            .observer(Arc::new(observer))
            .build();
        runner.register_scenario(pipeline("s1", 2)).unwrap();
        runner.run("s1").await.unwrap();
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type());
        }
        assert_eq!(
            kinds,
            vec![
                "training.task_started",
                "training.task_completed",
                "training.task_started",
                "training.task_completed",
                "training.scenario_completed",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_fail_the_task_not_the_run() {
        let work = ScriptedWork::always_succeed().with_delay(Duration::from_secs(10));
        let runner = ScenarioRunner::builder()
            .executor(TaskExecutor::default().with_timeout(Duration::from_secs(1)))
            .work(Arc::new(work))
            .build();
        runner.register_scenario(pipeline("s1", 2)).unwrap();
        let run = runner.run("s1").await.unwrap();
        assert!(run.success);
        assert!(run.tasks.iter().all(|t| t.timed_out && !t.is_completed()));
    }

    #[tokio::test]
    async fn cancellation_stops_between_tasks() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let observer = FnObserver::new(move |event: &TrainingEvent| {
            if let TrainingEvent::TaskCompleted { result, .. } = event {
                if result.task_id == "t2" {
                    trigger.cancel();
                }
            }
        });
        let work = Arc::new(ScriptedWork::always_succeed());
        let runner = ScenarioRunner::builder()
            .work(work.clone())
            .observer(Arc::new(observer))
            .build();
        runner.register_scenario(pipeline("s1", 4)).unwrap();
        let run = runner.run_with_cancellation("s1", &token).await.unwrap();
        assert!(!run.success);
        assert!(run.cancelled);
        assert_eq!(run.tasks.len(), 2);
        assert_eq!(run.error.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(work.calls(), 2);
        assert_eq!(runner.history().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_runner_starts_no_further_scenarios() {
        let runner = runner_with(
            Arc::new(ScriptedWork::always_succeed()),
            &[pipeline("s1", 1), pipeline("s2", 1)],
        );
        runner.cancellation_token().cancel();
        assert!(runner.run_all().await.is_empty());
        assert!(runner.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn same_scenario_is_single_flight() {
        let work = ScriptedWork::always_succeed().with_delay(Duration::from_millis(100));
        let runner = runner_with(Arc::new(work), &[pipeline("s1", 1)]);
        let (first, second) = tokio::join!(runner.run("s1"), runner.run("s1"));
        assert!(first.unwrap().success);
        assert!(matches!(second, Err(TrainingError::ScenarioBusy(id)) if id == "s1"));
        // the slot is released once the first run finishes
        assert!(runner.run("s1").await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn run_all_waits_between_scenarios() {
        let runner = ScenarioRunner::builder()
            .work(Arc::new(ScriptedWork::always_succeed()))
            .inter_scenario_delay(Duration::from_secs(2))
            .build();
        runner.register_scenario(pipeline("s1", 1)).unwrap();
        runner.register_scenario(pipeline("s2", 1)).unwrap();
        let started = Instant::now();
        let results = runner.run_all().await;
        assert_eq!(results.len(), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn telemetry_logs_run_lifecycle() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("runner.log");
        let telemetry = TrainingTelemetry::builder("training")
            .log_path(&log_path)
            .build()
            .unwrap();
        let work = ScriptedWork::always_succeed().with_outcome("t1", WorkOutcome::failure(2.0));
        let runner = ScenarioRunner::builder()
            .work(Arc::new(work))
            .telemetry(telemetry)
            .build();
        runner.register_scenario(pipeline("s1", 2)).unwrap();
        runner.run("s1").await.unwrap();
        let messages: Vec<_> = shared_logging::read_records(&log_path)
            .unwrap()
            .into_iter()
            .map(|record| record.message)
            .collect();
        assert_eq!(
            messages,
            vec![
                "training.scenario.registered",
                "training.run.start",
                "training.task.failed",
                "training.run.finished",
            ]
        );
    }

    #[test]
    fn event_log_holds_every_event_after_runtime_shutdown() {
        let dir = tempdir().unwrap();
        let publisher = Arc::new(FileEventPublisher::new(dir.path().join("events.jsonl")).unwrap());
        let telemetry = TrainingTelemetry::builder("training")
            .event_publisher(publisher.clone())
            .build()
            .unwrap();
        let runner = ScenarioRunner::builder()
            .work(Arc::new(ScriptedWork::always_succeed()))
            .telemetry(telemetry)
            .build();
        runner.register_scenario(pipeline("s1", 5)).unwrap();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(runner.run("s1")).unwrap();
        drop(runtime);

        let events = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(publisher.read_all())
            .unwrap();
        let mut expected = Vec::new();
        for _ in 0..5 {
            expected.push("training.task_started");
            expected.push("training.task_completed");
        }
        expected.push("training.scenario_completed");
        let kinds: Vec<_> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, expected);
        assert_eq!(events[0].payload["task_id"], "t1");
        assert_eq!(events[9].payload["result"]["task_id"], "t5");
    }

    #[tokio::test]
    async fn bus_subscribers_receive_lifecycle_in_order() {
        let bus = Arc::new(MemoryEventBus::new(16));
        let mut rx = bus.subscribe().await.unwrap();
        let telemetry = TrainingTelemetry::builder("training")
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        let runner = ScenarioRunner::builder()
            .work(Arc::new(ScriptedWork::always_fail()))
            .telemetry(telemetry)
            .build();
        runner.register_scenario(pipeline("s1", 2)).unwrap();
        runner.run("s1").await.unwrap();

        let mut received = Vec::new();
        while let Ok(event) = rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 5);
        assert!(received.iter().all(|e| e.source == "training"));
        let last = received.last().unwrap();
        assert_eq!(last.event_type, "training.scenario_completed");
        assert_eq!(last.payload["failed_tasks"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_scenarios_share_one_ledger() {
        let alpha = (1..=3).fold(ScenarioDefinition::new("alpha", "Alpha"), |s, n| {
            s.with_task(TaskDefinition::new(format!("a{n}"), format!("Alpha {n}"), "dev"))
        });
        let beta = (1..=3).fold(ScenarioDefinition::new("beta", "Beta"), |s, n| {
            s.with_task(TaskDefinition::new(format!("b{n}"), format!("Beta {n}"), "dev"))
        });
        let work: Arc<dyn WorkFunction> = Arc::new(
            ScriptedWork::always_succeed()
                .with_outcome("b2", WorkOutcome::failure(1.0))
                .with_delay(Duration::from_millis(10)),
        );
        let ledger = AgentPerformanceLedger::new();
        let build = |scenario: ScenarioDefinition| {
            let runner = ScenarioRunner::builder()
                .executor(TaskExecutor::new(CriterionPolicy::always_pass(), 5))
                .work(Arc::clone(&work))
                .ledger(ledger.clone())
                .build();
            runner.register_scenario(scenario).unwrap();
            runner
        };
        let (first, second) = (build(alpha), build(beta));

        let (a, b) = tokio::join!(first.run("alpha"), second.run("beta"));
        assert!(a.unwrap().success);
        assert!(b.unwrap().success);

        let dev = ledger.get("dev").unwrap();
        assert_eq!(dev.tasks_completed, 6);
        assert!((dev.success_rate - 500.0 / 6.0).abs() < 1e-9);
        assert_eq!(first.agent_performance("dev"), second.agent_performance("dev"));
    }
}
