use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use shared_event_bus::FileEventPublisher;
use shared_logging::LogLevel;

use crate::{
    executor::{CriterionPolicy, TaskExecutor},
    runner::ScenarioRunnerBuilder,
    telemetry::TrainingTelemetry,
    work::{random_seed, RandomizedWork},
};

/// Engine configuration loaded from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrainingConfig {
    /// Runner settings.
    #[serde(default)]
    pub runner: RunnerSettings,
    /// Executor settings.
    #[serde(default)]
    pub executor: ExecutorSettings,
    /// Randomized work settings.
    #[serde(default)]
    pub work: WorkSettings,
    /// Logging and event sinks.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

/// `[runner]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunnerSettings {
    /// Pause between scenarios in `run_all`.
    #[serde(default)]
    pub inter_scenario_delay_ms: u64,
    /// Per-task work budget.
    #[serde(default)]
    pub task_timeout_ms: Option<u64>,
}

/// `[executor]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSettings {
    /// Chance each criterion of a successful task passes.
    #[serde(default = "default_criterion_pass_probability")]
    pub criterion_pass_probability: f64,
    /// Seed for criterion draws and randomized work; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            criterion_pass_probability: default_criterion_pass_probability(),
            seed: None,
        }
    }
}

/// `[work]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkSettings {
    /// Chance a simulated task succeeds.
    #[serde(default = "default_success_probability")]
    pub success_probability: f64,
    /// Shortest simulated duration.
    #[serde(default = "default_min_duration")]
    pub min_duration_secs: f64,
    /// Longest simulated duration.
    #[serde(default = "default_max_duration")]
    pub max_duration_secs: f64,
    /// Real seconds slept per simulated second.
    #[serde(default)]
    pub time_scale: f64,
}

impl Default for WorkSettings {
    fn default() -> Self {
        Self {
            success_probability: default_success_probability(),
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
            time_scale: 0.0,
        }
    }
}

/// `[telemetry]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetrySettings {
    /// JSON-lines log file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// JSON-lines event file.
    #[serde(default)]
    pub event_log: Option<PathBuf>,
    /// Lowest level written to the log.
    #[serde(default)]
    pub min_level: LogLevel,
}

impl TrainingConfig {
    /// Loads and validates a TOML file. Relative telemetry paths resolve against
    /// the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading training config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        for slot in [&mut config.telemetry.log_path, &mut config.telemetry.event_log] {
            if let Some(candidate) = slot.as_mut() {
                if candidate.is_relative() {
                    *candidate = base.join(&*candidate);
                }
            }
        }
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks probability and duration bounds.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.executor.criterion_pass_probability),
            "criterion_pass_probability must be within [0, 1]"
        );
        ensure!(
            (0.0..=1.0).contains(&self.work.success_probability),
            "success_probability must be within [0, 1]"
        );
        ensure!(
            self.work.min_duration_secs.is_finite() && self.work.max_duration_secs.is_finite(),
            "duration bounds must be finite"
        );
        ensure!(
            self.work.min_duration_secs >= 0.0
                && self.work.min_duration_secs <= self.work.max_duration_secs,
            "invalid duration bounds: min must be >= 0 and <= max"
        );
        ensure!(
            self.work.time_scale.is_finite() && self.work.time_scale >= 0.0,
            "time_scale must be finite and >= 0"
        );
        ensure!(
            Duration::try_from_secs_f64(self.work.max_duration_secs * self.work.time_scale).is_ok(),
            "time_scale makes the longest simulated delay unrepresentable"
        );
        ensure!(
            self.runner.task_timeout_ms != Some(0),
            "task_timeout_ms must be positive when set"
        );
        Ok(())
    }

    /// Seed from config, or a fresh random one.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.executor.seed.unwrap_or_else(random_seed)
    }

    /// Executor configured with the criterion policy, timeout, and `seed`.
    #[must_use]
    pub fn executor(&self, seed: u64) -> TaskExecutor {
        let executor = TaskExecutor::new(
            CriterionPolicy::new(self.executor.criterion_pass_probability),
            seed,
        );
        match self.runner.task_timeout_ms {
            Some(ms) => executor.with_timeout(Duration::from_millis(ms)),
            None => executor,
        }
    }

    /// Randomized work generator seeded with `seed`.
    #[must_use]
    pub fn work(&self, seed: u64) -> RandomizedWork {
        RandomizedWork::new(seed)
            .with_success_probability(self.work.success_probability)
            .with_duration_range(self.work.min_duration_secs, self.work.max_duration_secs)
            .with_time_scale(self.work.time_scale)
    }

    /// Telemetry wired to the configured sinks.
    pub fn telemetry(&self, module: &str) -> Result<TrainingTelemetry> {
        let mut builder = TrainingTelemetry::builder(module).min_level(self.telemetry.min_level);
        if let Some(path) = &self.telemetry.log_path {
            builder = builder.log_path(path);
        }
        if let Some(path) = &self.telemetry.event_log {
            builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
        }
        builder.build()
    }

    /// Runner builder carrying every configured setting.
    pub fn runner_builder(&self) -> Result<ScenarioRunnerBuilder> {
        let seed = self.seed();
        // offset keeps work draws independent of criterion draws
        let work = self.work(seed.wrapping_add(1));
        Ok(ScenarioRunnerBuilder::default()
            .executor(self.executor(seed))
            .work(Arc::new(work))
            .inter_scenario_delay(Duration::from_millis(self.runner.inter_scenario_delay_ms))
            .telemetry(self.telemetry("training")?))
    }
}

const fn default_criterion_pass_probability() -> f64 {
    0.9
}

const fn default_success_probability() -> f64 {
    0.85
}

const fn default_min_duration() -> f64 {
    1.0
}

const fn default_max_duration() -> f64 {
    5.0
}
