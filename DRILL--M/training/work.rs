use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{error::WorkError, scenario::TaskDefinition};

/// What a work function reports back for one task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkOutcome {
    /// Time spent on the task, simulated or measured.
    pub duration_seconds: f64,
    /// Whether the task met its goal.
    pub succeeded: bool,
}

impl WorkOutcome {
    /// Successful outcome.
    #[must_use]
    pub const fn success(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            succeeded: true,
        }
    }

    /// Unsuccessful outcome.
    #[must_use]
    pub const fn failure(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            succeeded: false,
        }
    }
}

/// Generates a fresh seed for randomized components.
#[must_use]
pub fn random_seed() -> u64 {
    rand::thread_rng().gen()
}

/// Seam through which a host performs (or simulates) the work behind a task.
///
/// Returning `Err` means the work itself broke down; the runner aborts the rest
/// of the scenario. An ordinary unsuccessful attempt is `Ok` with
/// `succeeded == false`.
#[async_trait]
pub trait WorkFunction: Send + Sync {
    /// Performs the task.
    async fn perform(&self, task: &TaskDefinition) -> Result<WorkOutcome, WorkError>;
}

/// Random outcomes and durations drawn from a seeded generator.
pub struct RandomizedWork {
    rng: Mutex<SmallRng>,
    success_probability: f64,
    min_duration_secs: f64,
    max_duration_secs: f64,
    time_scale: f64,
}

impl fmt::Debug for RandomizedWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomizedWork")
            .field("success_probability", &self.success_probability)
            .field("min_duration_secs", &self.min_duration_secs)
            .field("max_duration_secs", &self.max_duration_secs)
            .field("time_scale", &self.time_scale)
            .finish()
    }
}

impl RandomizedWork {
    /// Creates a generator with 85% success and 1 to 5 s simulated durations; never sleeps.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
            success_probability: 0.85,
            min_duration_secs: 1.0,
            max_duration_secs: 5.0,
            time_scale: 0.0,
        }
    }

    /// Probability that a task succeeds, clamped to `[0, 1]`. NaN is ignored.
    #[must_use]
    pub fn with_success_probability(mut self, probability: f64) -> Self {
        if !probability.is_nan() {
            self.success_probability = probability.clamp(0.0, 1.0);
        }
        self
    }

    /// Range simulated durations are drawn from. Bounds are reordered if reversed;
    /// non-finite bounds leave the range unchanged.
    #[must_use]
    pub fn with_duration_range(mut self, min_secs: f64, max_secs: f64) -> Self {
        if !(min_secs.is_finite() && max_secs.is_finite()) {
            return self;
        }
        let (lo, hi) = if min_secs <= max_secs {
            (min_secs, max_secs)
        } else {
            (max_secs, min_secs)
        };
        self.min_duration_secs = lo.max(0.0);
        self.max_duration_secs = hi.max(0.0);
        self
    }

    /// Real seconds slept per simulated second; `0` disables sleeping. Non-finite
    /// scales are ignored.
    #[must_use]
    pub fn with_time_scale(mut self, scale: f64) -> Self {
        if scale.is_finite() {
            self.time_scale = scale.max(0.0);
        }
        self
    }
}

#[async_trait]
impl WorkFunction for RandomizedWork {
    async fn perform(&self, _task: &TaskDefinition) -> Result<WorkOutcome, WorkError> {
        let (duration_seconds, succeeded) = {
            let mut rng = self.rng.lock();
            let duration = if self.max_duration_secs > self.min_duration_secs {
                rng.gen_range(self.min_duration_secs..=self.max_duration_secs)
            } else {
                self.min_duration_secs
            };
            (duration, rng.gen_bool(self.success_probability))
        };
        if self.time_scale > 0.0 {
            let delay = Duration::try_from_secs_f64(duration_seconds * self.time_scale)
                .map_err(|err| WorkError::Unavailable(format!("simulated delay: {err}")))?;
            tokio::time::sleep(delay).await;
        }
        Ok(WorkOutcome {
            duration_seconds,
            succeeded,
        })
    }
}

/// Replays fixed outcomes, optionally raising on a given call or task.
#[derive(Debug)]
pub struct ScriptedWork {
    outcomes: HashMap<String, WorkOutcome>,
    fallback: WorkOutcome,
    failing_tasks: HashSet<String>,
    fail_on_call: Option<usize>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedWork {
    /// Every task gets `fallback` unless scripted otherwise.
    #[must_use]
    pub fn new(fallback: WorkOutcome) -> Self {
        Self {
            outcomes: HashMap::new(),
            fallback,
            failing_tasks: HashSet::new(),
            fail_on_call: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every task succeeds after one simulated second.
    #[must_use]
    pub fn always_succeed() -> Self {
        Self::new(WorkOutcome::success(1.0))
    }

    /// Every task fails after one simulated second.
    #[must_use]
    pub fn always_fail() -> Self {
        Self::new(WorkOutcome::failure(1.0))
    }

    /// Fixes the outcome of one task id.
    #[must_use]
    pub fn with_outcome(mut self, task_id: impl Into<String>, outcome: WorkOutcome) -> Self {
        self.outcomes.insert(task_id.into(), outcome);
        self
    }

    /// Raises a crash on the `call`-th invocation (1-based).
    #[must_use]
    pub const fn fail_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Raises a crash whenever the given task id is performed.
    #[must_use]
    pub fn fail_on_task(mut self, task_id: impl Into<String>) -> Self {
        self.failing_tasks.insert(task_id.into());
        self
    }

    /// Sleeps this long before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times `perform` has been invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkFunction for ScriptedWork {
    async fn perform(&self, task: &TaskDefinition) -> Result<WorkOutcome, WorkError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_call == Some(call) || self.failing_tasks.contains(&task.id) {
            return Err(WorkError::Crashed(format!(
                "scripted crash on call {call} (task `{}`)",
                task.id
            )));
        }
        Ok(self
            .outcomes
            .get(&task.id)
            .copied()
            .unwrap_or(self.fallback))
    }
}

/// Adapts a synchronous closure into a work function.
pub struct FnWork<F> {
    func: F,
}

impl<F> FnWork<F>
where
    F: Fn(&TaskDefinition) -> Result<WorkOutcome, WorkError> + Send + Sync,
{
    /// Wraps the closure.
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> WorkFunction for FnWork<F>
where
    F: Fn(&TaskDefinition) -> Result<WorkOutcome, WorkError> + Send + Sync,
{
    async fn perform(&self, task: &TaskDefinition) -> Result<WorkOutcome, WorkError> {
        (self.func)(task)
    }
}
