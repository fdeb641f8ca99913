#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! Drill training engine: runs declarative agent scenarios task by task, keeps a
//! per-agent performance ledger, and records every run in a training history.

/// Error taxonomy.
#[path = "../error.rs"]
pub mod error;

/// Scenario and task definitions.
#[path = "../scenario.rs"]
pub mod scenario;

/// Scenario registry.
#[path = "../registry.rs"]
pub mod registry;

/// Built-in scenarios and TOML catalogue loader.
#[path = "../catalogue.rs"]
pub mod catalogue;

/// Pluggable work functions.
#[path = "../work.rs"]
pub mod work;

/// Single-task executor and outcome synthesis.
#[path = "../executor.rs"]
pub mod executor;

/// Agent performance ledger.
#[path = "../ledger.rs"]
pub mod ledger;

/// Run records and the append-only training history.
#[path = "../history.rs"]
pub mod history;

/// Lifecycle events and observers.
#[path = "../observer.rs"]
pub mod observer;

/// Structured logging and event emission.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// TOML configuration.
#[path = "../config.rs"]
pub mod config;

/// Scenario orchestration.
#[path = "../runner.rs"]
pub mod runner;

pub use catalogue::{builtin_catalogue, ScenarioCatalogue};
pub use config::TrainingConfig;
pub use error::{TrainingError, WorkError};
pub use executor::{CriterionCheck, CriterionPolicy, TaskExecutor, TaskResult, TaskStatus};
pub use history::{ScenarioRunResult, TrainingHistory};
pub use ledger::{AgentPerformanceLedger, AgentPerformanceRecord};
pub use observer::{ChannelObserver, FnObserver, TrainingEvent, TrainingObserver};
pub use registry::ScenarioRegistry;
pub use runner::{ScenarioRunner, ScenarioRunnerBuilder};
pub use scenario::{Complexity, Priority, ScenarioDefinition, TaskDefinition};
pub use telemetry::{TrainingTelemetry, TrainingTelemetryBuilder};
pub use work::{FnWork, RandomizedWork, ScriptedWork, WorkFunction, WorkOutcome};
