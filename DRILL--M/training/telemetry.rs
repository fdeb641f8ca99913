use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord};

use crate::observer::TrainingEvent;

/// Configures where the training engine writes logs and events.
pub struct TrainingTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl TrainingTelemetryBuilder {
    /// Builder stamping records with `module`.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
            event_publisher: None,
        }
    }

    /// Sets the JSON-lines log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops log records below this level.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Mirrors lifecycle events to `publisher`.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Opens the log file, if any, and freezes the sinks.
    pub fn build(self) -> Result<TrainingTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::with_min_level(path, self.min_level)?),
            None => None,
        };
        Ok(TrainingTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared by runner components.
#[derive(Clone)]
pub struct TrainingTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for TrainingTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingTelemetry")
            .field("module", &self.inner.module)
            .field("logging", &self.inner.logger.is_some())
            .field("events", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl TrainingTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> TrainingTelemetryBuilder {
        TrainingTelemetryBuilder::new(module)
    }

    /// Module label stamped on records.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Writes a structured log record.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Publishes a raw event, returning once the publisher has accepted it.
    pub async fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        let Some(publisher) = &self.inner.publisher else {
            return Ok(());
        };
        let record = EventRecord::new(self.inner.module.clone(), event_type, payload);
        publisher.publish(record).await
    }

    /// Publishes a lifecycle event under its dotted type.
    pub async fn emit(&self, event: &TrainingEvent) -> Result<()> {
        self.event(event.event_type(), serde_json::to_value(event)?)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_event_bus::MemoryEventBus;
    use tempfile::tempdir;
    use uuid::Uuid;

    #[tokio::test]
    async fn log_and_lifecycle_event_reach_their_sinks() {
        let tmp = tempdir().unwrap();
        let bus = Arc::new(MemoryEventBus::new(4));
        let log_path = tmp.path().join("training.log");
        let telemetry = TrainingTelemetry::builder("training")
            .log_path(&log_path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Info, "training.run.start", json!({ "scenario_id": "s1" }))
            .unwrap();
        telemetry
            .emit(&TrainingEvent::ScenarioCompleted {
                run_id: Uuid::new_v4(),
                scenario_id: "s1".into(),
                tasks: 3,
                failed_tasks: 1,
                duration_seconds: 0.2,
            })
            .await
            .unwrap();
        assert!(std::fs::read_to_string(&log_path)
            .unwrap()
            .contains("training.run.start"));
        let events = bus.events_of("training.scenario_completed");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload["failed_tasks"], 1);
    }

    #[test]
    fn min_level_filters_debug_records() {
        let tmp = tempdir().unwrap();
        let log_path = tmp.path().join("quiet.log");
        let telemetry = TrainingTelemetry::builder("training")
            .log_path(&log_path)
            .min_level(LogLevel::Warn)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "training.task.start", json!({}))
            .unwrap();
        telemetry
            .log(LogLevel::Warn, "training.run.aborted", json!({}))
            .unwrap();
        let records = shared_logging::read_records(&log_path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "training.run.aborted");
    }

    #[tokio::test]
    async fn telemetry_without_sinks_is_a_no_op() {
        let telemetry = TrainingTelemetry::builder("training").build().unwrap();
        telemetry.log(LogLevel::Error, "ignored", json!({})).unwrap();
        telemetry.event("ignored", json!({})).await.unwrap();
    }
}
