use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{error::TrainingError, scenario::ScenarioDefinition};

/// Registry of scenario definitions, ordered by registration.
///
/// Clones share the same underlying storage. Definitions are handed out as
/// `Arc`s and are never mutated after registration.
#[derive(Debug, Clone, Default)]
pub struct ScenarioRegistry {
    inner: Arc<RwLock<IndexMap<String, Arc<ScenarioDefinition>>>>,
}

impl ScenarioRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and inserts a scenario. The registry is unchanged on error.
    pub fn register(&self, scenario: ScenarioDefinition) -> Result<(), TrainingError> {
        scenario.validate()?;
        let mut inner = self.inner.write();
        if inner.contains_key(&scenario.id) {
            return Err(TrainingError::DuplicateScenario(scenario.id));
        }
        inner.insert(scenario.id.clone(), Arc::new(scenario));
        Ok(())
    }

    /// Looks up a scenario by id.
    pub fn get(&self, scenario_id: &str) -> Result<Arc<ScenarioDefinition>, TrainingError> {
        self.inner
            .read()
            .get(scenario_id)
            .cloned()
            .ok_or_else(|| TrainingError::ScenarioNotFound(scenario_id.to_string()))
    }

    /// Snapshot of every scenario in registration order. Each call starts over.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<ScenarioDefinition>> {
        self.inner.read().values().cloned().collect()
    }

    /// Whether an id is registered.
    #[must_use]
    pub fn contains(&self, scenario_id: &str) -> bool {
        self.inner.read().contains_key(scenario_id)
    }

    /// Number of registered scenarios.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::TaskDefinition;

    fn scenario(id: &str) -> ScenarioDefinition {
        ScenarioDefinition::new(id, format!("Scenario {id}"))
            .with_task(TaskDefinition::new("t1", "Task", "agent"))
    }

    #[test]
    fn lists_in_registration_order() {
        let registry = ScenarioRegistry::new();
        for id in ["zeta", "alpha", "mid"] {
            registry.register(scenario(id)).unwrap();
        }
        let ids: Vec<_> = registry.list().iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
        // restartable: a second listing yields the same sequence
        assert_eq!(registry.list().len(), 3);
    }

    #[test]
    fn duplicate_registration_leaves_registry_unchanged() {
        let registry = ScenarioRegistry::new();
        registry.register(scenario("s1")).unwrap();
        let replacement = ScenarioDefinition::new("s1", "Other");
        assert!(matches!(
            registry.register(replacement),
            Err(TrainingError::DuplicateScenario(id)) if id == "s1"
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("s1").unwrap().name, "Scenario s1");
    }

    #[test]
    fn invalid_scenarios_are_not_registered() {
        let registry = ScenarioRegistry::new();
        let bad = ScenarioDefinition::new("s1", "Bad").with_task(TaskDefinition::new("", "x", "a"));
        assert!(matches!(
            registry.register(bad),
            Err(TrainingError::InvalidTaskDefinition { .. })
        ));
        assert!(registry.is_empty());
        assert!(!registry.contains("s1"));
    }

    #[test]
    fn missing_scenario_is_reported() {
        let registry = ScenarioRegistry::new();
        assert!(matches!(
            registry.get("ghost"),
            Err(TrainingError::ScenarioNotFound(id)) if id == "ghost"
        ));
    }
}
