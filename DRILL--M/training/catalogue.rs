use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    error::TrainingError,
    registry::ScenarioRegistry,
    scenario::{Complexity, Priority, ScenarioDefinition, TaskDefinition},
};

/// Ordered collection of scenario definitions loaded from TOML or built in code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioCatalogue {
    /// Schema version (currently informational).
    #[serde(default)]
    pub version: u32,
    /// Scenarios in document order.
    #[serde(default)]
    pub scenarios: Vec<ScenarioDefinition>,
}

impl ScenarioCatalogue {
    /// Loads a catalogue from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scenario catalogue {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses a catalogue from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let catalogue: Self = toml::from_str(raw)?;
        Ok(catalogue)
    }

    /// Registers every scenario in document order, stopping at the first error.
    pub fn register_into(&self, registry: &ScenarioRegistry) -> Result<usize, TrainingError> {
        for scenario in &self.scenarios {
            registry.register(scenario.clone())?;
        }
        Ok(self.scenarios.len())
    }

    /// Builds a fresh registry holding this catalogue.
    pub fn into_registry(self) -> Result<ScenarioRegistry, TrainingError> {
        let registry = ScenarioRegistry::new();
        self.register_into(&registry)?;
        Ok(registry)
    }
}

/// Default training scenarios: role hand-off pipelines from analysis to delivery.
#[must_use]
pub fn builtin_catalogue() -> ScenarioCatalogue {
    ScenarioCatalogue {
        version: 1,
        scenarios: vec![
            ecommerce_platform(),
            customer_support_automation(),
            marketing_campaign_launch(),
        ],
    }
}

fn ecommerce_platform() -> ScenarioDefinition {
    ScenarioDefinition::new("ecommerce-platform", "E-commerce Platform Development")
        .with_description("Deliver an online storefront from requirements through production rollout.")
        .with_complexity(Complexity::Advanced)
        .with_expected_duration(45)
        .with_task(
            TaskDefinition::new("requirements", "Requirements Analysis", "business-analyst")
                .with_description("Gather stakeholder needs and turn them into user stories.")
                .with_priority(Priority::High)
                .with_expected_outcome("Prioritized backlog with acceptance criteria")
                .with_criterion("Stakeholder needs captured")
                .with_criterion("User stories written")
                .with_criterion("Acceptance criteria defined"),
        )
        .with_task(
            TaskDefinition::new("architecture", "System Architecture Design", "solution-architect")
                .with_description("Choose the service layout, data model, and integrations.")
                .with_priority(Priority::High)
                .with_expected_outcome("Architecture document and component diagram")
                .with_criterion("Scalable service boundaries")
                .with_criterion("Data model normalized")
                .with_criterion("Payment integration planned"),
        )
        .with_task(
            TaskDefinition::new("implementation", "Backend Implementation", "developer")
                .with_description("Build catalogue, cart, and checkout services.")
                .with_priority(Priority::Critical)
                .with_expected_outcome("Working services behind a documented API")
                .with_criterion("API endpoints implemented")
                .with_criterion("Unit tests passing")
                .with_criterion("Code review approved"),
        )
        .with_task(
            TaskDefinition::new("quality-assurance", "Quality Assurance Testing", "qa-engineer")
                .with_description("Exercise the storefront end to end.")
                .with_priority(Priority::High)
                .with_expected_outcome("Test report with no open blockers")
                .with_criterion("Regression suite executed")
                .with_criterion("Checkout flow verified"),
        )
        .with_task(
            TaskDefinition::new("deployment", "Production Deployment", "devops-engineer")
                .with_description("Roll the release out with monitoring in place.")
                .with_priority(Priority::Critical)
                .with_expected_outcome("Release live with dashboards and alerts")
                .with_criterion("Zero-downtime rollout")
                .with_criterion("Monitoring configured"),
        )
}

fn customer_support_automation() -> ScenarioDefinition {
    ScenarioDefinition::new("customer-support", "Customer Support Automation")
        .with_description("Automate first-line support with triage and a guided assistant.")
        .with_complexity(Complexity::Intermediate)
        .with_expected_duration(30)
        .with_task(
            TaskDefinition::new("triage", "Ticket Triage Analysis", "support-analyst")
                .with_description("Cluster historic tickets by intent and urgency.")
                .with_priority(Priority::Medium)
                .with_expected_outcome("Intent taxonomy with routing rules")
                .with_criterion("Top intents identified")
                .with_criterion("Escalation rules defined"),
        )
        .with_task(
            TaskDefinition::new("knowledge-base", "Knowledge Base Design", "content-strategist")
                .with_description("Write answers for the most frequent intents.")
                .with_priority(Priority::Medium)
                .with_expected_outcome("Searchable article set")
                .with_criterion("Articles cover top intents")
                .with_criterion("Tone guidelines applied"),
        )
        .with_task(
            TaskDefinition::new("assistant-flow", "Assistant Conversation Flow", "developer")
                .with_description("Wire intents to answers and human hand-off.")
                .with_priority(Priority::High)
                .with_expected_outcome("Conversation flow with fallback to agents")
                .with_criterion("Hand-off to human works")
                .with_criterion("Unit tests passing"),
        )
        .with_task(
            TaskDefinition::new("support-qa", "Quality Assurance Testing", "qa-engineer")
                .with_description("Replay sample conversations against the assistant.")
                .with_priority(Priority::High)
                .with_expected_outcome("Conversation test report")
                .with_criterion("Regression suite executed"),
        )
}

fn marketing_campaign_launch() -> ScenarioDefinition {
    ScenarioDefinition::new("marketing-campaign", "Marketing Campaign Launch")
        .with_description("Plan and schedule a multi-channel product campaign.")
        .with_complexity(Complexity::Basic)
        .with_expected_duration(20)
        .with_task(
            TaskDefinition::new("audience", "Audience Research", "marketing-analyst")
                .with_description("Profile target segments and channels.")
                .with_priority(Priority::Medium)
                .with_expected_outcome("Segment profiles with channel mix")
                .with_criterion("Segments defined")
                .with_criterion("Channel mix chosen"),
        )
        .with_task(
            TaskDefinition::new("content", "Campaign Content Creation", "content-creator")
                .with_description("Draft copy and creative briefs per channel.")
                .with_priority(Priority::Medium)
                .with_expected_outcome("Approved copy deck")
                .with_criterion("Copy matches brand voice")
                .with_criterion("Calls to action present"),
        )
        .with_task(
            TaskDefinition::new("schedule", "Social Media Scheduling", "social-media-manager")
                .with_description("Lay the posts out on a publishing calendar.")
                .with_priority(Priority::Low)
                .with_expected_outcome("Publishing calendar for the launch window")
                .with_criterion("Posts scheduled"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn builtin_catalogue_registers_cleanly() {
        let registry = builtin_catalogue().into_registry().unwrap();
        assert_eq!(registry.len(), 3);
        let ecommerce = registry.get("ecommerce-platform").unwrap();
        let task_ids: Vec<_> = ecommerce.tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(
            task_ids,
            vec![
                "requirements",
                "architecture",
                "implementation",
                "quality-assurance",
                "deployment"
            ]
        );
    }

    #[test]
    fn loads_toml_catalogue_in_document_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scenarios.toml");
        fs::write(
            &path,
            r#"
version = 1

[[scenarios]]
id = "onboarding"
name = "Client Onboarding"
complexity = "intermediate"
expected_duration_minutes = 15

[[scenarios.tasks]]
id = "intake"
name = "Intake Call"
assigned_agent = "account-manager"
priority = "high"
success_criteria = ["Goals recorded", "Budget confirmed"]

[[scenarios.tasks]]
id = "setup"
name = "Workspace Setup"
assigned_agent = "ops"

[[scenarios]]
id = "retro"
name = "Retrospective"
"#,
        )
        .unwrap();
        let catalogue = ScenarioCatalogue::load(&path).unwrap();
        assert_eq!(catalogue.scenarios.len(), 2);
        let onboarding = &catalogue.scenarios[0];
        assert_eq!(onboarding.complexity, Complexity::Intermediate);
        assert_eq!(onboarding.tasks[0].priority, Priority::High);
        assert_eq!(onboarding.tasks[1].priority, Priority::Medium);
        assert_eq!(onboarding.tasks[0].success_criteria.len(), 2);
        assert!(catalogue.scenarios[1].tasks.is_empty());
    }

    #[test]
    fn register_into_stops_on_duplicates() {
        let raw = r#"
[[scenarios]]
id = "dup"
name = "First"

[[scenarios]]
id = "dup"
name = "Second"
"#;
        let catalogue = ScenarioCatalogue::from_toml_str(raw).unwrap();
        let registry = ScenarioRegistry::new();
        assert!(matches!(
            catalogue.register_into(&registry),
            Err(TrainingError::DuplicateScenario(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn missing_required_fields_are_rejected_at_registration() {
        let raw = r#"
[[scenarios]]
id = "gaps"
name = "Gaps"

[[scenarios.tasks]]
name = "No id"
assigned_agent = "analyst"
"#;
        let catalogue = ScenarioCatalogue::from_toml_str(raw).unwrap();
        let registry = ScenarioRegistry::new();
        assert!(matches!(
            catalogue.register_into(&registry),
            Err(TrainingError::InvalidTaskDefinition { task_id: None, .. })
        ));
        assert!(registry.is_empty());

        let nameless = ScenarioCatalogue::from_toml_str("[[scenarios]]\nname = \"No id\"").unwrap();
        assert!(matches!(
            nameless.into_registry(),
            Err(TrainingError::InvalidScenarioDefinition(_))
        ));
    }
}
