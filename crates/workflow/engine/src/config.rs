//! Engine configuration
//!
//! Loaded from TOML. Process definitions, role pools and escalation
//! targets are data; handlers, decision rules, the store, the clock and
//! the audit sink are wired in code through the engine builder.
//!
//! ```toml
//! system_actor = "SYSTEM"
//!
//! [assignment]
//! strategy = "round_robin"
//! pools = { adjuster = ["adj-1", "adj-2"] }
//!
//! [escalation]
//! default_target = "claims-manager"
//! targets = { "adj-1" = "senior-adjuster" }
//!
//! [[processes]]
//! type = "CLAIM_PROCESSING"
//! name = "Claim Processing"
//!
//! [[processes.steps]]
//! id = "assessment"
//! name = "Damage Assessment"
//! kind = "HUMAN_TASK"
//! required_roles = ["adjuster"]
//! auto_assign = true
//! ```

use crate::assignment::{AssignmentStrategy, RolePools, TaskAssigner};
use crate::catalog::ProcessCatalog;
use crate::escalation::StaticEscalationPolicy;
use insureflow_types::{ProcessDefinition, UserId, WorkflowError, WorkflowResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// User id recorded on automated events
    #[serde(default = "default_system_actor")]
    pub system_actor: UserId,

    #[serde(default)]
    pub assignment: AssignmentConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Definitions registered into the catalog at build time
    #[serde(default)]
    pub processes: Vec<ProcessDefinition>,
}

fn default_system_actor() -> UserId {
    UserId::new("SYSTEM")
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_actor: default_system_actor(),
            assignment: AssignmentConfig::default(),
            escalation: EscalationConfig::default(),
            processes: Vec::new(),
        }
    }
}

/// Role pools and the strategy that picks from them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssignmentConfig {
    #[serde(default)]
    pub strategy: AssignmentStrategy,
    #[serde(default)]
    pub pools: RolePools,
}

/// Assignee → escalation target table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationConfig {
    #[serde(default)]
    pub targets: HashMap<UserId, UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<UserId>,
}

impl EngineConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> WorkflowResult<Self> {
        toml::from_str(contents).map_err(|e| WorkflowError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> WorkflowResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WorkflowError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(
            path = %path.display(),
            processes = config.processes.len(),
            roles = config.assignment.pools.len(),
            "Engine configuration loaded"
        );
        Ok(config)
    }

    /// Catalog holding every configured process
    pub fn build_catalog(&self) -> WorkflowResult<ProcessCatalog> {
        let mut catalog = ProcessCatalog::new();
        for definition in &self.processes {
            catalog.register(definition.clone())?;
        }
        Ok(catalog)
    }

    /// Assigner of the configured strategy over the configured pools
    pub fn build_assigner(&self) -> Arc<dyn TaskAssigner> {
        self.assignment
            .strategy
            .build(self.assignment.pools.clone())
    }

    pub fn build_escalation_policy(&self) -> StaticEscalationPolicy {
        let policy = StaticEscalationPolicy::from_targets(self.escalation.targets.clone());
        match &self.escalation.default_target {
            Some(target) => policy.with_default(target.clone()),
            None => policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::EscalationPolicy;
    use insureflow_types::{ProcessType, RoleId, StepKind};

    const SAMPLE: &str = r#"
        system_actor = "ENGINE"

        [assignment]
        strategy = "round_robin"

        [assignment.pools]
        underwriter = ["uw-1", "uw-2"]
        medical_examiner = ["doc-1"]

        [escalation]
        default_target = "ops-supervisor"

        [escalation.targets]
        "uw-1" = "uw-lead"

        [[processes]]
        type = "POLICY_APPLICATION"
        name = "Policy Application"
        version = 2

        [[processes.steps]]
        id = "validate"
        name = "Validate Application"
        kind = "AUTOMATED"

        [[processes.steps]]
        id = "underwriting"
        name = "Underwriting Review"
        kind = "HUMAN_TASK"
        required_roles = ["underwriter"]
        auto_assign = true
        timeout_secs = 172800

        [[processes.steps]]
        id = "issue"
        name = "Issue Policy"
        kind = "AUTOMATED"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.system_actor, UserId::new("ENGINE"));
        assert_eq!(config.assignment.strategy, AssignmentStrategy::RoundRobin);
        assert_eq!(config.assignment.pools[&RoleId::new("underwriter")].len(), 2);
        assert_eq!(config.processes.len(), 1);
        assert_eq!(config.processes[0].version, 2);
        assert_eq!(config.processes[0].steps[1].kind, StepKind::HumanTask);
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.system_actor, UserId::new("SYSTEM"));
        assert!(config.processes.is_empty());
        assert!(config.assignment.pools.is_empty());
        assert!(config.escalation.default_target.is_none());
    }

    #[test]
    fn test_build_components() {
        let config = EngineConfig::from_toml_str(SAMPLE).unwrap();

        let catalog = config.build_catalog().unwrap();
        assert!(catalog.contains(&ProcessType::new("POLICY_APPLICATION")));

        let assigner = config.build_assigner();
        assert_eq!(
            assigner.assign(&RoleId::new("underwriter")),
            Some(UserId::new("uw-1"))
        );

        let policy = config.build_escalation_policy();
        assert_eq!(
            policy.escalation_target(&UserId::new("uw-1")),
            Some(UserId::new("uw-lead"))
        );
        assert_eq!(
            policy.escalation_target(&UserId::new("uw-2")),
            Some(UserId::new("ops-supervisor"))
        );
    }

    #[test]
    fn test_invalid_config() {
        let err = EngineConfig::from_toml_str("[assignment]\nstrategy = \"lottery\"").unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
    }

    #[test]
    fn test_duplicate_process_in_config() {
        let mut config = EngineConfig::from_toml_str(SAMPLE).unwrap();
        config.processes.push(config.processes[0].clone());
        assert!(matches!(
            config.build_catalog(),
            Err(WorkflowError::DuplicateProcessType(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = EngineConfig::load("/nonexistent/insureflow/engine.toml").unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "insureflow-config-{}.toml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, SAMPLE).unwrap();
        let config = EngineConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(config.processes[0].steps.len(), 3);
    }
}
