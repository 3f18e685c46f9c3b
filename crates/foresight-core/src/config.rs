//! foresight.toml configuration parser.

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::types::TargetName;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForesightConfig {
    /// How predictions from several models of one target are combined.
    #[serde(default)]
    pub decision_type: DecisionType,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DecisionType {
    #[default]
    Maximum,
    Minimum,
    Mean,
    Median,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    pub name: TargetName,
    #[serde(default = "default_min_replicas")]
    pub min_replicas: i32,
    pub max_replicas: i32,
    pub models: Vec<ModelConfig>,
}

/// Configuration of one prediction model attached to a target.
///
/// `model_type` selects the strategy; the matching strategy block (e.g.
/// `reactive`) carries its parameters. A missing block is reported by the
/// strategy when it runs, not here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    #[serde(rename = "type")]
    pub model_type: String,
    pub name: String,
    pub calculation_timeout_ms: Option<u64>,
    pub reactive: Option<ReactiveConfig>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactiveConfig {
    /// Maximum number of evaluations retained for the model.
    pub stored_values: u32,
    /// Forecast horizon handed to the scoring routine.
    pub look_ahead: i64,
}

fn default_min_replicas() -> i32 {
    1
}

impl ModelConfig {
    pub fn calculation_timeout(&self) -> Option<Duration> {
        self.calculation_timeout_ms.map(Duration::from_millis)
    }
}

impl ForesightConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ForesightConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Look up a target by name.
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Check the invariants serde can't express.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut target_names = HashSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                bail!("target name must not be empty");
            }
            if !target_names.insert(target.name.as_str()) {
                bail!("duplicate target {}", target.name);
            }
            if target.min_replicas < 0 {
                bail!("target {}: min_replicas must be >= 0", target.name);
            }
            if target.min_replicas > target.max_replicas {
                bail!(
                    "target {}: min_replicas ({}) exceeds max_replicas ({})",
                    target.name,
                    target.min_replicas,
                    target.max_replicas
                );
            }
            if target.models.is_empty() {
                bail!("target {}: at least one model is required", target.name);
            }

            let mut model_names = HashSet::new();
            for model in &target.models {
                if model.name.is_empty() {
                    bail!("target {}: model name must not be empty", target.name);
                }
                if !model_names.insert(model.name.as_str()) {
                    bail!("target {}: duplicate model {}", target.name, model.name);
                }
            }
        }
        Ok(())
    }

    /// A single-target config with one reactive model.
    pub fn scaffold(target: &str) -> Self {
        ForesightConfig {
            decision_type: DecisionType::Maximum,
            targets: vec![TargetConfig {
                name: target.to_string(),
                min_replicas: 1,
                max_replicas: 10,
                models: vec![ModelConfig {
                    model_type: "Reactive".to_string(),
                    name: "reactive".to_string(),
                    calculation_timeout_ms: Some(25_000),
                    reactive: Some(ReactiveConfig {
                        stored_values: 10,
                        look_ahead: 3,
                    }),
                }],
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
decision_type = "median"

[[targets]]
name = "default/api"
min_replicas = 2
max_replicas = 8

[[targets.models]]
type = "Reactive"
name = "reactive"
calculation_timeout_ms = 1500

[targets.models.reactive]
stored_values = 5
look_ahead = 3
"#;

    #[test]
    fn test_parse_full() {
        let config = ForesightConfig::parse(FULL).unwrap();
        assert_eq!(config.decision_type, DecisionType::Median);

        let target = config.target("default/api").unwrap();
        assert_eq!(target.min_replicas, 2);
        assert_eq!(target.max_replicas, 8);

        let model = &target.models[0];
        assert_eq!(model.model_type, "Reactive");
        assert_eq!(model.calculation_timeout(), Some(Duration::from_millis(1500)));
        assert_eq!(
            model.reactive,
            Some(ReactiveConfig {
                stored_values: 5,
                look_ahead: 3
            })
        );
    }

    #[test]
    fn test_defaults() {
        let config = ForesightConfig::parse(
            r#"
[[targets]]
name = "web"
max_replicas = 3

[[targets.models]]
type = "Reactive"
name = "r"
"#,
        )
        .unwrap();
        assert_eq!(config.decision_type, DecisionType::Maximum);
        assert_eq!(config.targets[0].min_replicas, 1);
        assert!(config.targets[0].models[0].reactive.is_none());
        assert!(config.targets[0].models[0].calculation_timeout().is_none());
    }

    #[test]
    fn test_negative_stored_values_rejected() {
        let bad = FULL.replace("stored_values = 5", "stored_values = -1");
        assert!(ForesightConfig::parse(&bad).is_err());
    }

    #[test]
    fn test_min_above_max_rejected() {
        let bad = FULL.replace("min_replicas = 2", "min_replicas = 9");
        let err = ForesightConfig::parse(&bad).unwrap_err();
        assert!(err.to_string().contains("exceeds max_replicas"));
    }

    #[test]
    fn test_duplicate_model_names_rejected() {
        let mut config = ForesightConfig::scaffold("web");
        let dup = config.targets[0].models[0].clone();
        config.targets[0].models.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate model"));
    }

    #[test]
    fn test_target_without_models_rejected() {
        let mut config = ForesightConfig::scaffold("web");
        config.targets[0].models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_scaffold_round_trips() {
        let config = ForesightConfig::scaffold("default/api");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("default/api"));
        assert_eq!(ForesightConfig::parse(&toml_str).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foresight.toml");
        std::fs::write(&path, FULL).unwrap();

        let config = ForesightConfig::from_file(&path).unwrap();
        assert_eq!(config.targets.len(), 1);

        assert!(ForesightConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
