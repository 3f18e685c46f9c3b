//! PredictiveAutoscaler — model-driven replica decisions.
//!
//! Records each new evaluation in the evaluation store, runs every model
//! configured on the target over its stored history, prunes the history to
//! each model's retention window, and combines the forecasts into a single
//! scaling decision.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use foresight_core::{DecisionType, EvaluationValue, ModelConfig, TargetConfig, TargetName};
use foresight_model::ModelRegistry;
use foresight_state::EvaluationStore;

use crate::decision::combine;

/// A scaling decision for a single target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Scale to the specified replica count.
    ScaleTo(i32),
    /// The forecast matches the current replica count.
    NoChange,
}

/// What the caller observed for a target this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Replica count computed from current metrics; stored as the newest
    /// evaluation.
    pub evaluated_replicas: i32,
    /// Replicas currently running, if known.
    pub current_replicas: Option<i32>,
}

impl Observation {
    pub fn new(evaluated_replicas: i32) -> Self {
        Self {
            evaluated_replicas,
            current_replicas: None,
        }
    }

    pub fn with_current(mut self, current_replicas: i32) -> Self {
        self.current_replicas = Some(current_replicas);
        self
    }
}

/// Runs prediction models for targets and decides their replica counts.
pub struct PredictiveAutoscaler {
    state: EvaluationStore,
    registry: ModelRegistry,
    decision_type: DecisionType,
}

impl PredictiveAutoscaler {
    /// Create a new autoscaler combining forecasts by maximum.
    pub fn new(state: EvaluationStore, registry: ModelRegistry) -> Self {
        Self {
            state,
            registry,
            decision_type: DecisionType::default(),
        }
    }

    pub fn with_decision_type(mut self, decision_type: DecisionType) -> Self {
        self.decision_type = decision_type;
        self
    }

    pub fn state(&self) -> &EvaluationStore {
        &self.state
    }

    /// Evaluate a single target and return a scaling decision.
    ///
    /// A model that fails is logged and left out of this cycle; its history
    /// is kept untouched.
    pub fn evaluate(
        &self,
        target: &TargetConfig,
        observation: Observation,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ScaleDecision> {
        self.prune_unconfigured(target)?;

        let mut predictions = Vec::with_capacity(target.models.len());
        for model in &target.models {
            if let Some(prediction) =
                self.run_model(target, model, observation.evaluated_replicas, now)?
            {
                predictions.push(prediction);
            }
        }

        let replicas = match combine(self.decision_type, &predictions) {
            Some(replicas) => replicas,
            None => {
                warn!(
                    target = %target.name,
                    evaluated = observation.evaluated_replicas,
                    "no model produced a prediction, using evaluated replicas"
                );
                observation.evaluated_replicas
            }
        };
        let clamped = replicas.clamp(target.min_replicas, target.max_replicas);

        debug!(
            target = %target.name,
            predictions = ?predictions,
            decision_type = ?self.decision_type,
            combined = replicas,
            clamped,
            "target evaluated"
        );

        if observation.current_replicas == Some(clamped) {
            return Ok(ScaleDecision::NoChange);
        }
        Ok(ScaleDecision::ScaleTo(clamped))
    }

    /// Store the new evaluation, forecast, then prune to the retention window.
    ///
    /// Model failures yield `Ok(None)`; store failures are returned.
    fn run_model(
        &self,
        target: &TargetConfig,
        config: &ModelConfig,
        evaluated_replicas: i32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<i32>> {
        let model = match self.registry.for_config(config) {
            Ok(model) => model,
            Err(e) => {
                warn!(target = %target.name, model = %config.name, error = %e, "skipping model");
                return Ok(None);
            }
        };

        self.state
            .append_evaluation(
                &target.name,
                &config.name,
                now,
                EvaluationValue {
                    target_replicas: evaluated_replicas,
                },
            )
            .context("failed to store evaluation")?;
        let history = self
            .state
            .list_evaluations(&target.name, &config.name)
            .context("failed to load evaluations")?;

        let forecast = model
            .get_prediction(config, &history)
            .and_then(|prediction| Ok((prediction, model.get_ids_to_remove(config, &history)?)));
        let (prediction, stale) = match forecast {
            Ok(forecast) => forecast,
            Err(e) => {
                warn!(
                    target = %target.name,
                    model = %config.name,
                    error = %e,
                    "prediction failed, skipping model this cycle"
                );
                return Ok(None);
            }
        };

        let removed = self
            .state
            .delete_evaluations(&target.name, &config.name, &stale)
            .context("failed to prune evaluations")?;

        debug!(
            target = %target.name,
            model = %config.name,
            model_type = model.model_type(),
            history = history.len(),
            removed,
            prediction,
            "model evaluated"
        );
        Ok(Some(prediction))
    }

    /// Drop the histories of models no longer configured on the target.
    fn prune_unconfigured(&self, target: &TargetConfig) -> anyhow::Result<()> {
        for model in self.state.list_models(&target.name)? {
            if target.models.iter().any(|m| m.name == model) {
                continue;
            }
            let removed = self.state.delete_model_history(&target.name, &model)?;
            info!(target = %target.name, %model, removed, "removed history of unconfigured model");
        }
        Ok(())
    }

    /// Evaluate several targets concurrently on the blocking pool.
    ///
    /// Each target reads its own snapshot from the store. Targets that fail
    /// are logged and left out of the result, which is sorted by name.
    pub async fn evaluate_all(
        self: &Arc<Self>,
        targets: Vec<(TargetConfig, Observation)>,
    ) -> Vec<(TargetName, ScaleDecision)> {
        let mut tasks = JoinSet::new();
        for (target, observation) in targets {
            let scaler = Arc::clone(self);
            tasks.spawn_blocking(move || {
                let result = scaler.evaluate(&target, observation, Utc::now());
                (target.name, result)
            });
        }

        let mut decisions = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((name, Ok(decision))) => decisions.push((name, decision)),
                Ok((name, Err(e))) => {
                    error!(target = %name, error = %format!("{e:#}"), "target evaluation failed");
                }
                Err(e) => error!(error = %e, "evaluation task panicked"),
            }
        }
        decisions.sort_by(|a, b| a.0.cmp(&b.0));
        decisions
    }
}
