//! Reactive strategy — forwards the recent history to the reactive scoring
//! script and keeps only the newest `stored_values` evaluations.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use foresight_algorithm::AlgorithmRunner;
use foresight_core::{Evaluation, EvaluationId, ModelConfig, ReactiveConfig};

use crate::error::{PredictionError, PredictionResult};
use crate::model::PredictionModel;

/// Model type identifier of the reactive strategy.
pub const TYPE: &str = "Reactive";

/// Scoring routine run for every reactive prediction.
pub const ALGORITHM_PATH: &str = "/app/algorithms/reactive/reactive.py";

/// Request handed to the scoring routine on stdin.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReactiveParameters<'a> {
    look_ahead: i64,
    evaluations: &'a [Evaluation],
}

/// Reactive prediction model.
pub struct ReactivePredictor {
    runner: Arc<dyn AlgorithmRunner>,
    algorithm_path: String,
}

impl ReactivePredictor {
    pub fn new(runner: Arc<dyn AlgorithmRunner>) -> Self {
        Self {
            runner,
            algorithm_path: ALGORITHM_PATH.to_string(),
        }
    }

    /// Use a scoring script installed somewhere other than [`ALGORITHM_PATH`].
    pub fn with_algorithm_path(mut self, path: impl Into<String>) -> Self {
        self.algorithm_path = path.into();
        self
    }

    pub fn algorithm_path(&self) -> &str {
        &self.algorithm_path
    }

    fn reactive_config(config: &ModelConfig) -> PredictionResult<&ReactiveConfig> {
        config
            .reactive
            .as_ref()
            .ok_or(PredictionError::MissingConfig { model_type: TYPE })
    }
}

impl PredictionModel for ReactivePredictor {
    fn model_type(&self) -> &'static str {
        TYPE
    }

    fn get_prediction(
        &self,
        config: &ModelConfig,
        evaluations: &[Evaluation],
    ) -> PredictionResult<i32> {
        let reactive = Self::reactive_config(config)?;

        // Every field is plain data built here; failing to encode it is a bug.
        let parameters = serde_json::to_string(&ReactiveParameters {
            look_ahead: reactive.look_ahead,
            evaluations,
        })
        .expect("reactive parameters are always serializable");

        let value = self.runner.run_algorithm_with_value(
            &self.algorithm_path,
            &parameters,
            config.calculation_timeout(),
        )?;

        let prediction = value
            .trim()
            .parse::<i32>()
            .map_err(|source| PredictionError::InvalidResult {
                output: value.clone(),
                source,
            })?;

        debug!(
            model = %config.name,
            evaluations = evaluations.len(),
            look_ahead = reactive.look_ahead,
            prediction,
            "reactive prediction"
        );
        Ok(prediction)
    }

    /// Sorts a private view of `evaluations` by creation time (stable, so
    /// equal timestamps keep their input order) and marks everything older
    /// than the newest `stored_values` entries.
    fn get_ids_to_remove(
        &self,
        config: &ModelConfig,
        evaluations: &[Evaluation],
    ) -> PredictionResult<Vec<EvaluationId>> {
        let reactive = Self::reactive_config(config)?;

        let mut by_age: Vec<&Evaluation> = evaluations.iter().collect();
        by_age.sort_by_key(|e| e.created);

        let keep = reactive.stored_values as usize;
        let excess = by_age.len().saturating_sub(keep);
        Ok(by_age[..excess].iter().map(|e| e.id).collect())
    }
}
