//! The prediction model contract.

use foresight_core::{Evaluation, EvaluationId, ModelConfig};

use crate::error::PredictionResult;

/// A replica forecasting strategy.
///
/// Implementations are stateless with respect to the history: everything
/// they need arrives in `config` and `evaluations`. Input slices are never
/// mutated, so one snapshot may be shared between concurrent calls.
pub trait PredictionModel: Send + Sync {
    /// Stable identifier, matched against `ModelConfig::model_type`.
    fn model_type(&self) -> &'static str;

    /// Forecast the replica count for the target the history belongs to.
    ///
    /// Fails with `MissingConfig` if the strategy's config block is absent.
    fn get_prediction(
        &self,
        config: &ModelConfig,
        evaluations: &[Evaluation],
    ) -> PredictionResult<i32>;

    /// IDs of stored evaluations that exceed the retention policy, oldest
    /// first.
    ///
    /// Fails with `MissingConfig` if the strategy's config block is absent.
    fn get_ids_to_remove(
        &self,
        config: &ModelConfig,
        evaluations: &[Evaluation],
    ) -> PredictionResult<Vec<EvaluationId>>;
}
