//! Model registry — routes a model config to the strategy that handles it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use foresight_algorithm::AlgorithmRunner;
use foresight_core::ModelConfig;

use crate::error::{PredictionError, PredictionResult};
use crate::model::PredictionModel;
use crate::reactive::ReactivePredictor;

/// Prediction models keyed by their `model_type()`.
#[derive(Default, Clone)]
pub struct ModelRegistry {
    models: HashMap<&'static str, Arc<dyn PredictionModel>>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in strategy, all sharing `runner`.
    pub fn with_defaults(runner: Arc<dyn AlgorithmRunner>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ReactivePredictor::new(runner)));
        registry
    }

    /// Add a model, replacing any previous model of the same type.
    pub fn register(&mut self, model: Arc<dyn PredictionModel>) {
        let model_type = model.model_type();
        if self.models.insert(model_type, model).is_some() {
            debug!(%model_type, "replaced prediction model");
        }
    }

    pub fn get(&self, model_type: &str) -> PredictionResult<Arc<dyn PredictionModel>> {
        self.models
            .get(model_type)
            .cloned()
            .ok_or_else(|| PredictionError::UnknownModel(model_type.to_string()))
    }

    /// The model that handles `config`.
    pub fn for_config(&self, config: &ModelConfig) -> PredictionResult<Arc<dyn PredictionModel>> {
        self.get(&config.model_type)
    }

    /// Registered model types, sorted.
    pub fn model_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.models.keys().copied().collect();
        types.sort_unstable();
        types
    }
}
