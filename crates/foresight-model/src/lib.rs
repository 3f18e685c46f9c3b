//! foresight-model — pluggable prediction models.
//!
//! A [`PredictionModel`] turns the evaluation history of one target into a
//! replica forecast, and separately tells the caller which stored
//! evaluations fall outside its retention window. Both operations are pure
//! functions of (config, snapshot): the model never touches storage, and
//! the caller decides when to act on the removal list.
//!
//! Models are looked up by [`PredictionModel::model_type`] through a
//! [`ModelRegistry`], which is how a target's `type = "..."` config entry is
//! routed to an implementation.

pub mod error;
pub mod model;
pub mod reactive;
pub mod registry;

pub use error::{PredictionError, PredictionResult};
pub use model::PredictionModel;
pub use reactive::ReactivePredictor;
pub use registry::ModelRegistry;
