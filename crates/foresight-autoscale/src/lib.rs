//! foresight-autoscale — one evaluation pass of the predictive autoscaler.
//!
//! For every model configured on a target, records the latest evaluation in
//! the store, asks the model for a forecast over the stored history, and
//! prunes the history to the model's retention window. Forecasts from all
//! models are then combined and clamped to the target's replica bounds.
//!
//! # Evaluation pass
//!
//! ```text
//! for model in target.models:
//!     store.append(target, model, now, evaluated_replicas)
//!     history    = store.list(target, model)
//!     prediction = model.get_prediction(config, history)    // skip model on error
//!     stale      = model.get_ids_to_remove(config, history)
//!     store.delete(target, model, stale)
//!
//! replicas = combine(decision_type, predictions)            // max | min | mean | median
//!         or evaluated_replicas if every model failed
//! ScaleTo(clamp(replicas, min_replicas, max_replicas))
//! ```
//!
//! History is only pruned after a successful prediction, so a failing
//! scoring routine never costs stored evaluations.

pub mod decision;
pub mod scaler;

pub use decision::combine;
pub use scaler::{Observation, PredictiveAutoscaler, ScaleDecision};
