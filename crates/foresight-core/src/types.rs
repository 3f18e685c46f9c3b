//! Evaluation history types shared by the store, the models and the
//! scoring payloads.
//!
//! Evaluations serialize to the camelCase JSON shape the scoring scripts
//! read from stdin:
//!
//! ```text
//! {"id": 0, "created": "2020-02-01T00:55:33Z", "val": {"targetReplicas": 3}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a stored evaluation, assigned by the evaluation store.
pub type EvaluationId = u64;

/// Name of an autoscaling target (e.g. `default/api`).
pub type TargetName = String;

/// The observation recorded by one evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationValue {
    /// Replica count the target was observed to need.
    pub target_replicas: i32,
}

/// A timestamped historical observation for one target and model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub id: EvaluationId,
    pub created: DateTime<Utc>,
    pub val: EvaluationValue,
}

impl Evaluation {
    pub fn new(id: EvaluationId, created: DateTime<Utc>, target_replicas: i32) -> Self {
        Self {
            id,
            created,
            val: EvaluationValue { target_replicas },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_to_camel_case_wire_shape() {
        let created = Utc.with_ymd_and_hms(2020, 2, 1, 0, 55, 33).unwrap();
        let eval = Evaluation::new(0, created, 3);

        let json = serde_json::to_string(&eval).unwrap();
        assert_eq!(
            json,
            r#"{"id":0,"created":"2020-02-01T00:55:33Z","val":{"targetReplicas":3}}"#
        );
    }

    #[test]
    fn parses_scoring_script_input_format() {
        let json = r#"{"id":7,"created":"2020-02-01T00:56:33Z","val":{"targetReplicas":2}}"#;
        let eval: Evaluation = serde_json::from_str(json).unwrap();
        assert_eq!(eval.id, 7);
        assert_eq!(eval.val.target_replicas, 2);
    }
}
