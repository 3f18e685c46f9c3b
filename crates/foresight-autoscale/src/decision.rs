//! Combining the forecasts of several models into one replica count.

use foresight_core::DecisionType;

/// Combine per-model predictions. Mean and median round up, so ties
/// favour capacity. Returns `None` for an empty slice.
pub fn combine(decision_type: DecisionType, predictions: &[i32]) -> Option<i32> {
    if predictions.is_empty() {
        return None;
    }
    let combined = match decision_type {
        DecisionType::Maximum => *predictions.iter().max()?,
        DecisionType::Minimum => *predictions.iter().min()?,
        DecisionType::Mean => {
            let total: i64 = predictions.iter().map(|&p| i64::from(p)).sum();
            ceil_div(total, predictions.len() as i64)
        }
        DecisionType::Median => {
            let mut sorted = predictions.to_vec();
            sorted.sort_unstable();
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 1 {
                sorted[mid]
            } else {
                ceil_div(i64::from(sorted[mid - 1]) + i64::from(sorted[mid]), 2)
            }
        }
    };
    Some(combined)
}

/// The mean of i32 values always fits back into i32.
fn ceil_div(total: i64, count: i64) -> i32 {
    total.div_euclid(count) as i32 + i32::from(total.rem_euclid(count) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_predictions_yield_none() {
        assert_eq!(combine(DecisionType::Maximum, &[]), None);
        assert_eq!(combine(DecisionType::Median, &[]), None);
    }

    #[test]
    fn maximum_and_minimum() {
        assert_eq!(combine(DecisionType::Maximum, &[3, 9, 4]), Some(9));
        assert_eq!(combine(DecisionType::Minimum, &[3, 9, 4]), Some(3));
    }

    #[test]
    fn mean_rounds_up() {
        assert_eq!(combine(DecisionType::Mean, &[2, 4]), Some(3));
        assert_eq!(combine(DecisionType::Mean, &[2, 3]), Some(3));
        assert_eq!(combine(DecisionType::Mean, &[1, 1, 2]), Some(2));
        assert_eq!(combine(DecisionType::Mean, &[-3, -2]), Some(-2));
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(combine(DecisionType::Median, &[9, 1, 5]), Some(5));
        assert_eq!(combine(DecisionType::Median, &[8, 1, 4, 5]), Some(5));
        assert_eq!(combine(DecisionType::Median, &[7]), Some(7));
    }

    #[test]
    fn large_values_do_not_overflow() {
        assert_eq!(combine(DecisionType::Mean, &[i32::MAX, i32::MAX]), Some(i32::MAX));
        assert_eq!(combine(DecisionType::Median, &[i32::MAX, i32::MAX - 1]), Some(i32::MAX));
    }
}
