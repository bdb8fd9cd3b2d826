// Utility functions shared across the recommendation engine.

use crate::models::Feedback;

/// Clamp a score into the [0, 1] range.
pub fn clamp01(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Average star rating over a feedback slice.
///
/// Returns `default` when the slice is empty so downstream comparisons
/// against "recent satisfaction" stay meaningful for new users.
pub fn mean_rating(feedback: &[Feedback], default: f32) -> f32 {
    if feedback.is_empty() {
        return default;
    }
    let sum: f32 = feedback.iter().map(|f| f.rating).sum();
    sum / feedback.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn feedback(rating: f32) -> Feedback {
        Feedback {
            user_id: "u1".to_string(),
            destination_id: "d1".to_string(),
            rating,
            timestamp: Utc::now(),
            stated_preferences: None,
        }
    }

    #[test]
    fn test_clamp01() {
        assert_eq!(clamp01(-0.5), 0.0);
        assert_eq!(clamp01(0.5), 0.5);
        assert_eq!(clamp01(1.5), 1.0);
    }

    #[test]
    fn test_mean_rating() {
        let ratings = vec![feedback(3.0), feedback(5.0)];
        assert!((mean_rating(&ratings, 4.0) - 4.0).abs() < f32::EPSILON);
        assert!((mean_rating(&[], 4.0) - 4.0).abs() < f32::EPSILON);
    }
}
