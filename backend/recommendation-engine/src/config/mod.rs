use crate::models::IMPLICIT_VISIT_WEIGHT;
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Relative weights of the three scoring sources. Renormalized by
/// [`crate::services::hybrid::HybridEngine::update_weights`] from observed
/// accuracy; always kept summing to 1.0.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SourceWeights {
    pub collaborative: f32,
    pub content_based: f32,
    pub deep_learning: f32,
}

impl Default for SourceWeights {
    fn default() -> Self {
        Self {
            collaborative: 0.4,
            content_based: 0.4,
            deep_learning: 0.2,
        }
    }
}

impl SourceWeights {
    pub fn sum(&self) -> f32 {
        self.collaborative + self.content_based + self.deep_learning
    }
}

/// Blend applied to the deep model's three outputs (type, adventure, eco)
/// when collapsing them into a single per-destination score.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeepBlendWeights {
    pub trip_type: f32,
    pub adventure: f32,
    pub eco: f32,
}

impl Default for DeepBlendWeights {
    fn default() -> Self {
        Self {
            trip_type: 0.4,
            adventure: 0.3,
            eco: 0.3,
        }
    }
}

/// Sub-weights of the content-based similarity blend. Must sum to 1.0.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SimilarityWeights {
    pub rating: f32,
    pub price: f32,
    pub category: f32,
    pub seasonal: f32,
    pub crowd: f32,
    pub festival: f32,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            rating: 0.2,
            price: 0.15,
            category: 0.4,
            seasonal: 0.1,
            crowd: 0.1,
            festival: 0.05,
        }
    }
}

impl SimilarityWeights {
    pub fn sum(&self) -> f32 {
        self.rating + self.price + self.category + self.seasonal + self.crowd + self.festival
    }
}

/// Hyper-parameters for the collaborative matrix-factorization model.
#[derive(Debug, Clone, Deserialize)]
pub struct CollaborativeConfig {
    /// Below this many interactions training is skipped entirely.
    pub min_interactions: usize,
    pub embedding_dim: usize,
    pub learning_rate: f32,
    pub regularization: f32,
    pub epochs: usize,
    /// Pseudo-rating for implicit trip visits.
    pub implicit_visit_rating: f32,
}

impl Default for CollaborativeConfig {
    fn default() -> Self {
        Self {
            min_interactions: 10,
            embedding_dim: 16,
            learning_rate: 0.05,
            regularization: 0.01,
            epochs: 40,
            implicit_visit_rating: IMPLICIT_VISIT_WEIGHT,
        }
    }
}

/// Content-based profile building and similarity settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentConfig {
    pub similarity: SimilarityWeights,
    /// Online profile nudge rate (alpha).
    pub learning_rate: f32,
    /// Fixed profile weight for each implicit trip visit.
    pub trip_visit_weight: f32,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            similarity: SimilarityWeights::default(),
            learning_rate: 0.1,
            trip_visit_weight: 0.6,
        }
    }
}

/// Hyper-parameters for the deep preference regressor.
#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceConfig {
    /// Below this many examples training is skipped.
    pub min_examples: usize,
    pub hidden_units: (usize, usize),
    pub learning_rate: f32,
    pub epochs: usize,
    pub batch_size: usize,
}

impl Default for PreferenceConfig {
    fn default() -> Self {
        Self {
            min_examples: 6,
            hidden_units: (32, 16),
            learning_rate: 0.01,
            epochs: 60,
            batch_size: 8,
        }
    }
}

/// Retraining gate and scheduler settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// How often the auto-training loop re-checks the retrain gate.
    pub poll_interval: Duration,
    /// Minimum wall-clock gap between retrains.
    pub min_retrain_interval: Duration,
    /// Required number of new feedback rows inside [`Self::feedback_window`].
    pub feedback_threshold: usize,
    /// Lookback window for the new-feedback count.
    pub feedback_window: Duration,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(6 * 60 * 60),
            min_retrain_interval: Duration::from_secs(24 * 60 * 60),
            feedback_threshold: 10,
            feedback_window: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Full engine configuration with every scoring constant named.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub source_weights: SourceWeights,
    pub diversity_weight: f32,
    pub novelty_weight: f32,
    pub deep_blend: DeepBlendWeights,
    /// How many recent trips form the user context.
    pub recent_trips: usize,
    /// How many recent feedback rows form the user context.
    pub recent_feedback: usize,
    pub collaborative: CollaborativeConfig,
    pub content: ContentConfig,
    pub preference: PreferenceConfig,
    pub training: TrainingConfig,
}

impl EngineConfig {
    /// Reference configuration (the weights the planner shipped with).
    pub fn reference() -> Self {
        Self {
            source_weights: SourceWeights::default(),
            diversity_weight: 0.15,
            novelty_weight: 0.10,
            deep_blend: DeepBlendWeights::default(),
            recent_trips: 5,
            recent_feedback: 10,
            collaborative: CollaborativeConfig::default(),
            content: ContentConfig::default(),
            preference: PreferenceConfig::default(),
            training: TrainingConfig::default(),
        }
    }

    /// Load configuration from the environment, falling back to the
    /// reference values for anything unset.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::reference();
        config.source_weights = SourceWeights {
            collaborative: env_f32("COLLABORATIVE_WEIGHT", 0.4),
            content_based: env_f32("CONTENT_BASED_WEIGHT", 0.4),
            deep_learning: env_f32("DEEP_LEARNING_WEIGHT", 0.2),
        };
        config.diversity_weight = env_f32("DIVERSITY_WEIGHT", 0.15);
        config.novelty_weight = env_f32("NOVELTY_WEIGHT", 0.10);
        config.collaborative.min_interactions =
            env_usize("CF_MIN_INTERACTIONS", config.collaborative.min_interactions);
        config.collaborative.embedding_dim =
            env_usize("CF_EMBEDDING_DIM", config.collaborative.embedding_dim);
        config.collaborative.epochs = env_usize("CF_EPOCHS", config.collaborative.epochs);
        config.training.poll_interval = Duration::from_secs(env_u64(
            "TRAINING_POLL_INTERVAL_SECS",
            config.training.poll_interval.as_secs(),
        ));
        config.training.min_retrain_interval = Duration::from_secs(env_u64(
            "MIN_RETRAIN_INTERVAL_SECS",
            config.training.min_retrain_interval.as_secs(),
        ));
        config.training.feedback_threshold = env_usize(
            "RETRAIN_FEEDBACK_THRESHOLD",
            config.training.feedback_threshold,
        );
        config
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::reference()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_weights_sum_to_one() {
        assert!((SourceWeights::default().sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_weights_sum_to_one() {
        assert!((SimilarityWeights::default().sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reference_config() {
        let config = EngineConfig::reference();
        assert_eq!(config.collaborative.min_interactions, 10);
        assert_eq!(config.training.feedback_threshold, 10);
        assert!((config.diversity_weight - 0.15).abs() < 1e-6);
        assert!((config.novelty_weight - 0.10).abs() < 1e-6);
    }
}
