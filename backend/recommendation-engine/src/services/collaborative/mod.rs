//! Collaborative filtering scorer.
//!
//! Learns user×destination affinity from the interaction log with a biased
//! matrix factorization fitted by SGD. Predictions pass through a sigmoid so
//! they stay in [0, 1]. Absence of a trained model is a defined degraded
//! state: unknown users, unknown items, and the untrained model all predict
//! the neutral score, never an error.

use crate::config::CollaborativeConfig;
use crate::models::{Interaction, InteractionSource};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use tracing::{debug, info, warn};

/// Score returned for untrained models and unseen user/item ids.
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Provenance tag for candidates produced by this scorer.
pub const SOURCE: &str = "collaborative_filtering";

/// Outcome of a training pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CfTrainOutcome {
    Trained {
        users: usize,
        items: usize,
        interactions: usize,
    },
    /// Fewer interactions than the configured minimum; the previous model
    /// (if any) is left untouched.
    SkippedInsufficientData {
        supplied: usize,
        required: usize,
    },
}

/// A destination scored by the collaborative model.
#[derive(Debug, Clone)]
pub struct CfCandidate {
    pub item_id: String,
    pub predicted: f32,
}

struct CfModelState {
    user_index: HashMap<String, usize>,
    item_index: HashMap<String, usize>,
    /// Index → id, for enumerating known items.
    users: Vec<String>,
    items: Vec<String>,
    user_factors: Array2<f32>,
    item_factors: Array2<f32>,
    user_bias: Array1<f32>,
    item_bias: Array1<f32>,
    global_bias: f32,
}

impl CfModelState {
    fn predict(&self, user: usize, item: usize) -> f32 {
        let dot = self.user_factors.row(user).dot(&self.item_factors.row(item));
        sigmoid(self.global_bias + self.user_bias[user] + self.item_bias[item] + dot)
    }
}

/// The collaborative filtering model. Training swaps in a fresh immutable
/// snapshot; inference only ever sees a fully trained state.
pub struct CollaborativeModel {
    config: CollaborativeConfig,
    state: RwLock<Option<CfModelState>>,
}

impl CollaborativeModel {
    pub fn new(config: CollaborativeConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.state.read().expect("cf state lock poisoned").is_some()
    }

    /// Fit the factorization from the full interaction log.
    ///
    /// Training targets are the normalized interaction weights for explicit
    /// feedback and the fixed implicit pseudo-rating for trip visits. With
    /// fewer than `min_interactions` rows the call is a no-op and reports
    /// [`CfTrainOutcome::SkippedInsufficientData`].
    pub fn train(&self, interactions: &[Interaction], seed: Option<u64>) -> CfTrainOutcome {
        if interactions.len() < self.config.min_interactions {
            warn!(
                supplied = interactions.len(),
                required = self.config.min_interactions,
                "not enough interaction data for collaborative training"
            );
            return CfTrainOutcome::SkippedInsufficientData {
                supplied: interactions.len(),
                required: self.config.min_interactions,
            };
        }

        // Dense indices in first-seen order.
        let mut user_index: HashMap<String, usize> = HashMap::new();
        let mut item_index: HashMap<String, usize> = HashMap::new();
        let mut users: Vec<String> = Vec::new();
        let mut items: Vec<String> = Vec::new();
        let mut samples: Vec<(usize, usize, f32)> = Vec::with_capacity(interactions.len());

        for interaction in interactions {
            let u = *user_index
                .entry(interaction.user_id.clone())
                .or_insert_with(|| {
                    users.push(interaction.user_id.clone());
                    users.len() - 1
                });
            let i = *item_index
                .entry(interaction.destination_id.clone())
                .or_insert_with(|| {
                    items.push(interaction.destination_id.clone());
                    items.len() - 1
                });
            let target = match interaction.source {
                InteractionSource::ExplicitFeedback => interaction.weight.clamp(0.0, 1.0),
                InteractionSource::TripVisit => self.config.implicit_visit_rating,
            };
            samples.push((u, i, target));
        }

        let num_users = users.len();
        let num_items = items.len();
        let dim = self.config.embedding_dim;
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut user_factors =
            Array2::from_shape_fn((num_users, dim), |_| rng.gen_range(-0.05..0.05));
        let mut item_factors =
            Array2::from_shape_fn((num_items, dim), |_| rng.gen_range(-0.05..0.05));
        let mut user_bias = Array1::zeros(num_users);
        let mut item_bias = Array1::zeros(num_items);
        let global_bias = 0.0;

        let lr = self.config.learning_rate;
        let reg = self.config.regularization;

        for epoch in 0..self.config.epochs {
            samples.shuffle(&mut rng);
            let mut epoch_loss = 0.0f32;

            for &(u, i, target) in &samples {
                let dot = user_factors.row(u).dot(&item_factors.row(i));
                let raw = global_bias + user_bias[u] + item_bias[i] + dot;
                let pred = sigmoid(raw);
                let err = pred - target;
                epoch_loss += err * err;

                // MSE through the sigmoid: d(loss)/d(raw) = err · σ'(raw).
                let grad = err * pred * (1.0 - pred);

                user_bias[u] -= lr * (grad + reg * user_bias[u]);
                item_bias[i] -= lr * (grad + reg * item_bias[i]);
                for d in 0..dim {
                    let uf = user_factors[[u, d]];
                    let vf = item_factors[[i, d]];
                    user_factors[[u, d]] -= lr * (grad * vf + reg * uf);
                    item_factors[[i, d]] -= lr * (grad * uf + reg * vf);
                }
            }

            if epoch % 10 == 0 {
                debug!(
                    epoch,
                    loss = epoch_loss / samples.len() as f32,
                    "collaborative training epoch"
                );
            }
        }

        let state = CfModelState {
            user_index,
            item_index,
            users,
            items,
            user_factors,
            item_factors,
            user_bias,
            item_bias,
            global_bias,
        };

        info!(
            users = num_users,
            items = num_items,
            interactions = samples.len(),
            "collaborative filtering training completed"
        );

        *self.state.write().expect("cf state lock poisoned") = Some(state);
        CfTrainOutcome::Trained {
            users: num_users,
            items: num_items,
            interactions: samples.len(),
        }
    }

    /// Predict the user's affinity for a destination, in [0, 1].
    ///
    /// Returns [`NEUTRAL_SCORE`] when the model is untrained or either id
    /// was not seen during training; unseen ids are never extrapolated.
    pub fn predict(&self, user_id: &str, item_id: &str) -> f32 {
        let guard = self.state.read().expect("cf state lock poisoned");
        let Some(state) = guard.as_ref() else {
            return NEUTRAL_SCORE;
        };
        match (state.user_index.get(user_id), state.item_index.get(item_id)) {
            (Some(&u), Some(&i)) => state.predict(u, i),
            _ => NEUTRAL_SCORE,
        }
    }

    /// Score every known item for the user and return the top K, skipping
    /// anything in `visited`. Empty when the model is untrained or the user
    /// is unknown.
    pub fn recommend_for_user(
        &self,
        user_id: &str,
        top_k: usize,
        visited: &HashSet<String>,
    ) -> Vec<CfCandidate> {
        let guard = self.state.read().expect("cf state lock poisoned");
        let Some(state) = guard.as_ref() else {
            return Vec::new();
        };
        let Some(&u) = state.user_index.get(user_id) else {
            return Vec::new();
        };

        let mut candidates: Vec<CfCandidate> = state
            .items
            .iter()
            .enumerate()
            .filter(|(_, id)| !visited.contains(id.as_str()))
            .map(|(i, id)| CfCandidate {
                item_id: id.clone(),
                predicted: state.predict(u, i),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.predicted
                .partial_cmp(&a.predicted)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        candidates
    }

    /// Users most similar to the given user, by cosine similarity of the
    /// trained user factors.
    pub fn similar_users(&self, user_id: &str, top_k: usize) -> Vec<(String, f32)> {
        let guard = self.state.read().expect("cf state lock poisoned");
        let Some(state) = guard.as_ref() else {
            return Vec::new();
        };
        let Some(&u) = state.user_index.get(user_id) else {
            return Vec::new();
        };

        let target = state.user_factors.row(u);
        let target_norm = target.dot(&target).sqrt();
        let mut similarities: Vec<(String, f32)> = state
            .users
            .iter()
            .enumerate()
            .filter(|(other, _)| *other != u)
            .map(|(other, id)| {
                let row = state.user_factors.row(other);
                let norm = row.dot(&row).sqrt();
                let cosine = if target_norm > 0.0 && norm > 0.0 {
                    target.dot(&row) / (target_norm * norm)
                } else {
                    0.0
                };
                (id.clone(), cosine)
            })
            .collect();

        similarities.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        similarities.truncate(top_k);
        similarities
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn interaction(user: &str, item: &str, weight: f32, source: InteractionSource) -> Interaction {
        Interaction {
            user_id: user.to_string(),
            destination_id: item.to_string(),
            weight,
            timestamp: Utc::now(),
            source,
        }
    }

    /// Longer training run than the production default so the tiny test
    /// sets converge reliably.
    fn test_config() -> CollaborativeConfig {
        CollaborativeConfig {
            learning_rate: 0.1,
            epochs: 200,
            ..CollaborativeConfig::default()
        }
    }

    fn training_set() -> Vec<Interaction> {
        let mut interactions = Vec::new();
        // Two taste clusters: users a* love d1/d2, users b* love d3/d4.
        for user in ["a1", "a2", "a3"] {
            interactions.push(interaction(user, "d1", 1.0, InteractionSource::ExplicitFeedback));
            interactions.push(interaction(user, "d2", 0.9, InteractionSource::ExplicitFeedback));
            interactions.push(interaction(user, "d3", 0.2, InteractionSource::ExplicitFeedback));
        }
        for user in ["b1", "b2", "b3"] {
            interactions.push(interaction(user, "d3", 1.0, InteractionSource::ExplicitFeedback));
            interactions.push(interaction(user, "d4", 0.9, InteractionSource::ExplicitFeedback));
            interactions.push(interaction(user, "d1", 0.2, InteractionSource::ExplicitFeedback));
        }
        interactions
    }

    #[test]
    fn test_untrained_predicts_neutral() {
        let model = CollaborativeModel::new(CollaborativeConfig::default());
        assert_eq!(model.predict("u1", "d1"), NEUTRAL_SCORE);
        assert!(model.recommend_for_user("u1", 5, &HashSet::new()).is_empty());
    }

    #[test]
    fn test_insufficient_interactions_skips_training() {
        let model = CollaborativeModel::new(CollaborativeConfig::default());
        let interactions: Vec<Interaction> = (0..5)
            .map(|i| {
                interaction(
                    &format!("u{i}"),
                    "d1",
                    0.8,
                    InteractionSource::ExplicitFeedback,
                )
            })
            .collect();

        let outcome = model.train(&interactions, Some(1));
        assert_eq!(
            outcome,
            CfTrainOutcome::SkippedInsufficientData {
                supplied: 5,
                required: 10
            }
        );
        assert!(!model.is_trained());
        assert_eq!(model.predict("u0", "d1"), NEUTRAL_SCORE);
    }

    #[test]
    fn test_unseen_ids_predict_exactly_neutral_after_training() {
        let model = CollaborativeModel::new(test_config());
        let outcome = model.train(&training_set(), Some(42));
        assert!(matches!(outcome, CfTrainOutcome::Trained { .. }));

        assert_eq!(model.predict("stranger", "d1"), NEUTRAL_SCORE);
        assert_eq!(model.predict("a1", "unknown_item"), NEUTRAL_SCORE);
        assert_eq!(model.predict("stranger", "unknown_item"), NEUTRAL_SCORE);
    }

    #[test]
    fn test_trained_predictions_in_unit_range_and_separate_clusters() {
        let model = CollaborativeModel::new(test_config());
        model.train(&training_set(), Some(42));

        let liked = model.predict("a1", "d1");
        let disliked = model.predict("a1", "d3");
        assert!((0.0..=1.0).contains(&liked));
        assert!((0.0..=1.0).contains(&disliked));
        assert!(
            liked > disliked,
            "expected liked item to outscore disliked: {liked} vs {disliked}"
        );
    }

    #[test]
    fn test_recommend_excludes_visited() {
        let model = CollaborativeModel::new(test_config());
        model.train(&training_set(), Some(42));

        let visited: HashSet<String> = ["d1".to_string()].into_iter().collect();
        let recommendations = model.recommend_for_user("a1", 10, &visited);
        assert!(!recommendations.is_empty());
        assert!(recommendations.iter().all(|c| c.item_id != "d1"));
    }

    #[test]
    fn test_implicit_visits_train_toward_pseudo_rating() {
        let model = CollaborativeModel::new(test_config());
        let interactions: Vec<Interaction> = (0..12)
            .map(|i| {
                interaction(
                    &format!("u{}", i % 4),
                    &format!("d{}", i % 3),
                    0.0, // weight is ignored for trip visits
                    InteractionSource::TripVisit,
                )
            })
            .collect();
        model.train(&interactions, Some(7));

        let predicted = model.predict("u0", "d0");
        assert!(
            (predicted - 0.8).abs() < 0.15,
            "visit-only training should settle near the implicit rating, got {predicted}"
        );
    }

    #[test]
    fn test_similar_users_cluster_together() {
        let model = CollaborativeModel::new(test_config());
        model.train(&training_set(), Some(42));

        let similar = model.similar_users("a1", 2);
        assert_eq!(similar.len(), 2);
        assert!(similar.iter().all(|(id, _)| id != "a1"));
        assert!(similar[0].1 >= similar[1].1);
        assert!(
            similar[0].0.starts_with('a'),
            "nearest neighbour of a1 should come from the same taste cluster: {similar:?}"
        );
    }
}
