//! Deep preference model.
//!
//! A small multilayer perceptron (7 inputs, two hidden layers, 3 sigmoid
//! outputs) trained on the preferences users stated when rating trips.
//! The three outputs estimate type, adventure, and eco affinity. The model
//! stays untrained until enough labelled examples exist; an untrained
//! model predicts nothing and callers fall back to the other scorers.

use crate::config::PreferenceConfig;
use crate::models::{Feedback, StatedPreferences};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::RwLock;
use tracing::{debug, info};

/// Provenance tag for scores produced by this model.
pub const SOURCE: &str = "deep_learning";

/// Input dimensions: month, budget index, trip-type index, adventure
/// index, eco flag, average past rating / 5, and one reserved slot fixed
/// at zero.
pub const INPUT_SIZE: usize = 7;

/// Output dimensions: type affinity, adventure affinity, eco affinity.
pub const OUTPUT_SIZE: usize = 3;

/// Outcome of a training attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefTrainOutcome {
    Trained { examples: usize },
    SkippedInsufficientData { supplied: usize, required: usize },
}

/// One labelled training example.
#[derive(Debug, Clone)]
pub struct PrefExample {
    pub input: [f32; INPUT_SIZE],
    pub target: [f32; OUTPUT_SIZE],
}

impl PrefExample {
    /// Build an example from feedback carrying stated preferences. The
    /// label is the normalized (type, adventure, eco) triple the user
    /// declared; feedback without stated preferences yields nothing.
    pub fn from_feedback(feedback: &Feedback) -> Option<Self> {
        let stated = feedback.stated_preferences.as_ref()?;
        let input = encode_input(stated, feedback.rating);
        let target = [
            stated.trip_type.index() as f32 / 3.0,
            stated.adventure.index() as f32 / 2.0,
            if stated.eco_friendly { 1.0 } else { 0.0 },
        ];
        Some(Self { input, target })
    }
}

/// Context vector for a stated preference set. `avg_rating` is the user's
/// recent average on the 1–5 scale.
pub fn encode_input(stated: &StatedPreferences, avg_rating: f32) -> [f32; INPUT_SIZE] {
    [
        stated.month as f32,
        stated.budget.index() as f32,
        stated.trip_type.index() as f32,
        stated.adventure.index() as f32,
        if stated.eco_friendly { 1.0 } else { 0.0 },
        avg_rating / 5.0,
        0.0,
    ]
}

struct MlpState {
    w1: Array2<f32>,
    b1: Array1<f32>,
    w2: Array2<f32>,
    b2: Array1<f32>,
    w3: Array2<f32>,
    b3: Array1<f32>,
    examples_seen: usize,
}

impl MlpState {
    fn forward(&self, input: &Array1<f32>) -> Array1<f32> {
        let h1 = (self.w1.dot(input) + &self.b1).mapv(relu);
        let h2 = (self.w2.dot(&h1) + &self.b2).mapv(relu);
        (self.w3.dot(&h2) + &self.b3).mapv(sigmoid)
    }
}

fn relu(x: f32) -> f32 {
    x.max(0.0)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// The preference MLP. Prediction reads an immutable snapshot; training
/// swaps the whole snapshot in one write.
pub struct PreferenceModel {
    config: PreferenceConfig,
    state: RwLock<Option<MlpState>>,
}

impl PreferenceModel {
    pub fn new(config: PreferenceConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.state.read().expect("mlp state lock poisoned").is_some()
    }

    /// Predicted [type, adventure, eco] affinities, or `None` when the
    /// model has not been trained.
    pub fn predict(&self, input: &[f32; INPUT_SIZE]) -> Option<[f32; OUTPUT_SIZE]> {
        let guard = self.state.read().expect("mlp state lock poisoned");
        let state = guard.as_ref()?;
        let output = state.forward(&Array1::from_vec(input.to_vec()));
        let mut result = [0.0; OUTPUT_SIZE];
        for (slot, value) in result.iter_mut().zip(output.iter()) {
            *slot = *value;
        }
        Some(result)
    }

    /// Train on labelled examples with minibatch gradient descent.
    ///
    /// Too few examples skips training entirely and leaves any previous
    /// snapshot in place.
    pub fn train(&self, examples: &[PrefExample]) -> PrefTrainOutcome {
        if examples.len() < self.config.min_examples {
            debug!(
                supplied = examples.len(),
                required = self.config.min_examples,
                "skipping preference training"
            );
            return PrefTrainOutcome::SkippedInsufficientData {
                supplied: examples.len(),
                required: self.config.min_examples,
            };
        }

        let (h1, h2) = self.config.hidden_units;
        let mut rng = StdRng::seed_from_u64(examples.len() as u64);
        let mut state = MlpState {
            w1: init_weights(h1, INPUT_SIZE, &mut rng),
            b1: Array1::zeros(h1),
            w2: init_weights(h2, h1, &mut rng),
            b2: Array1::zeros(h2),
            w3: init_weights(OUTPUT_SIZE, h2, &mut rng),
            b3: Array1::zeros(OUTPUT_SIZE),
            examples_seen: examples.len(),
        };

        let lr = self.config.learning_rate;
        let mut order: Vec<usize> = (0..examples.len()).collect();

        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0f32;

            for batch in order.chunks(self.config.batch_size) {
                let mut grad_w1: Array2<f32> = Array2::zeros(state.w1.raw_dim());
                let mut grad_b1: Array1<f32> = Array1::zeros(state.b1.raw_dim());
                let mut grad_w2: Array2<f32> = Array2::zeros(state.w2.raw_dim());
                let mut grad_b2: Array1<f32> = Array1::zeros(state.b2.raw_dim());
                let mut grad_w3: Array2<f32> = Array2::zeros(state.w3.raw_dim());
                let mut grad_b3: Array1<f32> = Array1::zeros(state.b3.raw_dim());

                for &index in batch {
                    let example = &examples[index];
                    let input = Array1::from_vec(example.input.to_vec());
                    let target = Array1::from_vec(example.target.to_vec());

                    let z1 = state.w1.dot(&input) + &state.b1;
                    let a1 = z1.mapv(relu);
                    let z2 = state.w2.dot(&a1) + &state.b2;
                    let a2 = z2.mapv(relu);
                    let z3 = state.w3.dot(&a2) + &state.b3;
                    let output = z3.mapv(sigmoid);

                    let error = &output - &target;
                    epoch_loss += error.mapv(|e| e * e).sum();

                    // Squared-error loss through the sigmoid output.
                    let delta3 = &error * &output.mapv(|o| o * (1.0 - o));
                    grad_w3 += &outer(&delta3, &a2);
                    grad_b3 += &delta3;

                    let delta2 = state.w3.t().dot(&delta3)
                        * z2.mapv(|z| if z > 0.0 { 1.0 } else { 0.0 });
                    grad_w2 += &outer(&delta2, &a1);
                    grad_b2 += &delta2;

                    let delta1 = state.w2.t().dot(&delta2)
                        * z1.mapv(|z| if z > 0.0 { 1.0 } else { 0.0 });
                    grad_w1 += &outer(&delta1, &input);
                    grad_b1 += &delta1;
                }

                let scale = lr / batch.len() as f32;
                state.w1 -= &(grad_w1 * scale);
                state.b1 -= &(grad_b1 * scale);
                state.w2 -= &(grad_w2 * scale);
                state.b2 -= &(grad_b2 * scale);
                state.w3 -= &(grad_w3 * scale);
                state.b3 -= &(grad_b3 * scale);
            }

            if epoch % 20 == 0 {
                debug!(epoch, loss = epoch_loss / examples.len() as f32, "mlp epoch");
            }
        }

        info!(examples = examples.len(), "preference model trained");
        *self.state.write().expect("mlp state lock poisoned") = Some(state);
        PrefTrainOutcome::Trained {
            examples: examples.len(),
        }
    }

    /// Number of examples the current snapshot was trained on.
    pub fn examples_seen(&self) -> usize {
        self.state
            .read()
            .expect("mlp state lock poisoned")
            .as_ref()
            .map(|s| s.examples_seen)
            .unwrap_or(0)
    }
}

fn init_weights(rows: usize, cols: usize, rng: &mut StdRng) -> Array2<f32> {
    // He-style scaling keeps the small net from saturating early.
    let bound = (2.0 / cols as f32).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-bound..bound))
}

fn outer(column: &Array1<f32>, row: &Array1<f32>) -> Array2<f32> {
    let col = column.view().insert_axis(Axis(1));
    let row = row.view().insert_axis(Axis(0));
    col.dot(&row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AdventureLevel, BudgetTier, TripType};

    fn test_config() -> PreferenceConfig {
        // Small fixtures need a hotter schedule than production data.
        PreferenceConfig {
            learning_rate: 0.05,
            epochs: 300,
            ..PreferenceConfig::default()
        }
    }

    fn stated(month: u32, trip_type: TripType, adventure: AdventureLevel) -> StatedPreferences {
        StatedPreferences {
            month,
            budget: BudgetTier::Medium,
            trip_type,
            adventure,
            eco_friendly: false,
        }
    }

    fn examples(count: usize) -> Vec<PrefExample> {
        // Alternate adventurous and relaxed raters so the net has a
        // learnable signal on the adventure output.
        (0..count)
            .map(|i| {
                let feedback = if i % 2 == 0 {
                    Feedback {
                        user_id: format!("u{i}"),
                        destination_id: "d1".to_string(),
                        rating: 5.0,
                        stated_preferences: Some(stated(
                            7,
                            TripType::Adventure,
                            AdventureLevel::High,
                        )),
                        timestamp: chrono::Utc::now(),
                    }
                } else {
                    Feedback {
                        user_id: format!("u{i}"),
                        destination_id: "d2".to_string(),
                        rating: 4.0,
                        stated_preferences: Some(stated(
                            1,
                            TripType::Relaxation,
                            AdventureLevel::Low,
                        )),
                        timestamp: chrono::Utc::now(),
                    }
                };
                PrefExample::from_feedback(&feedback).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_untrained_model_predicts_nothing() {
        let model = PreferenceModel::new(PreferenceConfig::default());
        assert!(!model.is_trained());
        assert!(model.predict(&[0.5; INPUT_SIZE]).is_none());
    }

    #[test]
    fn test_insufficient_examples_skip_training() {
        let model = PreferenceModel::new(PreferenceConfig::default());
        let outcome = model.train(&examples(3));
        assert_eq!(
            outcome,
            PrefTrainOutcome::SkippedInsufficientData {
                supplied: 3,
                required: PreferenceConfig::default().min_examples,
            }
        );
        assert!(!model.is_trained());
    }

    #[test]
    fn test_feedback_without_stated_preferences_yields_no_example() {
        let feedback = Feedback {
            user_id: "u1".to_string(),
            destination_id: "d1".to_string(),
            rating: 4.0,
            stated_preferences: None,
            timestamp: chrono::Utc::now(),
        };
        assert!(PrefExample::from_feedback(&feedback).is_none());
    }

    #[test]
    fn test_predictions_stay_in_unit_range() {
        let model = PreferenceModel::new(test_config());
        assert!(matches!(
            model.train(&examples(40)),
            PrefTrainOutcome::Trained { examples: 40 }
        ));

        for input in [[0.0; INPUT_SIZE], [1.0; INPUT_SIZE], [0.5; INPUT_SIZE]] {
            let output = model.predict(&input).unwrap();
            for value in output {
                assert!((0.0..=1.0).contains(&value));
            }
        }
    }

    #[test]
    fn test_learns_adventure_signal() {
        let model = PreferenceModel::new(test_config());
        model.train(&examples(40));

        let adventurous = encode_input(
            &stated(7, TripType::Adventure, AdventureLevel::High),
            5.0,
        );
        let relaxed = encode_input(&stated(1, TripType::Relaxation, AdventureLevel::Low), 4.0);

        let adventurous_out = model.predict(&adventurous).unwrap();
        let relaxed_out = model.predict(&relaxed).unwrap();

        // Adventure leaning (slot 1) should separate the two inputs.
        assert!(adventurous_out[1] > relaxed_out[1]);
    }

    #[test]
    fn test_retraining_replaces_snapshot() {
        let model = PreferenceModel::new(test_config());
        model.train(&examples(10));
        assert_eq!(model.examples_seen(), 10);
        model.train(&examples(20));
        assert_eq!(model.examples_seen(), 20);
    }
}
