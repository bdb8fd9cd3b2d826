use super::{AnalyticsLogger, DestinationStore};
use crate::models::{
    Destination, Feedback, Interaction, InteractionSource, RecommendationLog, StatedPreferences,
    TrainingLog, TripRecord, AdventureLevel, BudgetTier, TripType, IMPLICIT_VISIT_WEIGHT,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// In-memory store backing tests and local development.
///
/// Interactions are derived on read from the feedback and trip logs the
/// same way the production ingestion does: explicit ratings divided by 5,
/// trip visits at the fixed implicit weight.
#[derive(Default)]
pub struct InMemoryStore {
    destinations: RwLock<Vec<Destination>>,
    trips: RwLock<Vec<TripRecord>>,
    feedback: RwLock<Vec<Feedback>>,
    recommendation_logs: RwLock<Vec<RecommendationLog>>,
    training_logs: RwLock<Vec<TrainingLog>>,
    /// When set, catalog reads fail. Exercises the data-unavailable path.
    fail_catalog: AtomicBool,
    /// When set, per-user history reads fail. Exercises scorer isolation.
    fail_history: AtomicBool,
    /// When set, analytics writes fail. Exercises best-effort logging.
    fail_analytics: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_destinations(&self, destinations: Vec<Destination>) {
        self.destinations.write().await.extend(destinations);
    }

    pub async fn add_trip(&self, trip: TripRecord) {
        self.trips.write().await.push(trip);
    }

    pub async fn add_feedback(&self, feedback: Feedback) {
        self.feedback.write().await.push(feedback);
    }

    pub fn set_fail_catalog(&self, fail: bool) {
        self.fail_catalog.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_analytics(&self, fail: bool) {
        self.fail_analytics.store(fail, Ordering::SeqCst);
    }

    pub async fn recommendation_logs(&self) -> Vec<RecommendationLog> {
        self.recommendation_logs.read().await.clone()
    }

    pub async fn training_logs(&self) -> Vec<TrainingLog> {
        self.training_logs.read().await.clone()
    }

    /// Populate the store with deterministic synthetic users, trips, and
    /// feedback for exercising the models without real traffic.
    pub async fn populate_synthetic(&self, seed: u64, num_users: usize, num_feedback: usize) {
        let mut rng = StdRng::seed_from_u64(seed);
        let catalog = self.destinations.read().await.clone();
        if catalog.is_empty() {
            return;
        }

        let budgets = [BudgetTier::Low, BudgetTier::Medium, BudgetTier::High];
        let trip_types = [
            TripType::Relaxation,
            TripType::Adventure,
            TripType::Cultural,
            TripType::Culinary,
        ];
        let adventure = [
            AdventureLevel::Low,
            AdventureLevel::Medium,
            AdventureLevel::High,
        ];

        let now = Utc::now();
        for i in 0..num_feedback {
            let user = format!("synthetic_user_{}", i % num_users.max(1));
            let destination = &catalog[rng.gen_range(0..catalog.len())];
            let rating = rng.gen_range(1..=5) as f32;
            let age = Duration::hours(rng.gen_range(0..24 * 30));
            self.add_feedback(Feedback {
                user_id: user,
                destination_id: destination.id.clone(),
                rating,
                timestamp: now - age,
                stated_preferences: Some(StatedPreferences {
                    month: rng.gen_range(1..=12),
                    budget: budgets[rng.gen_range(0..budgets.len())],
                    trip_type: trip_types[rng.gen_range(0..trip_types.len())],
                    adventure: adventure[rng.gen_range(0..adventure.len())],
                    eco_friendly: rng.gen_bool(0.5),
                }),
            })
            .await;
        }

        for i in 0..num_users {
            let user = format!("synthetic_user_{i}");
            let count = rng.gen_range(1..=3);
            let destinations = (0..count)
                .map(|_| catalog[rng.gen_range(0..catalog.len())].clone())
                .collect();
            let age = Duration::hours(rng.gen_range(0..24 * 60));
            self.add_trip(TripRecord {
                user_id: user,
                destinations,
                created_at: now - age,
            })
            .await;
        }
    }
}

#[async_trait]
impl DestinationStore for InMemoryStore {
    async fn destinations(&self) -> Result<Vec<Destination>> {
        if self.fail_catalog.load(Ordering::SeqCst) {
            bail!("destination catalog unreachable");
        }
        Ok(self.destinations.read().await.clone())
    }

    async fn interactions(&self) -> Result<Vec<Interaction>> {
        let mut interactions = Vec::new();
        for f in self.feedback.read().await.iter() {
            interactions.push(Interaction {
                user_id: f.user_id.clone(),
                destination_id: f.destination_id.clone(),
                weight: (f.rating / 5.0).clamp(0.0, 1.0),
                timestamp: f.timestamp,
                source: InteractionSource::ExplicitFeedback,
            });
        }
        for trip in self.trips.read().await.iter() {
            for destination in &trip.destinations {
                interactions.push(Interaction {
                    user_id: trip.user_id.clone(),
                    destination_id: destination.id.clone(),
                    weight: IMPLICIT_VISIT_WEIGHT,
                    timestamp: trip.created_at,
                    source: InteractionSource::TripVisit,
                });
            }
        }
        Ok(interactions)
    }

    async fn trips_for_user(&self, user_id: &str) -> Result<Vec<TripRecord>> {
        if self.fail_history.load(Ordering::SeqCst) {
            bail!("history store unreachable");
        }
        let mut trips: Vec<TripRecord> = self
            .trips
            .read()
            .await
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trips)
    }

    async fn feedback_for_user(&self, user_id: &str) -> Result<Vec<Feedback>> {
        if self.fail_history.load(Ordering::SeqCst) {
            bail!("history store unreachable");
        }
        let mut feedback: Vec<Feedback> = self
            .feedback
            .read()
            .await
            .iter()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        feedback.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(feedback)
    }

    async fn all_feedback(&self) -> Result<Vec<Feedback>> {
        Ok(self.feedback.read().await.clone())
    }

    async fn all_trips(&self) -> Result<Vec<TripRecord>> {
        Ok(self.trips.read().await.clone())
    }

    async fn recent_feedback(&self, since: DateTime<Utc>) -> Result<Vec<Feedback>> {
        Ok(self
            .feedback
            .read()
            .await
            .iter()
            .filter(|f| f.timestamp >= since)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AnalyticsLogger for InMemoryStore {
    async fn log_recommendations(&self, entry: RecommendationLog) -> Result<()> {
        if self.fail_analytics.load(Ordering::SeqCst) {
            bail!("analytics sink unreachable");
        }
        self.recommendation_logs.write().await.push(entry);
        Ok(())
    }

    async fn log_training_session(&self, entry: TrainingLog) -> Result<()> {
        if self.fail_analytics.load(Ordering::SeqCst) {
            bail!("analytics sink unreachable");
        }
        self.training_logs.write().await.push(entry);
        Ok(())
    }
}
