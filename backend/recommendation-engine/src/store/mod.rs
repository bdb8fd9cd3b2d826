//! Data-access boundaries for the recommendation engine.
//!
//! The engine never talks to a concrete backend. Persistence (Firestore in
//! the production deployment) sits behind [`DestinationStore`], and the
//! analytics sink behind [`AnalyticsLogger`]. Implement these traits to
//! integrate with your existing storage infrastructure; the bundled
//! [`InMemoryStore`] backs the tests and local development.

mod memory;

pub use memory::InMemoryStore;

use crate::models::{
    Destination, Feedback, Interaction, RecommendationLog, TrainingLog, TripRecord,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read access to the destination catalog and user history.
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// The full destination catalog, in stable catalog order.
    async fn destinations(&self) -> Result<Vec<Destination>>;

    /// The complete interaction log (explicit feedback plus trip visits),
    /// normalized to [0, 1] weights.
    async fn interactions(&self) -> Result<Vec<Interaction>>;

    /// All trips recorded for one user, most recent first.
    async fn trips_for_user(&self, user_id: &str) -> Result<Vec<TripRecord>>;

    /// All explicit feedback for one user, most recent first.
    async fn feedback_for_user(&self, user_id: &str) -> Result<Vec<Feedback>>;

    /// Every feedback row (deep-model training set and data-quality stats).
    async fn all_feedback(&self) -> Result<Vec<Feedback>>;

    /// Every trip (data-quality stats).
    async fn all_trips(&self) -> Result<Vec<TripRecord>>;

    /// Feedback recorded at or after `since` (retrain gate).
    async fn recent_feedback(&self, since: DateTime<Utc>) -> Result<Vec<Feedback>>;
}

/// Write-only, best-effort analytics sink. Failures are logged and
/// swallowed by the engine; they never block a response.
#[async_trait]
pub trait AnalyticsLogger: Send + Sync {
    async fn log_recommendations(&self, entry: RecommendationLog) -> Result<()>;

    async fn log_training_session(&self, entry: TrainingLog) -> Result<()>;
}
