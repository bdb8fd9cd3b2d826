//! Hybrid destination recommendation engine for the VietVoyage trip
//! planner.
//!
//! Three scorers feed one combiner: collaborative filtering over the
//! interaction log, content-based matching against per-user preference
//! profiles, and a small deep model over stated trip preferences. The
//! [`services::HybridEngine`] merges their weighted scores, applies
//! diversity and novelty bonuses, and returns a ranked, explained top-K
//! list. [`services::TrainingService`] retrains all three models from
//! stored history, on demand or on a background schedule.

pub mod config;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::EngineConfig;
pub use services::{HybridEngine, RecommendError, TrainingOutcome, TrainingService};
pub use store::{AnalyticsLogger, DestinationStore, InMemoryStore};
