//! Model training orchestration.
//!
//! Retrains all three models from the full interaction log. Runs are
//! exclusive: a compare-and-swap flag rejects overlapping requests with an
//! explicit outcome instead of queueing them. An optional background task
//! polls on a fixed interval and retrains when enough fresh feedback has
//! accumulated.

use crate::config::TrainingConfig;
use crate::models::TrainingLog;
use crate::services::collaborative::{self, CfTrainOutcome, CollaborativeModel};
use crate::services::content_based::{self, ContentBasedModel};
use crate::services::preference::{self, PrefExample, PreferenceModel, PrefTrainOutcome};
use crate::store::{AnalyticsLogger, DestinationStore};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Result of a training request.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    Completed(TrainingReport),
    /// Another training run holds the exclusive flag; this request was
    /// rejected, not queued.
    AlreadyTraining,
}

/// What a completed run actually did.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub collaborative: CfTrainOutcome,
    pub preference: PrefTrainOutcome,
    pub profiles_rebuilt: usize,
    pub data_quality: f32,
}

pub struct TrainingService {
    config: TrainingConfig,
    collaborative: Arc<CollaborativeModel>,
    content: Arc<ContentBasedModel>,
    preference: Arc<PreferenceModel>,
    store: Arc<dyn DestinationStore>,
    analytics: Arc<dyn AnalyticsLogger>,
    is_training: AtomicBool,
    last_trained: RwLock<Option<DateTime<Utc>>>,
}

impl TrainingService {
    pub fn new(
        config: TrainingConfig,
        collaborative: Arc<CollaborativeModel>,
        content: Arc<ContentBasedModel>,
        preference: Arc<PreferenceModel>,
        store: Arc<dyn DestinationStore>,
        analytics: Arc<dyn AnalyticsLogger>,
    ) -> Self {
        Self {
            config,
            collaborative,
            content,
            preference,
            store,
            analytics,
            is_training: AtomicBool::new(false),
            last_trained: RwLock::new(None),
        }
    }

    pub fn is_training(&self) -> bool {
        self.is_training.load(Ordering::SeqCst)
    }

    pub fn last_trained(&self) -> Option<DateTime<Utc>> {
        *self.last_trained.read().expect("last_trained lock poisoned")
    }

    /// Whether the auto-training threshold is currently met: at least the
    /// configured minimum interval since the last run, and enough fresh
    /// feedback inside the window. Store errors read as "not yet".
    pub async fn should_retrain(&self) -> bool {
        if let Some(last) = self.last_trained() {
            let min_interval = ChronoDuration::from_std(self.config.min_retrain_interval)
                .unwrap_or_else(|_| ChronoDuration::hours(24));
            if Utc::now() - last < min_interval {
                return false;
            }
        }

        let window = ChronoDuration::from_std(self.config.feedback_window)
            .unwrap_or_else(|_| ChronoDuration::hours(24));
        match self.store.recent_feedback(Utc::now() - window).await {
            Ok(recent) => recent.len() >= self.config.feedback_threshold,
            Err(error) => {
                warn!(%error, "retrain check failed, skipping");
                false
            }
        }
    }

    /// Retrain every model from the full stored history.
    ///
    /// Exactly one run may be active; concurrent calls get
    /// [`TrainingOutcome::AlreadyTraining`] back immediately.
    pub async fn train_all(&self) -> anyhow::Result<TrainingOutcome> {
        if self
            .is_training
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("training already in progress, rejecting");
            return Ok(TrainingOutcome::AlreadyTraining);
        }

        let result = self.run_training().await;
        self.is_training.store(false, Ordering::SeqCst);

        let report = result?;
        *self.last_trained.write().expect("last_trained lock poisoned") = Some(Utc::now());
        Ok(TrainingOutcome::Completed(report))
    }

    async fn run_training(&self) -> anyhow::Result<TrainingReport> {
        info!("starting full model training");

        let (interactions, feedback, trips) = tokio::join!(
            self.store.interactions(),
            self.store.all_feedback(),
            self.store.all_trips(),
        );
        let interactions = interactions?;
        let feedback = feedback?;
        let trips = trips?;

        let collaborative = self.collaborative.train(&interactions, None);

        let examples: Vec<PrefExample> = feedback
            .iter()
            .filter_map(PrefExample::from_feedback)
            .collect();
        let preference = self.preference.train(&examples);

        // Rebuild content profiles for every user with any history.
        let users: HashSet<&str> = feedback
            .iter()
            .map(|f| f.user_id.as_str())
            .chain(trips.iter().map(|t| t.user_id.as_str()))
            .collect();

        let rebuilds = futures::future::join_all(
            users
                .iter()
                .map(|user_id| self.content.build_user_profile(&*self.store, user_id)),
        )
        .await;

        let mut profiles_rebuilt = 0usize;
        for (user_id, outcome) in users.iter().zip(rebuilds) {
            match outcome {
                Ok(Some(_)) => profiles_rebuilt += 1,
                Ok(None) => {}
                Err(error) => warn!(user_id, %error, "profile rebuild failed"),
            }
        }

        let data_quality = assess_data_quality(&feedback, &trips);
        let report = TrainingReport {
            collaborative,
            preference,
            profiles_rebuilt,
            data_quality,
        };

        let log = TrainingLog {
            timestamp: Utc::now(),
            models: vec![
                collaborative::SOURCE.to_string(),
                content_based::SOURCE.to_string(),
                preference::SOURCE.to_string(),
            ],
            interaction_count: interactions.len(),
            feedback_count: feedback.len(),
            data_quality,
        };
        if let Err(error) = self.analytics.log_training_session(log).await {
            warn!(%error, "training log write failed");
        }

        info!(
            interactions = interactions.len(),
            feedback = feedback.len(),
            profiles_rebuilt,
            data_quality,
            "model training finished"
        );
        Ok(report)
    }

    /// Spawn the auto-training loop: poll on the configured interval,
    /// retrain when [`should_retrain`](Self::should_retrain) says so.
    /// Dropping the handle aborts the loop.
    pub fn spawn_auto_training(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let poll = service.config.poll_interval;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + poll;
            let mut ticker = tokio::time::interval_at(start, poll);
            loop {
                ticker.tick().await;
                if service.should_retrain().await {
                    info!("auto-training triggered");
                    if let Err(error) = service.train_all().await {
                        warn!(%error, "auto-training run failed");
                    }
                }
            }
        })
    }
}

/// Weighted data-quality estimate in [0, 1]: feedback validity (0.4),
/// trip validity (0.3), and user diversity (0.3, full credit at 10
/// distinct users, half at 5).
fn assess_data_quality(
    feedback: &[crate::models::Feedback],
    trips: &[crate::models::TripRecord],
) -> f32 {
    let mut quality = 0.0f32;
    let mut factors = 0.0f32;

    if !feedback.is_empty() {
        let valid = feedback
            .iter()
            .filter(|f| (1.0..=5.0).contains(&f.rating) && !f.user_id.is_empty())
            .count();
        quality += (valid as f32 / feedback.len() as f32) * 0.4;
        factors += 0.4;
    }

    if !trips.is_empty() {
        let valid = trips
            .iter()
            .filter(|t| !t.user_id.is_empty() && !t.destinations.is_empty())
            .count();
        quality += (valid as f32 / trips.len() as f32) * 0.3;
        factors += 0.3;
    }

    let mut users: HashSet<&str> = HashSet::new();
    users.extend(feedback.iter().map(|f| f.user_id.as_str()));
    users.extend(trips.iter().map(|t| t.user_id.as_str()));
    if users.len() >= 10 {
        quality += 0.3;
    } else if users.len() >= 5 {
        quality += 0.15;
    }
    factors += 0.3;

    if factors > 0.0 {
        quality / factors
    } else {
        0.0
    }
}
