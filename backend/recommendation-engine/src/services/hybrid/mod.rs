//! Hybrid combiner, the engine's only caller-facing surface.
//!
//! Each request fans out to the collaborative, content-based, and deep
//! scorers, merges their weighted scores per destination, applies optional
//! diversity and novelty bonuses, reranks, and logs the result for later
//! training. A failing scorer contributes nothing; only an unreachable or
//! empty catalog aborts the request.

use crate::config::{EngineConfig, SourceWeights};
use crate::models::{
    Destination, LoggedRecommendation, Provenance, Recommendation, RecommendationLog,
    RecommendOptions, Season, StatedPreferences, TravelPreferences, UserContext,
};
use crate::services::collaborative::CollaborativeModel;
use crate::services::content_based::ContentBasedModel;
use crate::services::diversity;
use crate::services::novelty::VisitHistory;
use crate::services::preference::{self, PreferenceModel};
use crate::store::{AnalyticsLogger, DestinationStore};
use crate::utils::mean_rating;
use chrono::{Datelike, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Cap on how many candidates each sub-scorer is asked for.
const SCORER_FANOUT_CAP: usize = 20;

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("destination catalog unavailable")]
    CatalogUnavailable(#[source] anyhow::Error),
    #[error("destination catalog is empty")]
    EmptyCatalog,
}

pub type Result<T> = std::result::Result<T, RecommendError>;

/// Running merge state for one candidate destination.
struct MergeEntry {
    destination: Destination,
    score: f32,
    reasons: Vec<String>,
    sources: Provenance,
}

pub struct HybridEngine {
    config: EngineConfig,
    weights: RwLock<SourceWeights>,
    collaborative: Arc<CollaborativeModel>,
    content: Arc<ContentBasedModel>,
    preference: Arc<PreferenceModel>,
    store: Arc<dyn DestinationStore>,
    analytics: Arc<dyn AnalyticsLogger>,
}

impl HybridEngine {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn DestinationStore>,
        analytics: Arc<dyn AnalyticsLogger>,
    ) -> Self {
        Self {
            weights: RwLock::new(config.source_weights),
            collaborative: Arc::new(CollaborativeModel::new(config.collaborative.clone())),
            content: Arc::new(ContentBasedModel::new(config.content.clone())),
            preference: Arc::new(PreferenceModel::new(config.preference.clone())),
            config,
            store,
            analytics,
        }
    }

    pub fn collaborative(&self) -> &Arc<CollaborativeModel> {
        &self.collaborative
    }

    pub fn content_based(&self) -> &Arc<ContentBasedModel> {
        &self.content
    }

    pub fn preference(&self) -> &Arc<PreferenceModel> {
        &self.preference
    }

    pub fn store(&self) -> &Arc<dyn DestinationStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source_weights(&self) -> SourceWeights {
        *self.weights.read().expect("weights lock poisoned")
    }

    /// Recent history plus calendar context for a user. History fetch
    /// failures degrade to empty history rather than failing the request.
    pub async fn user_context(&self, user_id: &str) -> UserContext {
        let (trips, feedback) = tokio::join!(
            self.store.trips_for_user(user_id),
            self.store.feedback_for_user(user_id),
        );

        let mut recent_trips = trips.unwrap_or_else(|error| {
            warn!(user_id, %error, "trip history fetch failed, assuming none");
            Vec::new()
        });
        recent_trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent_trips.truncate(self.config.recent_trips);

        let mut recent_feedback = feedback.unwrap_or_else(|error| {
            warn!(user_id, %error, "feedback fetch failed, assuming none");
            Vec::new()
        });
        recent_feedback.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent_feedback.truncate(self.config.recent_feedback);

        let current_month = Utc::now().month();
        UserContext {
            recent_trips,
            recent_feedback,
            current_month,
            season: Season::from_month(current_month),
        }
    }

    /// Generate the top-K ranked recommendations for a user.
    #[instrument(skip(self, preferences, options))]
    pub async fn generate_recommendations(
        &self,
        user_id: &str,
        preferences: &TravelPreferences,
        options: &RecommendOptions,
    ) -> Result<Vec<Recommendation>> {
        let context = self.user_context(user_id).await;
        let history = VisitHistory::build(&context.recent_trips, &context.recent_feedback);

        let catalog = self
            .store
            .destinations()
            .await
            .map_err(RecommendError::CatalogUnavailable)?;
        if catalog.is_empty() {
            return Err(RecommendError::EmptyCatalog);
        }

        let candidates = self.filter_candidates(catalog, preferences, options, &history);
        if candidates.is_empty() {
            debug!(user_id, "no candidates left after filtering");
            return Ok(Vec::new());
        }

        let month = preferences.month.unwrap_or(context.current_month);
        let fanout = (options.top_k * 2).min(SCORER_FANOUT_CAP);
        let weights = self.source_weights();

        // Catalog order is the documented tie-break: every candidate is
        // seeded at zero so fully neutral scorers still yield a stable,
        // complete list.
        let order: Vec<String> = candidates.iter().map(|d| d.id.clone()).collect();
        let mut merged: HashMap<String, MergeEntry> = candidates
            .iter()
            .map(|destination| {
                (
                    destination.id.clone(),
                    MergeEntry {
                        destination: destination.clone(),
                        score: 0.0,
                        reasons: Vec::new(),
                        sources: Provenance::default(),
                    },
                )
            })
            .collect();

        let mut scorers_errored = 0usize;
        let mut any_contribution = false;

        // Collaborative contribution. Inference never errors; an untrained
        // model simply returns no candidates.
        let cf_candidates =
            self.collaborative
                .recommend_for_user(user_id, fanout, history.visited_ids());
        for candidate in &cf_candidates {
            if let Some(entry) = merged.get_mut(&candidate.item_id) {
                entry.score += weights.collaborative * candidate.predicted;
                entry.sources.collaborative = true;
                entry
                    .reasons
                    .push("travellers similar to you liked this".to_string());
                any_contribution = true;
            }
        }

        // Content-based contribution. Store reads can fail here; the
        // scorer then contributes nothing.
        match self
            .content
            .recommend_for_user(&*self.store, user_id, &candidates, fanout, month)
            .await
        {
            Ok(cb_candidates) => {
                for candidate in cb_candidates {
                    if let Some(entry) = merged.get_mut(&candidate.destination_id) {
                        entry.score += weights.content_based * candidate.similarity;
                        entry.sources.content_based = true;
                        entry.reasons.push(
                            candidate
                                .explanation
                                .unwrap_or_else(|| "matches your travel profile".to_string()),
                        );
                        any_contribution = true;
                    }
                }
            }
            Err(error) => {
                warn!(user_id, %error, "content-based scoring failed");
                scorers_errored += 1;
            }
        }

        // Deep contribution. The context vector is request-level, so the
        // blended output applies uniformly to the first `fanout`
        // candidates; an untrained model predicts nothing.
        if let Some(outputs) = self.deep_outputs(&context, preferences) {
            let blend = &self.config.deep_blend;
            let blended =
                outputs[0] * blend.trip_type + outputs[1] * blend.adventure + outputs[2] * blend.eco;
            for id in order.iter().take(fanout) {
                if let Some(entry) = merged.get_mut(id) {
                    entry.score += weights.deep_learning * blended;
                    entry.sources.deep_learning = true;
                    entry
                        .reasons
                        .push("predicted to fit your stated preferences".to_string());
                    any_contribution = true;
                }
            }
        }

        // A scorer failure with nothing contributed anywhere is a dead
        // request. Mere neutrality (untrained models, no profile) is not:
        // that still yields the catalog-ordered zero-score list.
        if scorers_errored > 0 && !any_contribution {
            warn!(user_id, "scorers failed with no contributions, returning empty list");
            return Ok(Vec::new());
        }

        // Assemble in catalog order, attaching bonuses. Confidence is
        // normalized from the merged score before any bonus.
        let mut results: Vec<Recommendation> = Vec::with_capacity(order.len());
        for id in &order {
            let Some(entry) = merged.remove(id) else {
                continue;
            };
            let mut final_score = entry.score;

            if options.diversity_boost {
                let mut accepted = results.clone();
                accepted.push(Recommendation {
                    destination: entry.destination.clone(),
                    score: entry.score,
                    confidence: 0.0,
                    explanation: None,
                    sources: entry.sources,
                });
                final_score += diversity::set_diversity(&accepted) * self.config.diversity_weight;
            }

            if options.novelty_boost {
                final_score +=
                    history.novelty_bonus(&entry.destination) * self.config.novelty_weight;
            }

            let confidence = (entry.score / weights.collaborative).min(1.0);
            results.push(Recommendation {
                destination: entry.destination,
                score: final_score,
                confidence,
                explanation: if options.include_explanations && !entry.reasons.is_empty() {
                    Some(entry.reasons.join(", "))
                } else {
                    None
                },
                sources: entry.sources,
            });
        }

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let final_list = if options.diversity_boost && results.len() > options.top_k {
            diversity::rerank_diverse(results, options.top_k)
        } else {
            results.truncate(options.top_k);
            results
        };

        self.spawn_analytics_log(user_id, &final_list, preferences);

        info!(
            user_id,
            returned = final_list.len(),
            season = context.season.as_str(),
            "generated hybrid recommendations"
        );
        Ok(final_list)
    }

    /// Renormalize the source weights proportionally to accuracy signals.
    /// Negative components and non-positive totals are rejected: a negative
    /// weight would flip that source's score contributions and break the
    /// confidence normalization.
    pub fn update_weights(&self, collaborative: f32, content_based: f32, deep_learning: f32) {
        if collaborative < 0.0 || content_based < 0.0 || deep_learning < 0.0 {
            warn!("ignoring weight update with negative component");
            return;
        }
        let total = collaborative + content_based + deep_learning;
        if !(total > 0.0) {
            warn!("ignoring weight update with non-positive total");
            return;
        }
        let mut weights = self.weights.write().expect("weights lock poisoned");
        weights.collaborative = collaborative / total;
        weights.content_based = content_based / total;
        weights.deep_learning = deep_learning / total;
        info!(
            collaborative = weights.collaborative,
            content_based = weights.content_based,
            deep_learning = weights.deep_learning,
            "source weights updated"
        );
    }

    /// One-sentence rendering of a recommendation's provenance and reasons.
    pub fn explain_recommendation(&self, recommendation: &Recommendation) -> String {
        let mut sources: Vec<&str> = Vec::new();
        if recommendation.sources.collaborative {
            sources.push("similar travellers");
        }
        if recommendation.sources.content_based {
            sources.push("your travel profile");
        }
        if recommendation.sources.deep_learning {
            sources.push("your stated preferences");
        }

        let basis = if sources.is_empty() {
            "general popularity".to_string()
        } else {
            sources.join(" and ")
        };

        match &recommendation.explanation {
            Some(reasons) => format!(
                "Suggested from {} because it {}.",
                basis,
                reasons.to_lowercase()
            ),
            None => format!("Suggested from {}.", basis),
        }
    }

    fn filter_candidates(
        &self,
        catalog: Vec<Destination>,
        preferences: &TravelPreferences,
        options: &RecommendOptions,
        history: &VisitHistory,
    ) -> Vec<Destination> {
        catalog
            .into_iter()
            .filter(|destination| {
                if options.exclude_visited
                    && (history.has_visited(&destination.id)
                        || history.has_visited(&destination.name))
                {
                    return false;
                }
                if !preferences.provinces.is_empty()
                    && !preferences.provinces.contains(&destination.province)
                {
                    return false;
                }
                true
            })
            .collect()
    }

    fn deep_outputs(
        &self,
        context: &UserContext,
        preferences: &TravelPreferences,
    ) -> Option<[f32; preference::OUTPUT_SIZE]> {
        let stated = StatedPreferences {
            month: preferences.month.unwrap_or(context.current_month),
            budget: preferences.budget.unwrap_or(crate::models::BudgetTier::Medium),
            trip_type: preferences
                .trip_type
                .unwrap_or(crate::models::TripType::Relaxation),
            adventure: preferences
                .adventure
                .unwrap_or(crate::models::AdventureLevel::Medium),
            eco_friendly: preferences.eco_friendly,
        };
        let avg_rating = mean_rating(
            &context.recent_feedback,
            crate::services::novelty::DEFAULT_SATISFACTION,
        );
        let input = preference::encode_input(&stated, avg_rating);
        self.preference.predict(&input)
    }

    /// Fire-and-forget analytics write. Failures are logged and swallowed.
    fn spawn_analytics_log(
        &self,
        user_id: &str,
        results: &[Recommendation],
        preferences: &TravelPreferences,
    ) {
        let entry = RecommendationLog {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            entries: results
                .iter()
                .map(|r| LoggedRecommendation {
                    destination_id: r.destination.id.clone(),
                    score: r.score,
                    confidence: r.confidence,
                    sources: r.sources,
                })
                .collect(),
            preferences: preferences.clone(),
            timestamp: Utc::now(),
        };
        let analytics = Arc::clone(&self.analytics);
        tokio::spawn(async move {
            if let Err(error) = analytics.log_recommendations(entry).await {
                warn!(%error, "recommendation analytics write failed");
            }
        });
    }
}
