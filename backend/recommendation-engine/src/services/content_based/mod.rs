//! Content-based filtering scorer.
//!
//! Destinations are projected onto a fixed 14-dimension feature vector;
//! user profiles live in the same space and are aggregated from explicit
//! feedback (weighted by rating) and trip history (fixed implicit weight).
//! Similarity is a weighted blend over the shared dimensions, clamped to
//! [0, 1]. Profiles are nudged online as new feedback arrives.

use crate::config::ContentConfig;
use crate::models::Destination;
use crate::store::DestinationStore;
use crate::utils::clamp01;
use dashmap::DashMap;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Length of the destination feature vector and of the matching portion of
/// the user profile. Fixed regardless of which optional fields a
/// destination carries.
pub const FEATURE_VECTOR_SIZE: usize = 14;

/// Provenance tag for candidates produced by this scorer.
pub const SOURCE: &str = "content_based_filtering";

/// Number of category dimensions.
pub const CATEGORY_COUNT: usize = 8;

/// Months treated as the summer travel window for the seasonal term
/// (distinct from the four-season calendar used elsewhere).
const SUMMER_MONTHS: std::ops::RangeInclusive<u32> = 5..=9;

/// Destination categories matched by keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Beach,
    Mountain,
    Historical,
    Nature,
    Urban,
    Cultural,
    Adventure,
    Food,
}

impl Category {
    pub const ALL: [Category; CATEGORY_COUNT] = [
        Category::Beach,
        Category::Mountain,
        Category::Historical,
        Category::Nature,
        Category::Urban,
        Category::Cultural,
        Category::Adventure,
        Category::Food,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Beach => "beach",
            Category::Mountain => "mountain",
            Category::Historical => "historical",
            Category::Nature => "nature",
            Category::Urban => "urban",
            Category::Cultural => "cultural",
            Category::Adventure => "adventure",
            Category::Food => "food",
        }
    }

    /// Keyword list matched against name, description, and tags.
    /// English and Vietnamese terms are both checked.
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Category::Beach => &["beach", "biển", "bãi tắm"],
            Category::Mountain => &["mountain", "núi", "đồi"],
            Category::Historical => &["historical", "lịch sử", "cổ", "đền", "chùa"],
            Category::Nature => &["park", "nature", "tự nhiên", "rừng"],
            Category::Urban => &["city", "thành phố", "urban"],
            Category::Cultural => &["museum", "cultural", "văn hóa", "bảo tàng"],
            Category::Adventure => &["adventure", "mạo hiểm", "thể thao"],
            Category::Food => &["restaurant", "food", "ẩm thực", "quán"],
        }
    }
}

const SUMMER_KEYWORDS: &[&str] = &["summer", "hè", "beach", "biển"];
const WINTER_KEYWORDS: &[&str] = &["winter", "đông", "festival", "lễ hội"];

/// A destination projected onto the fixed feature space.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationFeatures {
    /// Aggregate rating, 0–5.
    pub rating: f32,
    /// Ordinal price level, 0–4.
    pub price_level: f32,
    /// Binary keyword matches per [`Category::ALL`] entry.
    pub categories: [f32; CATEGORY_COUNT],
    pub best_in_summer: f32,
    pub best_in_winter: f32,
    /// Crowd estimate from review volume, 0–5.
    pub crowd_level: f32,
    pub has_festival: f32,
}

impl DestinationFeatures {
    /// Extract features from a destination. Every destination yields a
    /// vector of exactly [`FEATURE_VECTOR_SIZE`] dimensions.
    pub fn extract(destination: &Destination) -> Self {
        let text = searchable_text(destination);
        let mut categories = [0.0; CATEGORY_COUNT];
        for (slot, category) in categories.iter_mut().zip(Category::ALL.iter()) {
            *slot = keyword_match(&text, category.keywords());
        }

        // Review volume is the crowd proxy; destinations with no reviews
        // get a mid-range guess rather than "empty".
        let crowd_level = if destination.review_count == 0 {
            2.0
        } else {
            (destination.review_count as f32 / 1000.0).min(5.0)
        };

        Self {
            rating: destination.rating,
            price_level: destination.price_level as f32,
            categories,
            best_in_summer: keyword_match(&text, SUMMER_KEYWORDS),
            best_in_winter: keyword_match(&text, WINTER_KEYWORDS),
            crowd_level,
            has_festival: if destination.festival_count > 0 { 1.0 } else { 0.0 },
        }
    }

    /// Fixed-order vector: rating, price, 8 categories, summer, winter,
    /// crowd, festival.
    pub fn to_vector(&self) -> Vec<f32> {
        let mut vector = Vec::with_capacity(FEATURE_VECTOR_SIZE);
        vector.push(self.rating);
        vector.push(self.price_level);
        vector.extend_from_slice(&self.categories);
        vector.push(self.best_in_summer);
        vector.push(self.best_in_winter);
        vector.push(self.crowd_level);
        vector.push(self.has_festival);
        vector
    }

    /// The first matched category, used for diversity comparisons.
    pub fn primary_category(&self) -> Option<Category> {
        self.categories
            .iter()
            .zip(Category::ALL.iter())
            .find(|(matched, _)| **matched > 0.5)
            .map(|(_, category)| *category)
    }
}

/// First matched category of a destination.
pub fn primary_category(destination: &Destination) -> Option<Category> {
    DestinationFeatures::extract(destination).primary_category()
}

fn searchable_text(destination: &Destination) -> String {
    let mut text = destination.name.to_lowercase();
    if let Some(description) = &destination.description {
        text.push(' ');
        text.push_str(&description.to_lowercase());
    }
    for tag in &destination.tags {
        text.push(' ');
        text.push_str(&tag.to_lowercase());
    }
    text
}

fn keyword_match(text: &str, keywords: &[&str]) -> f32 {
    if keywords.iter().any(|k| text.contains(k)) {
        1.0
    } else {
        0.0
    }
}

/// A user's preference profile. Every value lives in [0, 1]; the rating,
/// price, and crowd dimensions are stored normalized (rating/5, price/4,
/// crowd/5) so the clamping invariant is uniform across dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub preferred_rating: f32,
    pub preferred_price_level: f32,
    pub category_affinity: [f32; CATEGORY_COUNT],
    pub summer_affinity: f32,
    pub winter_affinity: f32,
    pub crowd_tolerance: f32,
    pub festival_affinity: f32,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            // 4.0-star preference, mid-range price, moderate crowd
            // tolerance: the planner's neutral starting point.
            preferred_rating: 0.8,
            preferred_price_level: 0.5,
            category_affinity: [0.0; CATEGORY_COUNT],
            summer_affinity: 0.0,
            winter_affinity: 0.0,
            crowd_tolerance: 0.6,
            festival_affinity: 0.0,
        }
    }
}

impl UserProfile {
    fn zeroed() -> Self {
        Self {
            preferred_rating: 0.0,
            preferred_price_level: 0.0,
            category_affinity: [0.0; CATEGORY_COUNT],
            summer_affinity: 0.0,
            winter_affinity: 0.0,
            crowd_tolerance: 0.0,
            festival_affinity: 0.0,
        }
    }

    fn accumulate(&mut self, features: &DestinationFeatures, weight: f32) {
        self.preferred_rating += (features.rating / 5.0) * weight;
        self.preferred_price_level += (features.price_level / 4.0) * weight;
        for (affinity, matched) in self.category_affinity.iter_mut().zip(features.categories) {
            *affinity += matched * weight;
        }
        self.summer_affinity += features.best_in_summer * weight;
        self.winter_affinity += features.best_in_winter * weight;
        self.crowd_tolerance += (features.crowd_level / 5.0) * weight;
        self.festival_affinity += features.has_festival * weight;
    }

    fn scale(&mut self, factor: f32) {
        self.preferred_rating *= factor;
        self.preferred_price_level *= factor;
        for affinity in &mut self.category_affinity {
            *affinity *= factor;
        }
        self.summer_affinity *= factor;
        self.winter_affinity *= factor;
        self.crowd_tolerance *= factor;
        self.festival_affinity *= factor;
    }

    /// All profile values in a flat list, for range checks.
    pub fn to_values(&self) -> Vec<f32> {
        let mut values = vec![self.preferred_rating, self.preferred_price_level];
        values.extend_from_slice(&self.category_affinity);
        values.extend_from_slice(&[
            self.summer_affinity,
            self.winter_affinity,
            self.crowd_tolerance,
            self.festival_affinity,
        ]);
        values
    }

    fn clamp_all(&mut self) {
        self.preferred_rating = clamp01(self.preferred_rating);
        self.preferred_price_level = clamp01(self.preferred_price_level);
        for affinity in &mut self.category_affinity {
            *affinity = clamp01(*affinity);
        }
        self.summer_affinity = clamp01(self.summer_affinity);
        self.winter_affinity = clamp01(self.winter_affinity);
        self.crowd_tolerance = clamp01(self.crowd_tolerance);
        self.festival_affinity = clamp01(self.festival_affinity);
    }
}

/// A destination scored by the content-based model.
#[derive(Debug, Clone)]
pub struct CbCandidate {
    pub destination_id: String,
    pub similarity: f32,
    pub explanation: Option<String>,
}

/// Content-based filtering model with a per-user profile cache.
pub struct ContentBasedModel {
    config: ContentConfig,
    profiles: DashMap<String, UserProfile>,
}

impl ContentBasedModel {
    pub fn new(config: ContentConfig) -> Self {
        Self {
            config,
            profiles: DashMap::new(),
        }
    }

    pub fn cached_profile(&self, user_id: &str) -> Option<UserProfile> {
        self.profiles.get(user_id).map(|p| p.clone())
    }

    /// Build (or rebuild) the user's profile from their full history.
    ///
    /// Explicit feedback contributes its destination's features weighted by
    /// rating/5; each trip contributes the mean of its destinations'
    /// features at the fixed implicit weight. Returns `None` when the user
    /// has no history at all — the caller cannot personalize for them.
    pub async fn build_user_profile(
        &self,
        store: &dyn DestinationStore,
        user_id: &str,
    ) -> anyhow::Result<Option<UserProfile>> {
        let feedback = store.feedback_for_user(user_id).await?;
        let trips = store.trips_for_user(user_id).await?;

        let catalog: HashMap<String, Destination> = store
            .destinations()
            .await?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        let mut profile = UserProfile::zeroed();
        let mut total_weight = 0.0f32;

        for entry in &feedback {
            let Some(destination) = catalog.get(&entry.destination_id) else {
                continue;
            };
            let weight = entry.rating / 5.0;
            profile.accumulate(&DestinationFeatures::extract(destination), weight);
            total_weight += weight;
        }

        for trip in &trips {
            if trip.destinations.is_empty() {
                continue;
            }
            let weight = self.config.trip_visit_weight;
            let mut trip_profile = UserProfile::zeroed();
            for destination in &trip.destinations {
                trip_profile.accumulate(&DestinationFeatures::extract(destination), 1.0);
            }
            trip_profile.scale(1.0 / trip.destinations.len() as f32);
            trip_profile.scale(weight);

            profile.preferred_rating += trip_profile.preferred_rating;
            profile.preferred_price_level += trip_profile.preferred_price_level;
            for (a, b) in profile
                .category_affinity
                .iter_mut()
                .zip(trip_profile.category_affinity)
            {
                *a += b;
            }
            profile.summer_affinity += trip_profile.summer_affinity;
            profile.winter_affinity += trip_profile.winter_affinity;
            profile.crowd_tolerance += trip_profile.crowd_tolerance;
            profile.festival_affinity += trip_profile.festival_affinity;
            total_weight += weight;
        }

        if total_weight <= 0.0 {
            debug!(user_id, "no history, cannot build content profile");
            return Ok(None);
        }

        profile.scale(1.0 / total_weight);
        profile.clamp_all();
        self.profiles.insert(user_id.to_string(), profile.clone());
        Ok(Some(profile))
    }

    /// Cached profile if present, otherwise a fresh build.
    pub async fn ensure_profile(
        &self,
        store: &dyn DestinationStore,
        user_id: &str,
    ) -> anyhow::Result<Option<UserProfile>> {
        if let Some(profile) = self.cached_profile(user_id) {
            return Ok(Some(profile));
        }
        self.build_user_profile(store, user_id).await
    }

    /// Weighted similarity between a profile and a destination's features,
    /// always in [0, 1]. `month` selects the seasonal term.
    pub fn similarity(
        &self,
        profile: &UserProfile,
        features: &DestinationFeatures,
        month: u32,
    ) -> f32 {
        let weights = &self.config.similarity;

        let rating_term = 1.0 - (profile.preferred_rating - features.rating / 5.0).abs();
        let price_term = 1.0 - (profile.preferred_price_level - features.price_level / 4.0).abs();

        let category_term = profile
            .category_affinity
            .iter()
            .zip(features.categories)
            .map(|(affinity, matched)| affinity * matched)
            .sum::<f32>()
            / CATEGORY_COUNT as f32;

        let seasonal_term = if SUMMER_MONTHS.contains(&month) {
            profile.summer_affinity * features.best_in_summer
        } else {
            profile.winter_affinity * features.best_in_winter
        };

        let crowd_term = 1.0 - (profile.crowd_tolerance - features.crowd_level / 5.0).abs();
        let festival_term = profile.festival_affinity * features.has_festival;

        clamp01(
            weights.rating * rating_term
                + weights.price * price_term
                + weights.category * category_term
                + weights.seasonal * seasonal_term
                + weights.crowd * crowd_term
                + weights.festival * festival_term,
        )
    }

    /// Score candidates against a profile and return the top K.
    pub fn score_candidates(
        &self,
        profile: &UserProfile,
        candidates: &[Destination],
        top_k: usize,
        month: u32,
    ) -> Vec<CbCandidate> {
        let mut scored: Vec<CbCandidate> = candidates
            .iter()
            .map(|destination| {
                let features = DestinationFeatures::extract(destination);
                CbCandidate {
                    destination_id: destination.id.clone(),
                    similarity: self.similarity(profile, &features, month),
                    explanation: self.explain(profile, &features),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        scored
    }

    /// Recommend from the user's (possibly freshly built) profile. Empty
    /// when no profile can be derived.
    pub async fn recommend_for_user(
        &self,
        store: &dyn DestinationStore,
        user_id: &str,
        candidates: &[Destination],
        top_k: usize,
        month: u32,
    ) -> anyhow::Result<Vec<CbCandidate>> {
        match self.ensure_profile(store, user_id).await? {
            Some(profile) => Ok(self.score_candidates(&profile, candidates, top_k, month)),
            None => {
                warn!(user_id, "could not build content profile");
                Ok(Vec::new())
            }
        }
    }

    /// Online profile nudge from a single piece of feedback.
    ///
    /// Ratings above the positive threshold pull matched category
    /// affinities toward 1 by `alpha` of the remaining gap; ratings below
    /// the negative threshold decay them toward 0 at the same rate. The
    /// band in between is a dead zone and changes nothing. All values are
    /// clamped to [0, 1] afterwards.
    pub fn update_profile(&self, user_id: &str, destination: &Destination, rating: f32) {
        let alpha = self.config.learning_rate;
        let normalized = rating / 5.0;
        let features = DestinationFeatures::extract(destination);

        let mut profile = self
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(UserProfile::default);

        if normalized > 0.6 {
            profile.preferred_rating += alpha * (features.rating / 5.0 - profile.preferred_rating);
            profile.preferred_price_level +=
                alpha * (features.price_level / 4.0 - profile.preferred_price_level);
            for (affinity, matched) in
                profile.category_affinity.iter_mut().zip(features.categories)
            {
                if matched > 0.5 {
                    *affinity += alpha * (1.0 - *affinity);
                }
            }
            if features.best_in_summer > 0.5 {
                profile.summer_affinity += alpha * (1.0 - profile.summer_affinity);
            }
            if features.best_in_winter > 0.5 {
                profile.winter_affinity += alpha * (1.0 - profile.winter_affinity);
            }
            if features.has_festival > 0.5 {
                profile.festival_affinity += alpha * (1.0 - profile.festival_affinity);
            }
        } else if normalized < 0.4 {
            for (affinity, matched) in
                profile.category_affinity.iter_mut().zip(features.categories)
            {
                if matched > 0.5 {
                    *affinity -= alpha * *affinity;
                }
            }
            if features.best_in_summer > 0.5 {
                profile.summer_affinity -= alpha * profile.summer_affinity;
            }
            if features.best_in_winter > 0.5 {
                profile.winter_affinity -= alpha * profile.winter_affinity;
            }
            if features.has_festival > 0.5 {
                profile.festival_affinity -= alpha * profile.festival_affinity;
            }
        }
        // Ratings in the dead zone fall through to the clamp unchanged.

        profile.clamp_all();
    }

    /// Human-readable reasons for a strong profile match, if any.
    fn explain(&self, profile: &UserProfile, features: &DestinationFeatures) -> Option<String> {
        let mut reasons: Vec<String> = Vec::new();

        for ((affinity, matched), category) in profile
            .category_affinity
            .iter()
            .zip(features.categories)
            .zip(Category::ALL.iter())
        {
            if matched > 0.5 && *affinity > 0.7 {
                reasons.push(format!("matches your {} preference", category.as_str()));
            }
        }
        if features.rating / 5.0 >= profile.preferred_rating {
            reasons.push("rated at or above your usual standard".to_string());
        }

        if reasons.is_empty() {
            None
        } else {
            Some(reasons.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Destination;

    fn beach_destination() -> Destination {
        Destination {
            id: "d_beach".to_string(),
            name: "Bãi biển Mỹ Khê".to_string(),
            province: "Đà Nẵng".to_string(),
            lat: 16.06,
            lng: 108.24,
            rating: 4.5,
            price_level: 2,
            tags: vec!["beach".to_string()],
            review_count: 2400,
            festival_count: 0,
            description: Some("White sand beach".to_string()),
        }
    }

    fn museum_destination() -> Destination {
        Destination {
            id: "d_museum".to_string(),
            name: "Bảo tàng Chăm".to_string(),
            province: "Đà Nẵng".to_string(),
            lat: 16.07,
            lng: 108.22,
            rating: 4.2,
            price_level: 1,
            tags: vec!["museum".to_string()],
            review_count: 800,
            festival_count: 0,
            description: None,
        }
    }

    fn bare_destination() -> Destination {
        Destination {
            id: "d_bare".to_string(),
            name: "Somewhere".to_string(),
            province: "Unknown".to_string(),
            lat: 0.0,
            lng: 0.0,
            rating: 0.0,
            price_level: 0,
            tags: Vec::new(),
            review_count: 0,
            festival_count: 0,
            description: None,
        }
    }

    #[test]
    fn test_feature_vector_fixed_length() {
        for destination in [beach_destination(), museum_destination(), bare_destination()] {
            let vector = DestinationFeatures::extract(&destination).to_vector();
            assert_eq!(vector.len(), FEATURE_VECTOR_SIZE);
        }
    }

    #[test]
    fn test_vietnamese_and_english_keywords_match() {
        let beach = DestinationFeatures::extract(&beach_destination());
        assert_eq!(beach.categories[0], 1.0); // biển
        assert_eq!(beach.best_in_summer, 1.0);

        let museum = DestinationFeatures::extract(&museum_destination());
        assert_eq!(museum.categories[5], 1.0); // bảo tàng
        assert_eq!(museum.categories[0], 0.0);
    }

    #[test]
    fn test_crowd_level_estimate() {
        let beach = DestinationFeatures::extract(&beach_destination());
        assert!((beach.crowd_level - 2.4).abs() < 1e-6);

        // No reviews: mid-range guess, capped dimension regardless.
        let bare = DestinationFeatures::extract(&bare_destination());
        assert!((bare.crowd_level - 2.0).abs() < 1e-6);

        let mut busy = beach_destination();
        busy.review_count = 50_000;
        assert!((DestinationFeatures::extract(&busy).crowd_level - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_stays_in_unit_range() {
        let model = ContentBasedModel::new(ContentConfig::default());
        let mut profile = UserProfile::default();
        profile.category_affinity = [1.0; CATEGORY_COUNT];
        profile.summer_affinity = 1.0;
        profile.winter_affinity = 1.0;
        profile.festival_affinity = 1.0;

        for destination in [beach_destination(), museum_destination(), bare_destination()] {
            let features = DestinationFeatures::extract(&destination);
            for month in 1..=12 {
                let similarity = model.similarity(&profile, &features, month);
                assert!((0.0..=1.0).contains(&similarity));
            }
        }
    }

    #[test]
    fn test_similarity_prefers_matching_category() {
        let model = ContentBasedModel::new(ContentConfig::default());
        let mut profile = UserProfile::default();
        profile.category_affinity[0] = 1.0; // beach lover

        let beach = DestinationFeatures::extract(&beach_destination());
        let museum = DestinationFeatures::extract(&museum_destination());

        // January keeps the seasonal term off the beach's side.
        let beach_score = model.similarity(&profile, &beach, 1);
        let museum_score = model.similarity(&profile, &museum, 1);
        assert!(beach_score > museum_score);
    }

    #[test]
    fn test_single_positive_feedback_moves_affinity_to_alpha() {
        let model = ContentBasedModel::new(ContentConfig::default());
        // Start from an explicit zero baseline.
        model
            .profiles
            .insert("u1".to_string(), UserProfile::zeroed());

        model.update_profile("u1", &beach_destination(), 5.0);

        let profile = model.cached_profile("u1").unwrap();
        // Matched category moved 0 → 0.1×(1−0) = 0.1.
        assert!((profile.category_affinity[0] - 0.1).abs() < 1e-6);
        // Unmatched categories untouched.
        assert_eq!(profile.category_affinity[5], 0.0);
    }

    #[test]
    fn test_dead_zone_leaves_profile_unchanged() {
        let model = ContentBasedModel::new(ContentConfig::default());
        model
            .profiles
            .insert("u1".to_string(), UserProfile::default());
        let before = model.cached_profile("u1").unwrap();

        // 2.5/5 = 0.5 sits inside the [0.4, 0.6] dead zone.
        model.update_profile("u1", &beach_destination(), 2.5);

        assert_eq!(model.cached_profile("u1").unwrap(), before);
    }

    #[test]
    fn test_update_profile_never_leaves_unit_range() {
        let model = ContentBasedModel::new(ContentConfig::default());
        for _ in 0..200 {
            model.update_profile("u1", &beach_destination(), 5.0);
        }
        for _ in 0..200 {
            model.update_profile("u1", &museum_destination(), 1.0);
        }

        let profile = model.cached_profile("u1").unwrap();
        for value in profile.to_values() {
            assert!((0.0..=1.0).contains(&value), "out of range: {value}");
        }
    }

    #[test]
    fn test_negative_feedback_decays_matched_affinities() {
        let model = ContentBasedModel::new(ContentConfig::default());
        let mut profile = UserProfile::zeroed();
        profile.category_affinity[0] = 0.5;
        model.profiles.insert("u1".to_string(), profile);

        model.update_profile("u1", &beach_destination(), 1.0);

        let updated = model.cached_profile("u1").unwrap();
        assert!((updated.category_affinity[0] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_explanation_for_strong_match() {
        let model = ContentBasedModel::new(ContentConfig::default());
        let mut profile = UserProfile::default();
        profile.category_affinity[0] = 0.9;

        let features = DestinationFeatures::extract(&beach_destination());
        let explanation = model.explain(&profile, &features).unwrap();
        assert!(explanation.contains("beach"));
    }
}
