use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pseudo-rating assigned to implicit trip-visit interactions. Visiting a
/// destination is treated as strong-but-not-maximal positive signal.
pub const IMPLICIT_VISIT_WEIGHT: f32 = 0.8;

/// A destination from the catalog, normalized at ingestion.
///
/// `id` is mandatory and stable. Upstream records that only carry a display
/// name (legacy `MainDestination` rows) must be run through [`canonical_id`]
/// before they enter the engine; scoring code never chases optional ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
    pub province: String,
    pub lat: f64,
    pub lng: f64,
    /// Aggregate rating, 0.0–5.0.
    pub rating: f32,
    /// Ordinal price level, 0–4.
    pub price_level: u8,
    /// Category tags, e.g. "beach", "museum".
    pub tags: Vec<String>,
    /// Review count, used as a popularity/crowd proxy.
    pub review_count: u32,
    /// Number of festivals associated with the destination this season.
    pub festival_count: u32,
    pub description: Option<String>,
}

/// Resolve the stable identifier for an upstream record that may carry an
/// explicit id, a legacy name-keyed id, or both.
pub fn canonical_id(id: Option<&str>, name: &str) -> String {
    match id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => name.to_string(),
    }
}

/// Origin of a recorded interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionSource {
    ExplicitFeedback,
    TripVisit,
}

impl InteractionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionSource::ExplicitFeedback => "explicit_feedback",
            InteractionSource::TripVisit => "trip_visit",
        }
    }
}

/// A single (user, destination, strength) preference signal.
///
/// Append-only; the sole training signal for the collaborative model.
/// `weight` is normalized to [0, 1]: explicit ratings divided by 5,
/// trip visits fixed at [`IMPLICIT_VISIT_WEIGHT`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub user_id: String,
    pub destination_id: String,
    pub weight: f32,
    pub timestamp: DateTime<Utc>,
    pub source: InteractionSource,
}

/// A completed or planned trip with its visited destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripRecord {
    pub user_id: String,
    pub destinations: Vec<Destination>,
    pub created_at: DateTime<Utc>,
}

/// Explicit feedback a user left for a destination, optionally carrying the
/// preferences they stated at the time (the deep model trains on these).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub user_id: String,
    pub destination_id: String,
    /// Star rating, 1.0–5.0.
    pub rating: f32,
    pub timestamp: DateTime<Utc>,
    pub stated_preferences: Option<StatedPreferences>,
}

/// The preferences a user declared when planning or rating a trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatedPreferences {
    /// Calendar month, 1–12.
    pub month: u32,
    pub budget: BudgetTier,
    pub trip_type: TripType,
    pub adventure: AdventureLevel,
    pub eco_friendly: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetTier {
    Low,
    Medium,
    High,
}

impl BudgetTier {
    pub fn index(&self) -> usize {
        match self {
            BudgetTier::Low => 0,
            BudgetTier::Medium => 1,
            BudgetTier::High => 2,
        }
    }
}

/// The four trip types the planner offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TripType {
    Relaxation,
    Adventure,
    Cultural,
    Culinary,
}

impl TripType {
    pub fn index(&self) -> usize {
        match self {
            TripType::Relaxation => 0,
            TripType::Adventure => 1,
            TripType::Cultural => 2,
            TripType::Culinary => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdventureLevel {
    Low,
    Medium,
    High,
}

impl AdventureLevel {
    pub fn index(&self) -> usize {
        match self {
            AdventureLevel::Low => 0,
            AdventureLevel::Medium => 1,
            AdventureLevel::High => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    /// Map a calendar month (1–12) to a season. Out-of-range months fall
    /// back to winter, matching the December–February bucket.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
            Season::Winter => "winter",
        }
    }
}

impl Default for Season {
    fn default() -> Self {
        Season::Winter
    }
}

/// Request-time preferences supplied by the caller. All optional; missing
/// fields fall back to the medium/relaxation defaults the planner uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TravelPreferences {
    pub month: Option<u32>,
    pub budget: Option<BudgetTier>,
    pub trip_type: Option<TripType>,
    pub adventure: Option<AdventureLevel>,
    pub eco_friendly: bool,
    pub provinces: Vec<String>,
}

/// Per-request options for recommendation generation.
#[derive(Debug, Clone)]
pub struct RecommendOptions {
    pub top_k: usize,
    pub include_explanations: bool,
    pub diversity_boost: bool,
    pub novelty_boost: bool,
    pub exclude_visited: bool,
}

impl Default for RecommendOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            include_explanations: true,
            diversity_boost: true,
            novelty_boost: true,
            exclude_visited: true,
        }
    }
}

/// Which underlying scorers contributed to a recommendation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub collaborative: bool,
    pub content_based: bool,
    pub deep_learning: bool,
}

impl Provenance {
    pub fn any(&self) -> bool {
        self.collaborative || self.content_based || self.deep_learning
    }
}

/// A single ranked recommendation returned to the caller.
///
/// `score` is the weighted sum of source scores plus any diversity/novelty
/// bonuses, so it is positive but not bounded to [0, 1]. `confidence` is
/// normalized against the collaborative weight and clamped to [0, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub destination: Destination,
    pub score: f32,
    pub confidence: f32,
    pub explanation: Option<String>,
    pub sources: Provenance,
}

/// Recent history and calendar context for one user, fetched per request.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    pub recent_trips: Vec<TripRecord>,
    pub recent_feedback: Vec<Feedback>,
    pub current_month: u32,
    pub season: Season,
}

/// Analytics record written (best-effort) after each recommendation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationLog {
    pub session_id: String,
    pub user_id: String,
    pub entries: Vec<LoggedRecommendation>,
    pub preferences: TravelPreferences,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedRecommendation {
    pub destination_id: String,
    pub score: f32,
    pub confidence: f32,
    pub sources: Provenance,
}

/// Analytics record written after each training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingLog {
    pub timestamp: DateTime<Utc>,
    pub models: Vec<String>,
    pub interaction_count: usize,
    pub feedback_count: usize,
    pub data_quality: f32,
}
