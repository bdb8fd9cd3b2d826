//! Novelty bonuses.
//!
//! Rewards destinations unlike the user's recent history: a province they
//! have not been to, a category they have not tried, and a rating that
//! departs meaningfully from what they usually rate. Capped at 1.0 before
//! the combiner scales it by the novelty weight.

use crate::models::{Destination, Feedback, TripRecord};
use crate::services::content_based::primary_category;
use crate::utils::mean_rating;
use std::collections::HashSet;

const NEW_PROVINCE_BONUS: f32 = 0.5;
const NEW_CATEGORY_BONUS: f32 = 0.3;
const RATING_CONTRAST_BONUS: f32 = 0.2;

/// A destination rating counts as novel when it sits further than this
/// from the user's recent average.
const RATING_CONTRAST_THRESHOLD: f32 = 0.5;

/// Average rating assumed for users with no feedback yet.
pub const DEFAULT_SATISFACTION: f32 = 4.0;

/// What the user has already experienced, precomputed once per request.
#[derive(Debug, Default)]
pub struct VisitHistory {
    visited_ids: HashSet<String>,
    visited_provinces: HashSet<String>,
    visited_categories: HashSet<&'static str>,
    /// Mean feedback rating, 1–5 scale.
    pub satisfaction: f32,
}

impl VisitHistory {
    pub fn build(trips: &[TripRecord], feedback: &[Feedback]) -> Self {
        let mut history = Self {
            satisfaction: mean_rating(feedback, DEFAULT_SATISFACTION),
            ..Self::default()
        };
        for trip in trips {
            for destination in &trip.destinations {
                history.record(destination);
            }
        }
        history
    }

    fn record(&mut self, destination: &Destination) {
        self.visited_ids.insert(destination.id.clone());
        self.visited_provinces.insert(destination.province.clone());
        if let Some(category) = primary_category(destination) {
            self.visited_categories.insert(category.as_str());
        }
    }

    pub fn has_visited(&self, destination_id: &str) -> bool {
        self.visited_ids.contains(destination_id)
    }

    pub fn visited_ids(&self) -> &HashSet<String> {
        &self.visited_ids
    }

    /// Novelty bonus for a destination, in [0, 1].
    pub fn novelty_bonus(&self, destination: &Destination) -> f32 {
        let mut bonus = 0.0f32;
        if !self.visited_provinces.contains(&destination.province) {
            bonus += NEW_PROVINCE_BONUS;
        }
        match primary_category(destination) {
            Some(category) if !self.visited_categories.contains(category.as_str()) => {
                bonus += NEW_CATEGORY_BONUS;
            }
            _ => {}
        }
        if (destination.rating - self.satisfaction).abs() > RATING_CONTRAST_THRESHOLD {
            bonus += RATING_CONTRAST_BONUS;
        }
        bonus.min(1.0)
    }
}
