//! Diversity scoring and greedy diverse re-selection.
//!
//! Two related measures live here. `set_diversity` rates how varied a
//! candidate list already is, feeding the diversity bonus during merge.
//! `rerank_diverse` then rebuilds the final top K greedily, trading raw
//! score against dissimilarity to what has already been picked.

use crate::models::Recommendation;
use crate::services::content_based::primary_category;

/// Blend weights for the greedy re-selection step.
const SCORE_WEIGHT: f32 = 0.7;
const DIVERSITY_WEIGHT: f32 = 0.3;

/// Pairwise diversity of a candidate set, in [0, 1].
///
/// Each unordered pair contributes 0.25 per differing trait out of
/// province, primary category, price level, and rating bucket. Lists of
/// fewer than two items have no pairs and score 0.
pub fn set_diversity(recommendations: &[Recommendation]) -> f32 {
    if recommendations.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0f32;
    let mut pairs = 0usize;
    for i in 0..recommendations.len() {
        for j in (i + 1)..recommendations.len() {
            total += pair_diversity(&recommendations[i], &recommendations[j]);
            pairs += 1;
        }
    }
    total / pairs as f32
}

fn pair_diversity(a: &Recommendation, b: &Recommendation) -> f32 {
    let da = &a.destination;
    let db = &b.destination;
    let mut score = 0.0f32;
    if da.province != db.province {
        score += 0.25;
    }
    if primary_category(da) != primary_category(db) {
        score += 0.25;
    }
    if da.price_level != db.price_level {
        score += 0.25;
    }
    if rating_bucket(da.rating) != rating_bucket(db.rating) {
        score += 0.25;
    }
    score
}

/// Half-star buckets, so 4.3 and 4.4 count as the same rating tier.
fn rating_bucket(rating: f32) -> i32 {
    (rating * 2.0).round() as i32
}

/// Greedy diverse re-selection.
///
/// Keeps the top-scored item, then repeatedly picks the remaining
/// candidate maximizing `0.7 * score + 0.3 * dissimilarity-to-selected`.
/// Scores and order inside the returned list reflect the original scores;
/// only the selection order changes.
pub fn rerank_diverse(mut candidates: Vec<Recommendation>, top_k: usize) -> Vec<Recommendation> {
    if candidates.len() <= 1 || top_k == 0 {
        candidates.truncate(top_k);
        return candidates;
    }

    let mut selected: Vec<Recommendation> = Vec::with_capacity(top_k.min(candidates.len()));
    selected.push(candidates.remove(0));

    while selected.len() < top_k && !candidates.is_empty() {
        let mut best_index = 0usize;
        let mut best_value = f32::NEG_INFINITY;

        for (index, candidate) in candidates.iter().enumerate() {
            let dissimilarity = dissimilarity_to_selected(candidate, &selected);
            let value = SCORE_WEIGHT * candidate.score + DIVERSITY_WEIGHT * dissimilarity;
            if value > best_value {
                best_value = value;
                best_index = index;
            }
        }

        selected.push(candidates.remove(best_index));
    }

    selected
}

/// Accumulated dissimilarity between a candidate and every already
/// selected item. Province differences weigh most, then category, then a
/// meaningful rating gap.
fn dissimilarity_to_selected(candidate: &Recommendation, selected: &[Recommendation]) -> f32 {
    selected
        .iter()
        .map(|picked| {
            let mut score = 0.0f32;
            if candidate.destination.province != picked.destination.province {
                score += 0.3;
            }
            if primary_category(&candidate.destination) != primary_category(&picked.destination) {
                score += 0.2;
            }
            if (candidate.destination.rating - picked.destination.rating).abs() > 0.5 {
                score += 0.1;
            }
            score
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Destination, Provenance, Recommendation};

    fn destination(id: &str, province: &str, tag: &str, price: u8, rating: f32) -> Destination {
        Destination {
            id: id.to_string(),
            name: format!("{id} {tag}"),
            province: province.to_string(),
            lat: 0.0,
            lng: 0.0,
            rating,
            price_level: price,
            tags: vec![tag.to_string()],
            review_count: 100,
            festival_count: 0,
            description: None,
        }
    }

    fn rec(destination: Destination, score: f32) -> Recommendation {
        Recommendation {
            destination,
            score,
            confidence: score,
            explanation: None,
            sources: Provenance::default(),
        }
    }

    #[test]
    fn test_singleton_has_no_diversity() {
        let only = rec(destination("d1", "Hà Nội", "beach", 1, 4.0), 0.9);
        assert_eq!(set_diversity(&[only]), 0.0);
        assert_eq!(set_diversity(&[]), 0.0);
    }

    #[test]
    fn test_identical_traits_score_zero() {
        let a = rec(destination("d1", "Hà Nội", "beach", 1, 4.0), 0.9);
        let b = rec(destination("d2", "Hà Nội", "beach", 1, 4.0), 0.8);
        assert_eq!(set_diversity(&[a, b]), 0.0);
    }

    #[test]
    fn test_fully_distinct_pair_scores_one() {
        let a = rec(destination("d1", "Hà Nội", "beach", 1, 3.0), 0.9);
        let b = rec(destination("d2", "Đà Nẵng", "museum", 3, 4.5), 0.8);
        assert_eq!(set_diversity(&[a, b]), 1.0);
    }

    #[test]
    fn test_rating_bucket_groups_half_stars() {
        let a = rec(destination("d1", "Hà Nội", "beach", 1, 4.3), 0.9);
        let b = rec(destination("d2", "Hà Nội", "beach", 1, 4.4), 0.8);
        // Same bucket: only identical traits everywhere, diversity 0.
        assert_eq!(set_diversity(&[a, b]), 0.0);
    }

    #[test]
    fn test_rerank_keeps_top_item_first() {
        let candidates = vec![
            rec(destination("d1", "Hà Nội", "beach", 1, 4.0), 0.95),
            rec(destination("d2", "Hà Nội", "beach", 1, 4.0), 0.90),
            rec(destination("d3", "Huế", "museum", 2, 3.5), 0.50),
        ];
        let reranked = rerank_diverse(candidates, 3);
        assert_eq!(reranked[0].destination.id, "d1");
        assert_eq!(reranked.len(), 3);
    }

    #[test]
    fn test_rerank_promotes_distinct_province() {
        // d2 nearly ties d1 on score but shares every trait; d3 scores
        // lower but is distinct, so the diversity term lifts it to slot 2.
        let candidates = vec![
            rec(destination("d1", "Hà Nội", "beach", 1, 4.0), 0.90),
            rec(destination("d2", "Hà Nội", "beach", 1, 4.0), 0.78),
            rec(destination("d3", "Đà Nẵng", "museum", 3, 4.8), 0.75),
        ];
        let reranked = rerank_diverse(candidates, 3);
        assert_eq!(reranked[1].destination.id, "d3");
        assert_eq!(reranked[2].destination.id, "d2");
    }

    #[test]
    fn test_rerank_with_zero_top_k_returns_nothing() {
        let candidates = vec![
            rec(destination("d1", "Hà Nội", "beach", 1, 4.0), 0.95),
            rec(destination("d2", "Huế", "museum", 2, 3.5), 0.50),
        ];
        assert!(rerank_diverse(candidates, 0).is_empty());
    }

    #[test]
    fn test_rerank_truncates_to_top_k() {
        let candidates = (0..6)
            .map(|i| {
                rec(
                    destination(&format!("d{i}"), "Hà Nội", "beach", 1, 4.0),
                    1.0 - i as f32 * 0.1,
                )
            })
            .collect();
        assert_eq!(rerank_diverse(candidates, 4).len(), 4);
    }
}
