//! Near-duplicate detection for human review.
//!
//! Two merged entities in the same category whose signatures differ but
//! whose folded names are close (normalized Levenshtein similarity at or
//! above the threshold) are reported as a [`PossibleDuplicate`]. They are
//! never merged automatically.

use std::collections::BTreeMap;

use crate::models::{CanonicalEntity, PossibleDuplicate};
use crate::normalize::fold_name;

/// Pairs of signatures that may name the same exercise, most similar first.
///
/// `left < right` in every pair, so a pair has one stable key.
pub fn find_possible_duplicates(
    entities: &BTreeMap<String, CanonicalEntity>,
    threshold: f64,
) -> Vec<PossibleDuplicate> {
    let mut by_category: BTreeMap<&str, Vec<(&str, String)>> = BTreeMap::new();
    for entity in entities.values() {
        by_category
            .entry(entity.category.as_str())
            .or_default()
            .push((entity.signature.as_str(), fold_name(&entity.name)));
    }

    let mut pairs = Vec::new();
    for members in by_category.values() {
        for (i, (left, left_name)) in members.iter().enumerate() {
            for (right, right_name) in &members[i + 1..] {
                if left_name == right_name {
                    continue;
                }
                let similarity = strsim::normalized_levenshtein(left_name, right_name);
                if similarity >= threshold {
                    let (left, right) = if left < right { (left, right) } else { (right, left) };
                    pairs.push(PossibleDuplicate {
                        left: left.to_string(),
                        right: right.to_string(),
                        similarity,
                    });
                }
            }
        }
    }

    pairs.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.left.cmp(&b.left))
            .then_with(|| a.right.cmp(&b.right))
    });
    pairs
}
