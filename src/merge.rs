//! Reconciliation of normalized candidates into canonical entities.
//!
//! Candidates are folded in arrival order, one signature at a time:
//!
//! | Field | Policy |
//! |-------|--------|
//! | `description`, `muscles`, `equipment`, `difficulty` | first non-empty value wins |
//! | `media` | union by URL, capped at [`MEDIA_CAP`] |
//! | `sources`, `alt_ids` | set union |
//!
//! The "first wins" fields depend on arrival order, so the driver feeds
//! providers in a fixed priority order (see `ingest`).

use std::collections::BTreeMap;

use crate::models::{append_media, CanonicalEntity, NormalizedCandidate, MEDIA_CAP};

/// Incremental merge state keyed by signature.
#[derive(Debug, Default)]
pub struct Merger {
    entities: BTreeMap<String, CanonicalEntity>,
    absorbed: usize,
}

impl Merger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one candidate into the state.
    pub fn absorb(&mut self, candidate: NormalizedCandidate) {
        self.absorbed += 1;
        match self.entities.get_mut(&candidate.signature) {
            Some(existing) => reconcile(existing, candidate),
            None => {
                let signature = candidate.signature.clone();
                self.entities
                    .insert(signature, CanonicalEntity::seed(candidate));
            }
        }
    }

    /// How many candidates have been absorbed so far.
    pub fn absorbed(&self) -> usize {
        self.absorbed
    }

    /// Number of distinct signatures seen so far.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn finish(self) -> BTreeMap<String, CanonicalEntity> {
        self.entities
    }
}

/// Merge a whole sequence in order.
pub fn merge<I>(candidates: I) -> BTreeMap<String, CanonicalEntity>
where
    I: IntoIterator<Item = NormalizedCandidate>,
{
    let mut merger = Merger::new();
    for candidate in candidates {
        merger.absorb(candidate);
    }
    merger.finish()
}

fn reconcile(existing: &mut CanonicalEntity, candidate: NormalizedCandidate) {
    if existing.description.is_empty() && !candidate.description.is_empty() {
        existing.description = candidate.description;
    }
    if existing.muscles.is_empty() && !candidate.muscles.is_empty() {
        existing.muscles = candidate.muscles;
    }
    if existing.equipment.is_empty() && !candidate.equipment.is_empty() {
        existing.equipment = candidate.equipment;
    }
    if !existing.difficulty.is_known() && candidate.difficulty.is_known() {
        existing.difficulty = candidate.difficulty;
    }
    append_media(&mut existing.media, candidate.media, MEDIA_CAP);
    existing.sources.insert(candidate.provider.to_string());
    existing.alt_ids.insert(candidate.alt_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateEntity, Difficulty, MediaItem, MediaKind, ProviderKind};
    use crate::normalize::normalize;
    use std::collections::BTreeSet;

    fn cand(provider: ProviderKind, id: &str, name: &str, category: &str) -> CandidateEntity {
        let mut c = CandidateEntity::new(provider, id, name);
        c.category = category.to_string();
        c
    }

    #[test]
    fn test_push_up_scenario() {
        let mut a = cand(ProviderKind::Wger, "11", "Push-Up", "chest");
        a.primary_muscles = vec!["chest".into(), "triceps".into()];
        let mut b = cand(ProviderKind::ExerciseDb, "0662", "push up", "Chest");
        b.primary_muscles = vec!["triceps".into(), "delts".into()];
        b.media = vec![MediaItem::new(MediaKind::Image, "https://img/1.png")];

        let merged = merge([normalize(&a), normalize(&b)]);
        assert_eq!(merged.len(), 1);
        let e = &merged["push-up|chest"];
        assert_eq!(e.muscles, vec!["chest", "triceps"]);
        assert_eq!(e.media.len(), 1);
        assert_eq!(e.media[0].url, "https://img/1.png");
        assert_eq!(
            e.sources,
            BTreeSet::from(["wger".to_string(), "exercisedb".to_string()])
        );
        assert_eq!(
            e.alt_ids,
            BTreeSet::from(["wger:11".to_string(), "exercisedb:0662".to_string()])
        );
    }

    #[test]
    fn test_first_non_empty_wins() {
        let a = cand(ProviderKind::Wger, "1", "Squat", "legs");
        let mut b = cand(ProviderKind::ExerciseDb, "2", "squat", "legs");
        b.description = "Sit back.".into();
        b.difficulty = "Beginner".into();
        b.equipment = vec!["barbell".into()];
        let mut c = cand(ProviderKind::ApiNinjas, "3", "SQUAT", "legs");
        c.description = "Different text.".into();
        c.difficulty = "expert".into();
        c.equipment = vec!["dumbbell".into()];

        let merged = merge([normalize(&a), normalize(&b), normalize(&c)]);
        let e = &merged["squat|legs"];
        assert_eq!(e.description, "Sit back.");
        assert_eq!(e.difficulty, Difficulty::Beginner);
        assert_eq!(e.equipment, vec!["barbell"]);
        assert_eq!(e.name, "Squat");
    }

    #[test]
    fn test_union_fields_independent_of_order() {
        let mut items = Vec::new();
        for (i, provider) in ProviderKind::ALL.iter().enumerate() {
            let mut c = cand(*provider, &i.to_string(), "Plank", "core");
            c.media = vec![
                MediaItem::new(MediaKind::Gif, format!("https://m/{}", i)),
                MediaItem::new(MediaKind::Gif, "https://m/shared"),
            ];
            items.push(normalize(&c));
        }
        let forward = merge(items.clone());
        items.reverse();
        let backward = merge(items);

        let f = &forward["plank|core"];
        let b = &backward["plank|core"];
        assert_eq!(f.sources, b.sources);
        assert_eq!(f.alt_ids, b.alt_ids);
        let urls = |e: &CanonicalEntity| e.media.iter().map(|m| m.url.clone()).collect::<BTreeSet<_>>();
        assert_eq!(urls(f), urls(b));
        assert_eq!(f.media.len(), 4);
    }

    #[test]
    fn test_distinct_categories_stay_apart() {
        let merged = merge([
            normalize(&cand(ProviderKind::Wger, "1", "Press", "chest")),
            normalize(&cand(ProviderKind::Wger, "2", "Press", "shoulders")),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_media_capped() {
        let mut merger = Merger::new();
        for i in 0..5 {
            let mut c = cand(ProviderKind::ExerciseDb, &i.to_string(), "Lunge", "legs");
            c.media = (0..4)
                .map(|j| MediaItem::new(MediaKind::Image, format!("https://m/{}/{}", i, j)))
                .collect();
            merger.absorb(normalize(&c));
        }
        assert_eq!(merger.absorbed(), 5);
        let merged = merger.finish();
        assert_eq!(merged["lunge|legs"].media.len(), MEDIA_CAP);
    }
}
