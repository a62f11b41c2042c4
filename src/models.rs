//! Core data models used throughout the harvester.
//!
//! These types represent the candidates, canonical records, and media items
//! that flow through the fetch → normalize → merge → enrich → upsert pipeline.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// Maximum number of media items kept on a canonical record.
pub const MEDIA_CAP: usize = 12;

/// The external catalog a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Wger,
    ExerciseDb,
    #[serde(rename = "ninjas")]
    ApiNinjas,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Wger,
        ProviderKind::ExerciseDb,
        ProviderKind::ApiNinjas,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Wger => "wger",
            ProviderKind::ExerciseDb => "exercisedb",
            ProviderKind::ApiNinjas => "ninjas",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wger" => Ok(ProviderKind::Wger),
            "exercisedb" => Ok(ProviderKind::ExerciseDb),
            "ninjas" | "api-ninjas" | "apininjas" => Ok(ProviderKind::ApiNinjas),
            other => bail!(
                "Unknown provider: '{}'. Available: wger, exercisedb, ninjas",
                other
            ),
        }
    }
}

/// Parse a comma-separated provider list, keeping the given order and
/// dropping repeats.
pub fn parse_provider_list(csv: &str) -> anyhow::Result<Vec<ProviderKind>> {
    let mut out = Vec::new();
    for part in csv.split(',').filter(|p| !p.trim().is_empty()) {
        let kind: ProviderKind = part.parse()?;
        if !out.contains(&kind) {
            out.push(kind);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Gif,
    Video,
}

/// A single piece of media attached to an exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub kind: MediaKind,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl MediaItem {
    pub fn new(kind: MediaKind, url: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            thumbnail: None,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }
}

/// Append `items` to `media`, skipping URLs already present, until `cap`
/// entries are held. Returns how many items were added.
pub fn append_media<I>(media: &mut Vec<MediaItem>, items: I, cap: usize) -> usize
where
    I: IntoIterator<Item = MediaItem>,
{
    let mut added = 0;
    for item in items {
        if media.len() >= cap {
            break;
        }
        if item.url.is_empty() || media.iter().any(|m| m.url == item.url) {
            continue;
        }
        media.push(item);
        added += 1;
    }
    added
}

/// Canonical difficulty scale. Unknown values are never guessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Difficulty {
    #[default]
    Unknown,
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Unknown => "",
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }

    /// Parse a stored value. Anything unrecognized is `Unknown`.
    pub fn from_stored(s: &str) -> Self {
        match s {
            "beginner" => Difficulty::Beginner,
            "intermediate" => Difficulty::Intermediate,
            "advanced" => Difficulty::Advanced,
            _ => Difficulty::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Difficulty::Unknown
    }
}

/// One provider's unmerged observation of a real-world exercise.
///
/// Produced by a provider adapter from a live response and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntity {
    pub provider: ProviderKind,
    pub provider_id: String,
    pub name: String,
    /// Plain text; adapters strip HTML before yielding.
    pub description: String,
    /// Raw provider category, possibly empty.
    pub category: String,
    /// Label used when no canonical category can be derived.
    pub fallback_category: Option<String>,
    pub primary_muscles: Vec<String>,
    pub tags: Vec<String>,
    pub equipment: Vec<String>,
    pub difficulty: String,
    pub media: Vec<MediaItem>,
}

impl CandidateEntity {
    /// A candidate with only identity and name set.
    pub fn new(provider: ProviderKind, provider_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider,
            provider_id: provider_id.into(),
            name: name.into(),
            description: String::new(),
            category: String::new(),
            fallback_category: None,
            primary_muscles: Vec::new(),
            tags: Vec::new(),
            equipment: Vec::new(),
            difficulty: String::new(),
            media: Vec::new(),
        }
    }

    /// `"<provider>:<providerId>"`.
    pub fn alt_id(&self) -> String {
        format!("{}:{}", self.provider, self.provider_id)
    }
}

/// A candidate mapped onto the canonical vocabulary, with its dedup key.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCandidate {
    pub signature: String,
    pub provider: ProviderKind,
    pub alt_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub muscles: Vec<String>,
    pub equipment: Vec<String>,
    pub difficulty: Difficulty,
    pub media: Vec<MediaItem>,
}

/// The merged, persisted record for one real-world exercise.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEntity {
    pub signature: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub muscles: Vec<String>,
    pub equipment: Vec<String>,
    pub difficulty: Difficulty,
    pub media: Vec<MediaItem>,
    pub sources: BTreeSet<String>,
    pub alt_ids: BTreeSet<String>,
    /// Unix seconds; set on first insert only.
    pub created_at: i64,
    /// Unix seconds; set on every write.
    pub updated_at: i64,
}

impl CanonicalEntity {
    /// Seed a canonical record from the first candidate seen for its signature.
    pub fn seed(candidate: NormalizedCandidate) -> Self {
        let mut media = Vec::new();
        append_media(&mut media, candidate.media, MEDIA_CAP);
        Self {
            signature: candidate.signature,
            name: candidate.name,
            description: candidate.description,
            category: candidate.category,
            muscles: candidate.muscles,
            equipment: candidate.equipment,
            difficulty: candidate.difficulty,
            media,
            sources: BTreeSet::from([candidate.provider.to_string()]),
            alt_ids: BTreeSet::from([candidate.alt_id]),
            created_at: 0,
            updated_at: 0,
        }
    }

    /// True when every field except the timestamps matches `other`.
    pub fn same_content(&self, other: &CanonicalEntity) -> bool {
        self.signature == other.signature
            && self.name == other.name
            && self.description == other.description
            && self.category == other.category
            && self.muscles == other.muscles
            && self.equipment == other.equipment
            && self.difficulty == other.difficulty
            && self.media == other.media
            && self.sources == other.sources
            && self.alt_ids == other.alt_ids
    }
}

/// Result of writing one canonical entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// A near-miss pair of signatures queued for human review.
#[derive(Debug, Clone, PartialEq)]
pub struct PossibleDuplicate {
    pub left: String,
    pub right: String,
    pub similarity: f64,
}
