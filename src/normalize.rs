//! Vocabulary normalization and signature computation.
//!
//! Maps each provider's free-text category, muscle, equipment and difficulty
//! labels onto one canonical vocabulary, and derives the dedup signature:
//!
//! ```text
//! signature = fold(name) + "|" + lower(trim(category))
//! ```
//!
//! `fold` unifies typographic Unicode (curly quotes, dash variants,
//! non-breaking and zero-width spaces), lowercases, and joins the words with
//! `-`, so `"Push-Up"`, `"push up"` and `"Push‑Up "` all fold to `"push-up"`.
//!
//! Two candidates with the same folded name and category are always the same
//! exercise, even when their providers disagree on muscles or equipment.
//!
//! # Category resolution
//!
//! 1. The raw category, if it is a known alias of a canonical category.
//! 2. Ordered rules over the muscle and tag labels; first rule that matches wins.
//! 3. The provider's fallback label (or the raw category), lowercased with
//!    every non-letter removed.
//! 4. `"other"`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{CandidateEntity, Difficulty, NormalizedCandidate};

/// Category used when nothing else can be derived.
pub const OTHER_CATEGORY: &str = "other";

static CATEGORY_ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let groups: &[(&str, &[&str])] = &[
        ("chest", &["chest", "pecs", "pectorals"]),
        (
            "back",
            &["back", "lats", "upper back", "middle back", "lower back", "traps"],
        ),
        ("shoulders", &["shoulders", "delts", "deltoids"]),
        (
            "arms",
            &["arms", "upper arms", "lower arms", "biceps", "triceps", "forearms"],
        ),
        (
            "legs",
            &[
                "legs",
                "upper legs",
                "lower legs",
                "calves",
                "glutes",
                "quadriceps",
                "hamstrings",
            ],
        ),
        ("core", &["core", "abs", "waist", "abdominals"]),
        ("cardio", &["cardio"]),
    ];
    alias_table(groups)
});

static CATEGORY_RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("chest", r"\b(chest|pector\w*|pecs?)\b"),
        ("back", r"\b(lats?|latissimus|back|traps?|trapezius|rhomboids?|erector\w*)\b"),
        ("shoulders", r"\b(shoulders?|delts?|deltoid\w*)\b"),
        (
            "legs",
            r"\b(quad\w*|hamstrings?|glute\w*|calf|calves|adductors?|abductors?|legs?|femoris|gastrocnemius|soleus)\b",
        ),
        ("arms", r"\b(biceps|triceps|forearms?|brachi\w*)\b"),
        ("core", r"\b(abs|abdom\w*|obliques?|core|waist)\b"),
        ("cardio", r"\b(cardio|aerobic)\b"),
    ]
    .into_iter()
    .map(|(category, pattern)| (category, Regex::new(pattern).expect("category rule regex")))
    .collect()
});

static MUSCLE_ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let groups: &[(&str, &[&str])] = &[
        ("chest", &["chest", "pecs", "pectorals", "pectoralis major", "upper chest"]),
        (
            "shoulders",
            &["shoulders", "delts", "deltoid", "deltoids", "anterior deltoid", "rear deltoids"],
        ),
        ("triceps", &["triceps", "triceps brachii"]),
        ("biceps", &["biceps", "biceps brachii"]),
        ("forearms", &["forearms", "brachioradialis", "wrist flexors", "wrist extensors"]),
        ("lats", &["lats", "latissimus dorsi"]),
        ("traps", &["traps", "trapezius"]),
        ("upper back", &["upper back", "middle back", "rhomboids"]),
        ("lower back", &["lower back", "erector spinae"]),
        ("abs", &["abs", "abdominals", "rectus abdominis"]),
        ("obliques", &["obliques", "obliquus externus abdominis"]),
        ("quads", &["quads", "quadriceps", "quadriceps femoris"]),
        ("hamstrings", &["hamstrings", "biceps femoris"]),
        ("glutes", &["glutes", "gluteus maximus"]),
        ("calves", &["calves", "gastrocnemius", "soleus"]),
    ];
    alias_table(groups)
});

static EQUIPMENT_ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    let groups: &[(&str, &[&str])] = &[
        (
            "body weight",
            &["body weight", "bodyweight", "body only", "none", "none (bodyweight exercise)"],
        ),
        ("barbell", &["barbell", "olympic barbell"]),
        ("ez bar", &["ez bar", "ez barbell", "sz-bar", "e-z curl bar", "ez curl bar"]),
        ("dumbbell", &["dumbbell", "dumbbells"]),
        ("kettlebell", &["kettlebell", "kettlebells"]),
        ("band", &["band", "bands", "resistance band"]),
        ("stability ball", &["stability ball", "swiss ball", "exercise ball"]),
        ("cable", &["cable", "cables"]),
        ("machine", &["machine", "leverage machine"]),
        ("bench", &["bench", "incline bench"]),
        ("pull-up bar", &["pull-up bar", "pull up bar"]),
        ("mat", &["mat", "gym mat"]),
    ];
    alias_table(groups)
});

static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("html tag regex"));

fn alias_table(groups: &[(&'static str, &[&'static str])]) -> HashMap<&'static str, &'static str> {
    let mut table = HashMap::new();
    for (canonical, aliases) in groups {
        for alias in *aliases {
            table.insert(*alias, *canonical);
        }
    }
    table
}

/// Lowercase, turn `_` into spaces, trim and collapse inner whitespace.
fn label_key(label: &str) -> String {
    label
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a candidate onto canonical vocabulary and compute its signature.
pub fn normalize(candidate: &CandidateEntity) -> NormalizedCandidate {
    let category = resolve_category(candidate);
    let name = candidate.name.trim().to_string();

    NormalizedCandidate {
        signature: signature(&name, &category),
        provider: candidate.provider,
        alt_id: candidate.alt_id(),
        name,
        description: candidate.description.trim().to_string(),
        category,
        muscles: canonical_list(&candidate.primary_muscles, canonical_muscle),
        equipment: canonical_list(&candidate.equipment, canonical_equipment),
        difficulty: map_difficulty(&candidate.difficulty),
        media: candidate.media.clone(),
    }
}

/// The canonical category for a raw provider category, if it is a known alias.
pub fn canonical_category(raw: &str) -> Option<&'static str> {
    CATEGORY_ALIASES.get(label_key(raw).as_str()).copied()
}

/// Infer a category from free-text muscle/tag labels.
pub fn infer_category<'a, I>(labels: I) -> Option<&'static str>
where
    I: IntoIterator<Item = &'a String>,
{
    let text = labels
        .into_iter()
        .map(|l| label_key(l))
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return None;
    }
    CATEGORY_RULES
        .iter()
        .find(|(_, rule)| rule.is_match(&text))
        .map(|(category, _)| *category)
}

/// Resolve the canonical category of a candidate (see module docs).
pub fn resolve_category(candidate: &CandidateEntity) -> String {
    if let Some(category) = canonical_category(&candidate.category) {
        return category.to_string();
    }
    if let Some(category) = infer_category(candidate.primary_muscles.iter().chain(&candidate.tags)) {
        return category.to_string();
    }
    let fallback = candidate
        .fallback_category
        .as_deref()
        .map(letters_only)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| letters_only(&candidate.category));
    if fallback.is_empty() {
        OTHER_CATEGORY.to_string()
    } else {
        fallback
    }
}

/// Lowercase and drop every character that is not a letter.
pub fn letters_only(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn canonical_muscle(label: &str) -> String {
    let key = label_key(label);
    MUSCLE_ALIASES
        .get(key.as_str())
        .map(|c| c.to_string())
        .unwrap_or(key)
}

pub fn canonical_equipment(label: &str) -> String {
    let key = label_key(label);
    EQUIPMENT_ALIASES
        .get(key.as_str())
        .map(|c| c.to_string())
        .unwrap_or(key)
}

/// Map each label, dropping blanks and repeats while keeping first-seen order.
fn canonical_list(labels: &[String], map: fn(&str) -> String) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let value = map(label);
        if !value.is_empty() && !out.contains(&value) {
            out.push(value);
        }
    }
    out
}

/// Case-insensitive substring match onto the canonical difficulty scale.
pub fn map_difficulty(raw: &str) -> Difficulty {
    let s = raw.to_lowercase();
    if s.contains("begin") {
        Difficulty::Beginner
    } else if s.contains("inter") || s.contains("medium") {
        Difficulty::Intermediate
    } else if s.contains("adv") || s.contains("expert") {
        Difficulty::Advanced
    } else {
        Difficulty::Unknown
    }
}

/// Fold a display name into its signature form.
pub fn fold_name(name: &str) -> String {
    let unified: String = name
        .chars()
        .filter_map(|c| match c {
            '\u{200B}'..='\u{200D}' | '\u{FEFF}' | '\u{00AD}' => None,
            '\u{2018}' | '\u{2019}' | '\u{201B}' | '\u{2032}' | '`' => Some('\''),
            '\u{201C}' | '\u{201D}' | '\u{2033}' => Some('"'),
            '\u{2010}'..='\u{2015}' | '\u{2212}' => Some('-'),
            c if c.is_whitespace() => Some(' '),
            c => Some(c),
        })
        .collect();

    unified
        .to_lowercase()
        .split([' ', '-', '_'])
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// The dedup key for a name and an already-resolved category.
pub fn signature(name: &str, category: &str) -> String {
    format!("{}|{}", fold_name(name), category.trim().to_lowercase())
}

/// Strip HTML tags, decode the common entities and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let text = HTML_TAG.replace_all(html, " ");
    let decoded = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
