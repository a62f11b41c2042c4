//! Storage abstraction for canonical exercise entities.
//!
//! The [`EntityStore`] trait is the seam between the upsert writer and a
//! concrete backend. [`SqliteStore`](sqlite::SqliteStore) is what the CLI
//! uses; [`InMemoryStore`](memory::InMemoryStore) backs tests.
//!
//! Both backends share [`reconcile`], so the write policy is identical:
//!
//! | Field | On update |
//! |-------|-----------|
//! | `name`, `description`, `category` | incoming value if non-empty |
//! | `muscles`, `equipment` | incoming list if non-empty |
//! | `difficulty` | incoming value if known |
//! | `media` | persisted first, then incoming, by URL, capped at [`MEDIA_CAP`] |
//! | `sources`, `alt_ids` | union |
//! | `created_at` | preserved |
//! | `updated_at` | `now`, only when something above changed |

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{append_media, CanonicalEntity, PossibleDuplicate, UpsertOutcome, MEDIA_CAP};

/// Abstract storage backend for canonical entities.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_batch`](EntityStore::upsert_batch) | Reconcile and write a batch atomically |
/// | [`get`](EntityStore::get) | Fetch one entity by signature |
/// | [`signatures_with_media`](EntityStore::signatures_with_media) | Signatures that already hold media |
/// | [`record_duplicates`](EntityStore::record_duplicates) | Queue near-duplicate pairs for review |
/// | [`list_duplicates`](EntityStore::list_duplicates) | Read the review queue |
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Reconcile each entity against its persisted row and write the batch
    /// in one transaction. Either every row in the batch is written or none
    /// is. Outcomes come back in input order.
    async fn upsert_batch(&self, entities: &[CanonicalEntity], now: i64) -> Result<Vec<UpsertOutcome>>;

    async fn get(&self, signature: &str) -> Result<Option<CanonicalEntity>>;

    async fn signatures_with_media(&self) -> Result<HashSet<String>>;

    /// Insert pairs not already queued. Returns how many were new.
    async fn record_duplicates(&self, pairs: &[PossibleDuplicate], now: i64) -> Result<usize>;

    async fn list_duplicates(&self) -> Result<Vec<PossibleDuplicate>>;
}

/// Apply the write policy of `incoming` over `existing`.
///
/// Returns the row to persist and what kind of write it is. On
/// [`UpsertOutcome::Unchanged`] the returned row equals `existing`.
pub fn reconcile(
    existing: Option<&CanonicalEntity>,
    incoming: &CanonicalEntity,
    now: i64,
) -> (CanonicalEntity, UpsertOutcome) {
    let Some(existing) = existing else {
        let mut row = incoming.clone();
        row.media.truncate(MEDIA_CAP);
        row.created_at = now;
        row.updated_at = now;
        return (row, UpsertOutcome::Inserted);
    };

    let mut row = existing.clone();
    overwrite_text(&mut row.name, &incoming.name);
    overwrite_text(&mut row.description, &incoming.description);
    overwrite_text(&mut row.category, &incoming.category);
    if !incoming.muscles.is_empty() {
        row.muscles = incoming.muscles.clone();
    }
    if !incoming.equipment.is_empty() {
        row.equipment = incoming.equipment.clone();
    }
    if incoming.difficulty.is_known() {
        row.difficulty = incoming.difficulty;
    }
    append_media(&mut row.media, incoming.media.iter().cloned(), MEDIA_CAP);
    row.sources.extend(incoming.sources.iter().cloned());
    row.alt_ids.extend(incoming.alt_ids.iter().cloned());

    if row.same_content(existing) {
        return (existing.clone(), UpsertOutcome::Unchanged);
    }
    row.updated_at = now;
    (row, UpsertOutcome::Updated)
}

fn overwrite_text(field: &mut String, incoming: &str) {
    let incoming = incoming.trim();
    if !incoming.is_empty() && field != incoming {
        *field = incoming.to_string();
    }
}
