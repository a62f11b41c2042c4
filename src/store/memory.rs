//! In-memory [`EntityStore`] implementation for tests.
//!
//! Uses `BTreeMap` behind `std::sync::RwLock`. A batch is reconciled against
//! a snapshot and swapped in under one write lock, so it is atomic like the
//! SQLite transaction.

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{CanonicalEntity, PossibleDuplicate, UpsertOutcome};

use super::{reconcile, EntityStore};

/// In-memory store for tests and dry runs.
pub struct InMemoryStore {
    entities: RwLock<BTreeMap<String, CanonicalEntity>>,
    duplicates: RwLock<BTreeMap<(String, String), f64>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(BTreeMap::new()),
            duplicates: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn upsert_batch(&self, entities: &[CanonicalEntity], now: i64) -> Result<Vec<UpsertOutcome>> {
        let mut stored = self.entities.write().map_err(poisoned)?;
        let mut outcomes = Vec::with_capacity(entities.len());
        let mut staged: BTreeMap<String, CanonicalEntity> = BTreeMap::new();

        for incoming in entities {
            let existing = staged
                .get(&incoming.signature)
                .or_else(|| stored.get(&incoming.signature));
            let (row, outcome) = reconcile(existing, incoming, now);
            if outcome != UpsertOutcome::Unchanged {
                staged.insert(row.signature.clone(), row);
            }
            outcomes.push(outcome);
        }

        stored.extend(staged);
        Ok(outcomes)
    }

    async fn get(&self, signature: &str) -> Result<Option<CanonicalEntity>> {
        let stored = self.entities.read().map_err(poisoned)?;
        Ok(stored.get(signature).cloned())
    }

    async fn signatures_with_media(&self) -> Result<HashSet<String>> {
        let stored = self.entities.read().map_err(poisoned)?;
        Ok(stored
            .values()
            .filter(|e| !e.media.is_empty())
            .map(|e| e.signature.clone())
            .collect())
    }

    async fn record_duplicates(&self, pairs: &[PossibleDuplicate], _now: i64) -> Result<usize> {
        let mut queue = self.duplicates.write().map_err(poisoned)?;
        let mut added = 0;
        for pair in pairs {
            let key = (pair.left.clone(), pair.right.clone());
            if !queue.contains_key(&key) {
                queue.insert(key, pair.similarity);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn list_duplicates(&self) -> Result<Vec<PossibleDuplicate>> {
        let queue = self.duplicates.read().map_err(poisoned)?;
        Ok(queue
            .iter()
            .map(|((left, right), similarity)| PossibleDuplicate {
                left: left.clone(),
                right: right.clone(),
                similarity: *similarity,
            })
            .collect())
    }
}
