//! Chunked, transactional writes of canonical entities.
//!
//! [`UpsertWriter::upsert_all`] splits the input into `batch_size` chunks and
//! hands each to [`EntityStore::upsert_batch`], which writes it in a single
//! transaction. A failing chunk is recorded in the report and the remaining
//! chunks still run; chunks already committed stay committed.

use anyhow::Result;

use crate::models::{CanonicalEntity, UpsertOutcome};
use crate::store::EntityStore;

/// A chunk whose transaction was rolled back.
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    /// Zero-based chunk index.
    pub index: usize,
    /// Number of entities in the chunk.
    pub size: usize,
    pub error: String,
}

#[derive(Debug, Default, Clone)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl UpsertReport {
    fn count(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Entities lost to failed chunks.
    pub fn failed_entities(&self) -> usize {
        self.failed_chunks.iter().map(|c| c.size).sum()
    }
}

pub struct UpsertWriter<'a> {
    store: &'a dyn EntityStore,
    batch_size: usize,
}

impl<'a> UpsertWriter<'a> {
    pub fn new(store: &'a dyn EntityStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Write one entity in its own transaction.
    pub async fn upsert(&self, entity: &CanonicalEntity) -> Result<UpsertOutcome> {
        let now = chrono::Utc::now().timestamp();
        let outcomes = self.store.upsert_batch(std::slice::from_ref(entity), now).await?;
        outcomes
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("store returned no outcome for '{}'", entity.signature))
    }

    pub async fn upsert_all(&self, entities: &[CanonicalEntity]) -> UpsertReport {
        self.upsert_all_at(entities, chrono::Utc::now().timestamp()).await
    }

    /// As [`upsert_all`](Self::upsert_all) with an explicit write timestamp.
    pub async fn upsert_all_at(&self, entities: &[CanonicalEntity], now: i64) -> UpsertReport {
        let mut report = UpsertReport::default();

        for (index, chunk) in entities.chunks(self.batch_size).enumerate() {
            match self.store.upsert_batch(chunk, now).await {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        report.count(outcome);
                    }
                }
                Err(e) => {
                    tracing::error!(chunk = index, size = chunk.len(), error = %format!("{:#}", e), "chunk write failed");
                    report.failed_chunks.push(ChunkFailure {
                        index,
                        size: chunk.len(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        report
    }
}
