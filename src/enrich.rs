//! Media enrichment for merged entities.
//!
//! An entity is only sent to the media sources when it came out of the merge
//! with no media **and** the store holds no media for its signature either.
//! Each lookup is cached per source under `media:<source>:<signature>`, so a
//! re-run within the cache TTL makes no calls at all.
//!
//! Lookups run through [`WorkerPool::run_optional`]: one entity failing
//! leaves that entity bare and never fails the run.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;

use crate::cache::LookupCache;
use crate::models::{append_media, CanonicalEntity, MediaItem, MEDIA_CAP};
use crate::pool::WorkerPool;
use crate::traits::MediaSource;

/// Counters from one enrichment pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EnrichReport {
    /// Entities that needed media and were looked up.
    pub attempted: usize,
    /// Entities that ended up with at least one media item.
    pub enriched: usize,
    /// Entities whose every source lookup failed.
    pub failed: usize,
    /// Entities skipped because they already had media, in-run or persisted.
    pub skipped: usize,
}

pub struct Enricher {
    sources: Vec<Arc<dyn MediaSource>>,
    cache: Arc<LookupCache>,
    pool: WorkerPool,
    per_entity: usize,
}

impl Enricher {
    pub fn new(
        sources: Vec<Arc<dyn MediaSource>>,
        cache: Arc<LookupCache>,
        pool: WorkerPool,
        per_entity: usize,
    ) -> Self {
        Self {
            sources,
            cache,
            pool,
            per_entity: per_entity.min(MEDIA_CAP),
        }
    }

    /// Attach media to every entity that has none, in place.
    pub async fn enrich(
        &self,
        entities: &mut BTreeMap<String, CanonicalEntity>,
        persisted_with_media: &HashSet<String>,
    ) -> EnrichReport {
        let mut report = EnrichReport::default();

        let mut wanted = Vec::new();
        for entity in entities.values() {
            if !entity.media.is_empty() || persisted_with_media.contains(&entity.signature) {
                report.skipped += 1;
            } else {
                wanted.push((entity.signature.clone(), entity.name.clone()));
            }
        }
        if wanted.is_empty() || self.sources.is_empty() || self.per_entity == 0 {
            return report;
        }
        report.attempted = wanted.len();

        let outcome = self
            .pool
            .run_optional("media enrichment", wanted, |(signature, name)| async move {
                let media = self.lookup(&signature, &name).await?;
                Ok((signature, media))
            })
            .await;
        report.failed = outcome.failed;

        for (signature, media) in outcome.completed {
            if let Some(entity) = entities.get_mut(&signature) {
                if append_media(&mut entity.media, media, self.per_entity) > 0 {
                    report.enriched += 1;
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            enriched = report.enriched,
            failed = report.failed,
            skipped = report.skipped,
            "enrichment finished"
        );
        report
    }

    /// Query every source in order until `per_entity` items are gathered.
    /// Fails only if every source queried failed.
    async fn lookup(&self, signature: &str, name: &str) -> Result<Vec<MediaItem>> {
        let ttl = self.cache.default_ttl();
        let mut media = Vec::new();
        let mut last_err = None;
        let mut succeeded = 0usize;

        for source in &self.sources {
            if media.len() >= self.per_entity {
                break;
            }
            let key = format!("media:{}:{}", source.name(), signature);
            match self
                .cache
                .get_or_fetch(&key, ttl, || source.search(name))
                .await
            {
                Ok(items) => {
                    succeeded += 1;
                    append_media(&mut media, items, self.per_entity);
                }
                Err(e) => {
                    tracing::debug!(source = source.name(), signature, error = %format!("{:#}", e), "media lookup failed");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if succeeded == 0 => Err(e.context(format!("no media source answered for '{}'", name))),
            _ => Ok(media),
        }
    }
}
