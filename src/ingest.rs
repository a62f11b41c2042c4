//! Harvest pipeline orchestration.
//!
//! Coordinates one full run: providers → normalization → merge →
//! duplicate review → enrichment → upsert. Providers are drained
//! concurrently, each paging in order, and their candidates are merged in
//! registry (priority) order so the outcome does not depend on which
//! provider answered first.
//!
//! The run always finishes with a [`RunSummary`]; only setup failures
//! (bad config, unknown provider, unopenable store) are errors.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::join_all;
use futures::StreamExt;
use tokio::time::Instant;

use crate::cache::LookupCache;
use crate::config::Config;
use crate::db;
use crate::enrich::{EnrichReport, Enricher};
use crate::fetch::HttpClient;
use crate::merge::Merger;
use crate::migrate;
use crate::models::{CandidateEntity, CanonicalEntity, ProviderKind};
use crate::normalize::normalize;
use crate::pool::WorkerPool;
use crate::review::find_possible_duplicates;
use crate::store::sqlite::SqliteStore;
use crate::store::EntityStore;
use crate::traits::{AdapterContext, CatalogProvider, MediaRegistry, ProviderRegistry};
use crate::upsert::{UpsertReport, UpsertWriter};

/// Command-line overrides for a run. `None` falls back to the config file.
#[derive(Debug, Default, Clone)]
pub struct IngestOptions {
    pub providers: Option<Vec<ProviderKind>>,
    pub limit: Option<usize>,
    pub enrich: Option<bool>,
    pub db: Option<PathBuf>,
    pub dry_run: bool,
}

/// Effective knobs for one run, after overrides.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub limit: usize,
    pub enrich: bool,
    pub dry_run: bool,
    pub concurrency: usize,
    pub batch_size: usize,
    pub media_per_entity: usize,
    pub duplicate_threshold: f64,
    pub deadline: Option<Duration>,
}

impl RunSettings {
    pub fn resolve(config: &Config, opts: &IngestOptions) -> Self {
        let pipeline = &config.pipeline;
        Self {
            limit: opts.limit.unwrap_or(pipeline.limit),
            enrich: opts.enrich.unwrap_or(pipeline.enrich),
            dry_run: opts.dry_run,
            concurrency: pipeline.concurrency,
            batch_size: pipeline.batch_size,
            media_per_entity: pipeline.media_per_entity,
            duplicate_threshold: pipeline.duplicate_threshold,
            deadline: pipeline.deadline_secs.map(Duration::from_secs),
        }
    }
}

/// Per-provider counters.
#[derive(Debug, Clone)]
pub struct ProviderTally {
    pub provider: ProviderKind,
    pub enabled: bool,
    pub fetched: usize,
    pub page_errors: usize,
    /// Candidates dropped before normalization (blank names).
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub providers: Vec<ProviderTally>,
    pub merged: usize,
    pub possible_duplicates: usize,
    pub enrich: EnrichReport,
    pub upsert: UpsertReport,
    pub dry_run: bool,
    pub deadline_hit: bool,
}

impl RunSummary {
    pub fn fetched(&self) -> usize {
        self.providers.iter().map(|p| p.fetched).sum()
    }

    pub fn page_errors(&self) -> usize {
        self.providers.iter().map(|p| p.page_errors).sum()
    }

    pub fn print(&self) {
        if self.dry_run {
            println!("harvest run (dry-run)");
        } else {
            println!("harvest run");
        }
        for p in &self.providers {
            if p.enabled {
                println!(
                    "  {}: fetched {}, page errors {}, skipped {}",
                    p.provider, p.fetched, p.page_errors, p.skipped
                );
            } else {
                println!("  {}: disabled", p.provider);
            }
        }
        println!("  merged unique: {}", self.merged);
        println!("  possible duplicates: {}", self.possible_duplicates);
        println!(
            "  enriched: {} (failures {}, skipped {})",
            self.enrich.enriched, self.enrich.failed, self.enrich.skipped
        );
        if self.dry_run {
            println!("  writes skipped");
        } else {
            println!("  inserted: {}", self.upsert.inserted);
            println!("  updated: {}", self.upsert.updated);
            println!("  unchanged: {}", self.upsert.unchanged);
            println!("  failed chunks: {}", self.upsert.failed_chunks.len());
        }
        if self.deadline_hit {
            println!("  deadline reached, run cut short");
        }
        println!("ok");
    }
}

/// Run the pipeline against the configured store and print the summary.
pub async fn run_ingest(config: &Config, opts: IngestOptions) -> Result<RunSummary> {
    let kinds = match &opts.providers {
        Some(kinds) => kinds.clone(),
        None => config.pipeline.provider_kinds()?,
    };

    let mut config = config.clone();
    if let Some(path) = &opts.db {
        config.db.path = path.clone();
    }

    let pool = db::connect(&config).await?;
    migrate::apply(&pool).await?;
    let store = SqliteStore::new(pool);

    let http = HttpClient::new(&config.http)?;
    let cache = Arc::new(LookupCache::new(Duration::from_secs(config.cache.ttl_secs)));
    let ctx = AdapterContext {
        http: http.clone(),
        cache: cache.clone(),
        pool: WorkerPool::new(config.pipeline.concurrency),
    };
    let providers = ProviderRegistry::from_config(&config, &kinds, &ctx);
    let media = MediaRegistry::from_config(&config, &http);

    let settings = RunSettings::resolve(&config, &opts);
    let summary = run_ingest_with(&settings, &providers, &media, &store, cache).await;
    summary.print();

    store.pool().close().await;
    Ok(summary)
}

/// The pipeline proper, over injected providers, media sources and store.
pub async fn run_ingest_with(
    settings: &RunSettings,
    providers: &ProviderRegistry,
    media: &MediaRegistry,
    store: &dyn EntityStore,
    cache: Arc<LookupCache>,
) -> RunSummary {
    let deadline = settings.deadline.map(|d| Instant::now() + d);

    // Drain every provider at once; results come back in registry order.
    let harvests = join_all(
        providers
            .providers()
            .iter()
            .map(|p| drain(p.as_ref(), settings.limit, deadline)),
    )
    .await;

    let mut merger = Merger::new();
    let mut tallies = Vec::with_capacity(harvests.len());
    let mut deadline_hit = false;
    for harvest in harvests {
        deadline_hit |= harvest.deadline_hit;
        for candidate in &harvest.candidates {
            merger.absorb(normalize(candidate));
        }
        tallies.push(harvest.tally);
    }
    tracing::info!(absorbed = merger.absorbed(), unique = merger.len(), "merge finished");
    let mut entities = merger.finish();

    let duplicates = find_possible_duplicates(&entities, settings.duplicate_threshold);
    if !duplicates.is_empty() && !settings.dry_run {
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = store.record_duplicates(&duplicates, now).await {
            tracing::warn!(error = %format!("{:#}", e), "could not record possible duplicates");
        }
    }

    let mut enrich = EnrichReport::default();
    if settings.enrich && !deadline_hit {
        match enrich_entities(settings, media, store, cache.clone(), &mut entities, deadline).await {
            Some(report) => enrich = report,
            None => deadline_hit = true,
        }
    }

    let rows: Vec<CanonicalEntity> = entities.into_values().collect();
    let upsert = if settings.dry_run {
        UpsertReport::default()
    } else {
        UpsertWriter::new(store, settings.batch_size)
            .upsert_all(&rows)
            .await
    };

    let purged = cache.purge_expired();
    let (hits, misses) = cache.stats();
    tracing::info!(hits, misses, purged, entries = cache.len(), "lookup cache");

    RunSummary {
        providers: tallies,
        merged: rows.len(),
        possible_duplicates: duplicates.len(),
        enrich,
        upsert,
        dry_run: settings.dry_run,
        deadline_hit,
    }
}

/// Returns `None` if the deadline cut enrichment off.
async fn enrich_entities(
    settings: &RunSettings,
    media: &MediaRegistry,
    store: &dyn EntityStore,
    cache: Arc<LookupCache>,
    entities: &mut BTreeMap<String, CanonicalEntity>,
    deadline: Option<Instant>,
) -> Option<EnrichReport> {
    let sources = media.enabled();
    if sources.is_empty() {
        tracing::info!("enrichment requested but no media source is configured");
        return Some(EnrichReport::default());
    }

    let persisted = match store.signatures_with_media().await {
        Ok(set) => set,
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "could not read persisted media, assuming none");
            Default::default()
        }
    };

    let enricher = Enricher::new(
        sources,
        cache,
        WorkerPool::new(settings.concurrency),
        settings.media_per_entity,
    );
    let work = enricher.enrich(entities, &persisted);
    match deadline {
        Some(at) => match tokio::time::timeout_at(at, work).await {
            Ok(report) => Some(report),
            Err(_) => {
                tracing::warn!("deadline reached during enrichment, continuing without media");
                None
            }
        },
        None => Some(work.await),
    }
}

struct Harvest {
    tally: ProviderTally,
    candidates: Vec<CandidateEntity>,
    deadline_hit: bool,
}

async fn drain(provider: &dyn CatalogProvider, limit: usize, deadline: Option<Instant>) -> Harvest {
    let kind = provider.kind();
    let mut harvest = Harvest {
        tally: ProviderTally {
            provider: kind,
            enabled: provider.is_enabled(),
            fetched: 0,
            page_errors: 0,
            skipped: 0,
        },
        candidates: Vec::new(),
        deadline_hit: false,
    };
    if !harvest.tally.enabled {
        tracing::info!(provider = %kind, "provider disabled, skipping");
        return harvest;
    }

    let mut stream = provider.list_all(limit);
    loop {
        let next = match deadline {
            Some(at) => match tokio::time::timeout_at(at, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::warn!(provider = %kind, fetched = harvest.tally.fetched, "deadline reached, stopping provider");
                    harvest.deadline_hit = true;
                    break;
                }
            },
            None => stream.next().await,
        };

        match next {
            None => break,
            Some(Ok(candidate)) => {
                if candidate.name.trim().is_empty() {
                    tracing::warn!(provider = %kind, id = %candidate.provider_id, "skipping candidate without a name");
                    harvest.tally.skipped += 1;
                    continue;
                }
                harvest.tally.fetched += 1;
                harvest.candidates.push(candidate);
            }
            Some(Err(e)) => {
                harvest.tally.page_errors += 1;
                tracing::warn!(provider = %kind, error = %format!("{:#}", e), "page or record failed");
            }
        }
    }

    tracing::info!(
        provider = %kind,
        fetched = harvest.tally.fetched,
        page_errors = harvest.tally.page_errors,
        "provider drained"
    );
    harvest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaItem, MediaKind};
    use crate::store::memory::InMemoryStore;
    use crate::traits::MediaSource;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        kind: ProviderKind,
        items: Vec<Result<CandidateEntity, String>>,
        delay: Duration,
    }

    impl CatalogProvider for FixedProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn description(&self) -> &str {
            "fixture"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        fn list_all(&self, limit_max: usize) -> BoxStream<'_, anyhow::Result<CandidateEntity>> {
            let delay = self.delay;
            Box::pin(
                stream::iter(self.items.clone())
                    .take(limit_max)
                    .then(move |item| async move {
                        tokio::time::sleep(delay).await;
                        item.map_err(|e| anyhow::anyhow!(e))
                    }),
            )
        }
    }

    struct CountingMedia {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaSource for CountingMedia {
        fn name(&self) -> &str {
            "counting"
        }

        fn is_enabled(&self) -> bool {
            true
        }

        async fn search(&self, exercise_name: &str) -> anyhow::Result<Vec<MediaItem>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![MediaItem::new(
                MediaKind::Video,
                format!("https://video/{}", exercise_name),
            )])
        }
    }

    fn candidate(kind: ProviderKind, id: &str, name: &str, category: &str) -> CandidateEntity {
        let mut c = CandidateEntity::new(kind, id, name);
        c.category = category.to_string();
        c
    }

    fn settings() -> RunSettings {
        RunSettings::resolve(&Config::default(), &IngestOptions::default())
    }

    fn cache() -> Arc<LookupCache> {
        Arc::new(LookupCache::new(Duration::from_secs(60)))
    }

    fn registry(providers: Vec<FixedProvider>) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();
        for p in providers {
            registry.register(Box::new(p));
        }
        registry
    }

    #[tokio::test]
    async fn test_merges_in_registry_order_regardless_of_speed() {
        let mut slow = candidate(ProviderKind::Wger, "1", "Squat", "legs");
        slow.description = "From wger.".into();
        let mut fast = candidate(ProviderKind::ExerciseDb, "2", "squat", "legs");
        fast.description = "From exercisedb.".into();

        let providers = registry(vec![
            FixedProvider {
                kind: ProviderKind::Wger,
                items: vec![Ok(slow)],
                delay: Duration::from_millis(30),
            },
            FixedProvider {
                kind: ProviderKind::ExerciseDb,
                items: vec![Ok(fast)],
                delay: Duration::ZERO,
            },
        ]);
        let store = InMemoryStore::new();
        let summary =
            run_ingest_with(&settings(), &providers, &MediaRegistry::new(), &store, cache()).await;

        assert_eq!(summary.merged, 1);
        assert_eq!(summary.upsert.inserted, 1);
        let stored = store.get("squat|legs").await.unwrap().unwrap();
        assert_eq!(stored.description, "From wger.");
    }

    #[tokio::test]
    async fn test_page_errors_and_blank_names_counted() {
        let providers = registry(vec![FixedProvider {
            kind: ProviderKind::ApiNinjas,
            items: vec![
                Ok(candidate(ProviderKind::ApiNinjas, "a", "Plank", "core")),
                Err("HTTP 500".to_string()),
                Ok(candidate(ProviderKind::ApiNinjas, "b", "   ", "core")),
                Ok(candidate(ProviderKind::ApiNinjas, "c", "Crunch", "core")),
            ],
            delay: Duration::ZERO,
        }]);
        let store = InMemoryStore::new();
        let summary =
            run_ingest_with(&settings(), &providers, &MediaRegistry::new(), &store, cache()).await;

        let tally = &summary.providers[0];
        assert_eq!(tally.fetched, 2);
        assert_eq!(tally.page_errors, 1);
        assert_eq!(tally.skipped, 1);
        assert_eq!(summary.merged, 2);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let providers = registry(vec![FixedProvider {
            kind: ProviderKind::Wger,
            items: vec![Ok(candidate(ProviderKind::Wger, "1", "Lunge", "legs"))],
            delay: Duration::ZERO,
        }]);
        let store = InMemoryStore::new();
        let mut s = settings();
        s.dry_run = true;
        let summary = run_ingest_with(&s, &providers, &MediaRegistry::new(), &store, cache()).await;

        assert_eq!(summary.merged, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_unchanged_without_media_calls() {
        let make = || {
            registry(vec![FixedProvider {
                kind: ProviderKind::Wger,
                items: vec![Ok(candidate(ProviderKind::Wger, "1", "Burpee", "cardio"))],
                delay: Duration::ZERO,
            }])
        };
        let counting = Arc::new(CountingMedia {
            calls: AtomicUsize::new(0),
        });
        let mut media = MediaRegistry::new();
        media.register(counting.clone());

        let store = InMemoryStore::new();
        let mut s = settings();
        s.enrich = true;

        let first = run_ingest_with(&s, &make(), &media, &store, cache()).await;
        assert_eq!(first.upsert.inserted, 1);
        assert_eq!(first.enrich.enriched, 1);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);

        // Fresh cache: only the persisted media can prevent the lookup.
        let second = run_ingest_with(&s, &make(), &media, &store, cache()).await;
        assert_eq!(second.upsert.unchanged, 1);
        assert_eq!(second.enrich.attempted, 0);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadline_stops_slow_provider() {
        let providers = registry(vec![FixedProvider {
            kind: ProviderKind::Wger,
            items: (0..50)
                .map(|i| Ok(candidate(ProviderKind::Wger, &i.to_string(), &format!("Move {}", i), "core")))
                .collect(),
            delay: Duration::from_millis(20),
        }]);
        let store = InMemoryStore::new();
        let mut s = settings();
        s.deadline = Some(Duration::from_millis(100));
        let summary = run_ingest_with(&s, &providers, &MediaRegistry::new(), &store, cache()).await;

        assert!(summary.deadline_hit);
        assert!(summary.merged < 50);
        assert_eq!(summary.upsert.inserted, summary.merged);
    }
}
