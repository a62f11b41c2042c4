//! Extension traits for catalog providers and media sources.
//!
//! Every external API the harvester talks to sits behind one of two traits:
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │           ProviderRegistry             │
//! │  ┌──────┐ ┌────────────┐ ┌──────────┐  │
//! │  │ wger │ │ ExerciseDB │ │ Ninjas   │  │   CatalogProvider::list_all
//! │  └──────┘ └────────────┘ └──────────┘  │
//! └──────────────┬─────────────────────────┘
//!                ▼
//!         run_ingest() → normalize → merge
//!                ▼
//! ┌────────────────────────────────────────┐
//! │           MediaRegistry                │
//! │  ┌─────────┐ ┌────────┐                │   MediaSource::search
//! │  │ YouTube │ │ Giphy  │                │
//! │  └─────────┘ └────────┘                │
//! └────────────────────────────────────────┘
//! ```
//!
//! Tests and embedders can register their own implementations in place of
//! the built-in HTTP adapters.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::cache::LookupCache;
use crate::config::Config;
use crate::fetch::HttpClient;
use crate::models::{CandidateEntity, MediaItem, ProviderKind};
use crate::pool::WorkerPool;

// ═══════════════════════════════════════════════════════════════════════
// CatalogProvider Trait
// ═══════════════════════════════════════════════════════════════════════

/// An external exercise catalog.
///
/// # Contract
///
/// [`list_all`](CatalogProvider::list_all) returns a lazy, finite stream:
/// each page is fetched only when the stream is polled past the previous
/// one, and dropping the stream stops fetching. Calling it again starts over
/// from the first page; nothing is resumed across runs.
///
/// - The stream ends when the provider reports no further page, when a page
///   comes back empty, or once `limit_max` candidates have been yielded.
/// - A disabled provider (missing credentials) yields nothing.
/// - An `Err` item reports a page that could not be fetched, or a single
///   record that did not parse. The stream may keep going afterwards;
///   consumers count the error and poll on.
pub trait CatalogProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Returns a one-line description for `harvest sources`.
    fn description(&self) -> &str;

    /// Whether the provider has what it needs to run (API key, enabled flag).
    fn is_enabled(&self) -> bool;

    fn list_all(&self, limit_max: usize) -> BoxStream<'_, Result<CandidateEntity>>;
}

// ═══════════════════════════════════════════════════════════════════════
// MediaSource Trait
// ═══════════════════════════════════════════════════════════════════════

/// A secondary provider searched for media when a record has none.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Short name, used in cache keys and as [`MediaItem::source`].
    fn name(&self) -> &str;

    fn is_enabled(&self) -> bool;

    /// Search for media matching an exercise name.
    async fn search(&self, exercise_name: &str) -> Result<Vec<MediaItem>>;
}

/// Shared handles the built-in adapters are constructed with.
#[derive(Clone)]
pub struct AdapterContext {
    pub http: HttpClient,
    pub cache: Arc<LookupCache>,
    pub pool: WorkerPool,
}

// ═══════════════════════════════════════════════════════════════════════
// Registries
// ═══════════════════════════════════════════════════════════════════════

/// Registry for catalog providers, in merge priority order.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn CatalogProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Build the registry for `kinds`, in that order, from the config.
    pub fn from_config(config: &Config, kinds: &[ProviderKind], ctx: &AdapterContext) -> Self {
        use crate::provider_exercisedb::ExerciseDbProvider;
        use crate::provider_ninjas::NinjasProvider;
        use crate::provider_wger::WgerProvider;

        let mut registry = Self::new();
        for kind in kinds {
            match kind {
                ProviderKind::Wger => registry.register(Box::new(WgerProvider::new(
                    config.providers.wger.clone(),
                    ctx.clone(),
                ))),
                ProviderKind::ExerciseDb => registry.register(Box::new(ExerciseDbProvider::new(
                    config.providers.exercisedb.clone(),
                    ctx.http.clone(),
                ))),
                ProviderKind::ApiNinjas => registry.register(Box::new(NinjasProvider::new(
                    config.providers.ninjas.clone(),
                    ctx.http.clone(),
                ))),
            }
        }
        registry
    }

    /// Register a provider. Registration order is merge priority order.
    pub fn register(&mut self, provider: Box<dyn CatalogProvider>) {
        self.providers.push(provider);
    }

    pub fn providers(&self) -> &[Box<dyn CatalogProvider>] {
        &self.providers
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry for media sources, queried in registration order.
pub struct MediaRegistry {
    sources: Vec<Arc<dyn MediaSource>>,
}

impl MediaRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// The built-in YouTube and Giphy sources.
    pub fn from_config(config: &Config, http: &HttpClient) -> Self {
        use crate::media_giphy::GiphySource;
        use crate::media_youtube::YoutubeSource;

        let mut registry = Self::new();
        registry.register(Arc::new(YoutubeSource::new(
            config.media.youtube.clone(),
            http.clone(),
        )));
        registry.register(Arc::new(GiphySource::new(
            config.media.giphy.clone(),
            http.clone(),
        )));
        registry
    }

    pub fn register(&mut self, source: Arc<dyn MediaSource>) {
        self.sources.push(source);
    }

    /// Only the sources that can run.
    pub fn enabled(&self) -> Vec<Arc<dyn MediaSource>> {
        self.sources
            .iter()
            .filter(|s| s.is_enabled())
            .cloned()
            .collect()
    }
}

impl Default for MediaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
