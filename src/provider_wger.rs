//! wger catalog provider.
//!
//! Lists exercises from `GET /api/v2/exercise/?language=<id>&limit=<n>` and
//! follows the `next` URL of each page. Exercises reference muscles,
//! equipment and categories by id; the three reference tables are fetched
//! once through the worker pool and kept in the [`LookupCache`] for
//! `[cache].ttl_secs`.
//!
//! # Locale fallback
//!
//! If the first page in the configured `language` holds fewer than
//! [`LOCALE_MIN_RESULTS`] exercises (or fewer than were asked for, when the
//! page size is smaller), the first page is fetched again in
//! `fallback_language` and whichever is richer is followed to the end.
//!
//! Pages are decoded as an envelope of raw JSON records. A record that does
//! not match the exercise schema is reported and skipped without losing the
//! page's `next` pointer.
//!
//! # Configuration
//!
//! ```toml
//! [providers.wger]
//! enabled = true
//! base_url = "https://wger.de"
//! language = 2            # English
//! fallback_language = 2
//! page_size = 50
//! # api_key_env = "WGER_API_KEY"   # optional, sent as `Authorization: Token <key>`
//! ```
//!
//! [`LookupCache`]: crate::cache::LookupCache

use std::collections::HashMap;

use anyhow::{Context, Result};
use futures::stream::{self, BoxStream};
use serde::Deserialize;
use serde_json::Value;

use crate::config::WgerConfig;
use crate::fetch::{decode_items, RequestOptions};
use crate::models::{CandidateEntity, ProviderKind};
use crate::normalize::strip_html;
use crate::traits::{AdapterContext, CatalogProvider};

/// A localized first page with fewer results than this triggers the fallback language.
pub const LOCALE_MIN_RESULTS: usize = 5;

const REFERENCE_TABLES: [&str; 3] = ["muscle", "equipment", "exercisecategory"];

#[derive(Debug, Deserialize)]
struct WgerPage<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

/// One page of exercise records, not yet decoded, with the URL it came from.
struct ExercisePage {
    url: String,
    next: Option<String>,
    results: Vec<Value>,
}

impl ExercisePage {
    fn new(url: String, page: WgerPage<Value>) -> Self {
        Self {
            url,
            next: page.next,
            results: page.results,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WgerExercise {
    id: u64,
    name: String,
    #[serde(default)]
    description: String,
    category: u64,
    #[serde(default)]
    muscles: Vec<u64>,
    #[serde(default)]
    muscles_secondary: Vec<u64>,
    #[serde(default)]
    equipment: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct WgerNamedRow {
    id: u64,
    name: String,
    #[serde(default)]
    name_en: Option<String>,
}

/// Reference tables resolved from ids to display names.
#[derive(Debug, Default)]
struct Taxonomy {
    muscles: HashMap<u64, String>,
    equipment: HashMap<u64, String>,
    categories: HashMap<u64, String>,
}

impl Taxonomy {
    fn names(table: &HashMap<u64, String>, ids: &[u64]) -> Vec<String> {
        ids.iter().filter_map(|id| table.get(id).cloned()).collect()
    }
}

pub struct WgerProvider {
    config: WgerConfig,
    ctx: AdapterContext,
    api_key: Option<String>,
}

impl WgerProvider {
    pub fn new(config: WgerConfig, ctx: AdapterContext) -> Self {
        let api_key = config.resolved_key();
        Self {
            config,
            ctx,
            api_key,
        }
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn auth(&self) -> RequestOptions {
        match &self.api_key {
            Some(key) => RequestOptions::new().header("Authorization", format!("Token {}", key)),
            None => RequestOptions::new(),
        }
    }

    async fn load_taxonomy(&self) -> Result<Taxonomy> {
        let ttl = self.ctx.cache.default_ttl();
        // Boxed as `dyn Future + Send` to work around rustc's higher-ranked
        // lifetime limitation when proving `Send` for the enclosing stream.
        let tables: std::pin::Pin<
            Box<dyn std::future::Future<Output = Result<Vec<(&'static str, HashMap<u64, String>)>>> + Send + '_>,
        > = Box::pin(self
            .ctx
            .pool
            .run_required("wger reference tables", REFERENCE_TABLES, |table: &'static str| async move {
                let cache_key = format!("wger:{}:{}", self.base(), table);
                let rows: HashMap<u64, String> = self
                    .ctx
                    .cache
                    .get_or_fetch(&cache_key, ttl, || self.fetch_table(table))
                    .await?;
                Ok((table, rows))
            }));
        let tables = tables.await?;

        let mut taxonomy = Taxonomy::default();
        for (table, rows) in tables {
            match table {
                "muscle" => taxonomy.muscles = rows,
                "equipment" => taxonomy.equipment = rows,
                _ => taxonomy.categories = rows,
            }
        }
        Ok(taxonomy)
    }

    async fn fetch_table(&self, table: &str) -> Result<HashMap<u64, String>> {
        let url = format!("{}/api/v2/{}/", self.base(), table);
        let options = self.auth().query("limit", 500).query("format", "json");
        let page: WgerPage<WgerNamedRow> = self
            .ctx
            .http
            .get_json(&url, &options)
            .await
            .with_context(|| format!("wger {} table", table))?;

        tracing::debug!(table, rows = page.results.len(), "loaded wger reference table");
        Ok(page
            .results
            .into_iter()
            .map(|row| {
                let name = row.name_en.filter(|n| !n.trim().is_empty()).unwrap_or(row.name);
                (row.id, name)
            })
            .collect())
    }

    async fn first_page(&self, language: u32, limit: usize) -> Result<ExercisePage> {
        let url = format!("{}/api/v2/exercise/", self.base());
        let options = self
            .auth()
            .query("language", language)
            .query("limit", limit)
            .query("format", "json");
        let page: WgerPage<Value> = self
            .ctx
            .http
            .get_json(&url, &options)
            .await
            .with_context(|| format!("wger first page (language {})", language))?;
        Ok(ExercisePage::new(format!("{}?language={}", url, language), page))
    }

    /// First page in the configured language, or the fallback language if
    /// that one is richer.
    async fn localized_first_page(&self, limit: usize) -> Result<ExercisePage> {
        let preferred = self.first_page(self.config.language, limit).await;
        let fallback_language = self.config.fallback_language;
        if fallback_language == self.config.language {
            return preferred;
        }

        let enough = LOCALE_MIN_RESULTS.min(limit);
        let sparse = match &preferred {
            Ok(page) => page.results.len() < enough,
            Err(_) => true,
        };
        if !sparse {
            return preferred;
        }

        tracing::info!(
            language = self.config.language,
            fallback_language,
            "sparse localized results, querying fallback language"
        );
        match (preferred, self.first_page(fallback_language, limit).await) {
            (Ok(p), Ok(f)) if f.results.len() > p.results.len() => Ok(f),
            (Ok(p), _) => Ok(p),
            (Err(_), Ok(f)) => Ok(f),
            (Err(e), Err(_)) => Err(e),
        }
    }

    async fn page_at(&self, url: &str) -> Result<ExercisePage> {
        let page: WgerPage<Value> = self
            .ctx
            .http
            .get_json(url, &self.auth())
            .await
            .with_context(|| format!("wger page {}", url))?;
        Ok(ExercisePage::new(url.to_string(), page))
    }
}

impl CatalogProvider for WgerProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Wger
    }

    fn description(&self) -> &str {
        "wger open exercise database"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn list_all(&self, limit_max: usize) -> BoxStream<'_, Result<CandidateEntity>> {
        if !self.config.enabled || limit_max == 0 {
            return Box::pin(stream::empty());
        }
        let page_size = self.config.page_size.min(limit_max);

        Box::pin(async_stream::stream! {
            let taxonomy = match self.load_taxonomy().await {
                Ok(t) => t,
                Err(e) => {
                    yield Err(e.context("wger reference tables unavailable, ids left unresolved"));
                    Taxonomy::default()
                }
            };

            let mut page = match self.localized_first_page(page_size).await {
                Ok(page) => page,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut yielded = 0usize;
            loop {
                if page.results.is_empty() {
                    break;
                }
                for record in decode_items::<WgerExercise>(&page.url, page.results) {
                    if yielded >= limit_max {
                        break;
                    }
                    match record {
                        Ok(raw) => {
                            yielded += 1;
                            yield Ok(to_candidate(raw, &taxonomy));
                        }
                        Err(e) => {
                            yield Err(anyhow::Error::new(e).context("wger exercise skipped"));
                        }
                    }
                }
                if yielded >= limit_max {
                    break;
                }
                let Some(next) = page.next.filter(|n| !n.is_empty()) else {
                    break;
                };
                page = match self.page_at(&next).await {
                    Ok(p) => p,
                    Err(e) => {
                        // The following page is only reachable through this one.
                        yield Err(e);
                        break;
                    }
                };
            }
        })
    }
}

fn to_candidate(raw: WgerExercise, taxonomy: &Taxonomy) -> CandidateEntity {
    let mut candidate = CandidateEntity::new(ProviderKind::Wger, raw.id.to_string(), raw.name);
    candidate.description = strip_html(&raw.description);
    candidate.category = taxonomy
        .categories
        .get(&raw.category)
        .cloned()
        .unwrap_or_default();
    candidate.primary_muscles = Taxonomy::names(&taxonomy.muscles, &raw.muscles);
    candidate.tags = Taxonomy::names(&taxonomy.muscles, &raw.muscles_secondary);
    candidate.equipment = Taxonomy::names(&taxonomy.equipment, &raw.equipment);
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy {
            muscles: HashMap::from([(4, "Chest".to_string()), (5, "Triceps".to_string())]),
            equipment: HashMap::from([(7, "none (bodyweight exercise)".to_string())]),
            categories: HashMap::from([(11, "Chest".to_string())]),
        }
    }

    #[test]
    fn test_maps_ids_through_taxonomy() {
        let raw: WgerExercise = serde_json::from_value(serde_json::json!({
            "id": 123,
            "uuid": "abc",
            "name": "Push-Up",
            "description": "<p>Keep your body <em>straight</em>.</p>",
            "category": 11,
            "muscles": [4, 99],
            "muscles_secondary": [5],
            "equipment": [7],
            "language": 2
        }))
        .unwrap();

        let c = to_candidate(raw, &taxonomy());
        assert_eq!(c.provider_id, "123");
        assert_eq!(c.category, "Chest");
        assert_eq!(c.primary_muscles, vec!["Chest"]);
        assert_eq!(c.tags, vec!["Triceps"]);
        assert_eq!(c.equipment, vec!["none (bodyweight exercise)"]);
        assert_eq!(c.description, "Keep your body straight .");
    }

    #[test]
    fn test_unknown_category_id_left_empty() {
        let raw: WgerExercise = serde_json::from_value(serde_json::json!({
            "id": 1, "name": "Mystery", "category": 404
        }))
        .unwrap();
        let c = to_candidate(raw, &Taxonomy::default());
        assert!(c.category.is_empty());
        assert!(c.primary_muscles.is_empty());
    }
}
