//! ExerciseDB catalog provider (RapidAPI).
//!
//! Pages through `GET /exercises?limit=<n>&offset=<k>` with the
//! `X-RapidAPI-Key` / `X-RapidAPI-Host` headers. A page shorter than the
//! requested size is the last one. Records are decoded one by one, so a
//! malformed record is reported and the rest of its page still comes through.
//!
//! # Configuration
//!
//! ```toml
//! [providers.exercisedb]
//! base_url = "https://exercisedb.p.rapidapi.com"
//! host = "exercisedb.p.rapidapi.com"
//! page_size = 50
//! api_key_env = "EXERCISEDB_API_KEY"
//! ```
//!
//! Without a key the provider is disabled and yields nothing.

use anyhow::{Context, Result};
use futures::stream::{self, BoxStream};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ExerciseDbConfig;
use crate::fetch::{decode_items, HttpClient, RequestOptions};
use crate::models::{CandidateEntity, MediaItem, MediaKind, ProviderKind};
use crate::normalize::strip_html;
use crate::traits::CatalogProvider;

/// Offset-paginated adapters give up after this many failed pages in a row.
pub(crate) const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExerciseDbExercise {
    id: String,
    name: String,
    body_part: String,
    target: String,
    #[serde(default)]
    equipment: String,
    #[serde(default)]
    secondary_muscles: Vec<String>,
    #[serde(default)]
    gif_url: Option<String>,
    #[serde(default)]
    instructions: Vec<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
}

pub struct ExerciseDbProvider {
    config: ExerciseDbConfig,
    http: HttpClient,
    api_key: Option<String>,
}

impl ExerciseDbProvider {
    pub fn new(config: ExerciseDbConfig, http: HttpClient) -> Self {
        let api_key = config.resolved_key();
        Self {
            config,
            http,
            api_key,
        }
    }

    /// One page of raw records, with the URL they came from.
    async fn fetch_page(&self, key: &str, limit: usize, offset: usize) -> Result<(String, Vec<Value>)> {
        let url = format!("{}/exercises", self.config.base_url.trim_end_matches('/'));
        let options = RequestOptions::new()
            .header("X-RapidAPI-Key", key)
            .header("X-RapidAPI-Host", self.config.host.clone())
            .query("limit", limit)
            .query("offset", offset);

        let records = self
            .http
            .get_json::<Vec<Value>>(&url, &options)
            .await
            .with_context(|| format!("exercisedb page at offset {}", offset))?;
        Ok((format!("{}?offset={}", url, offset), records))
    }
}

impl CatalogProvider for ExerciseDbProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ExerciseDb
    }

    fn description(&self) -> &str {
        "ExerciseDB via RapidAPI (gif demonstrations)"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn list_all(&self, limit_max: usize) -> BoxStream<'_, Result<CandidateEntity>> {
        let Some(key) = self.api_key.clone() else {
            return Box::pin(stream::empty());
        };
        let page_size = self.config.page_size;

        Box::pin(async_stream::stream! {
            let mut offset = 0usize;
            let mut yielded = 0usize;
            let mut failures = 0u32;

            while yielded < limit_max {
                let want = page_size.min(limit_max - yielded);
                match self.fetch_page(&key, want, offset).await {
                    Ok((url, page)) => {
                        failures = 0;
                        let received = page.len();
                        if received == 0 {
                            break;
                        }
                        for record in decode_items::<ExerciseDbExercise>(&url, page) {
                            if yielded >= limit_max {
                                break;
                            }
                            match record {
                                Ok(raw) => {
                                    yielded += 1;
                                    yield Ok(to_candidate(raw));
                                }
                                Err(e) => {
                                    yield Err(anyhow::Error::new(e).context("exercisedb exercise skipped"));
                                }
                            }
                        }
                        if received < want {
                            break;
                        }
                        offset += received;
                    }
                    Err(e) => {
                        failures += 1;
                        yield Err(e);
                        if failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                            tracing::warn!(provider = "exercisedb", offset, "too many failed pages, stopping");
                            break;
                        }
                        offset += want;
                    }
                }
            }
        })
    }
}

fn to_candidate(raw: ExerciseDbExercise) -> CandidateEntity {
    let description = match raw.description.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => strip_html(text),
        _ => strip_html(&raw.instructions.join(" ")),
    };

    let mut muscles = vec![raw.target];
    muscles.extend(raw.secondary_muscles);

    let mut candidate = CandidateEntity::new(ProviderKind::ExerciseDb, raw.id, raw.name);
    candidate.description = description;
    candidate.category = raw.body_part.clone();
    candidate.tags = vec![raw.body_part];
    candidate.primary_muscles = muscles;
    if !raw.equipment.trim().is_empty() {
        candidate.equipment = vec![raw.equipment];
    }
    candidate.difficulty = raw.difficulty.unwrap_or_default();
    if let Some(url) = raw.gif_url.filter(|u| !u.is_empty()) {
        candidate.media = vec![MediaItem::new(MediaKind::Gif, url).with_source("exercisedb")];
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use futures::StreamExt;

    #[test]
    fn test_maps_raw_exercise() {
        let raw: ExerciseDbExercise = serde_json::from_value(serde_json::json!({
            "id": "0001",
            "name": "3/4 sit-up",
            "bodyPart": "waist",
            "equipment": "body weight",
            "gifUrl": "https://v2.exercisedb.io/image/abc",
            "target": "abs",
            "secondaryMuscles": ["hip flexors", "lower back"],
            "instructions": ["Lie flat on your back.", "Curl up."]
        }))
        .unwrap();

        let c = to_candidate(raw);
        assert_eq!(c.provider_id, "0001");
        assert_eq!(c.category, "waist");
        assert_eq!(c.primary_muscles, vec!["abs", "hip flexors", "lower back"]);
        assert_eq!(c.equipment, vec!["body weight"]);
        assert_eq!(c.description, "Lie flat on your back. Curl up.");
        assert_eq!(c.media.len(), 1);
        assert_eq!(c.media[0].kind, MediaKind::Gif);
        assert_eq!(c.alt_id(), "exercisedb:0001");
    }

    #[test]
    fn test_missing_required_field_fails_closed() {
        let parsed: Result<ExerciseDbExercise, _> = serde_json::from_value(serde_json::json!({
            "id": "0002",
            "name": "no body part"
        }));
        assert!(parsed.is_err());
    }

    #[tokio::test]
    async fn test_missing_key_yields_nothing() {
        let config = ExerciseDbConfig {
            api_key: None,
            api_key_env: "HARVEST_TEST_DEFINITELY_UNSET".to_string(),
            ..ExerciseDbConfig::default()
        };
        let provider = ExerciseDbProvider::new(config, HttpClient::new(&HttpConfig::default()).unwrap());
        assert!(!provider.is_enabled());
        let items: Vec<_> = provider.list_all(100).collect().await;
        assert!(items.is_empty());
    }
}
