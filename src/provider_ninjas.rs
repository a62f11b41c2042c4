//! API Ninjas catalog provider.
//!
//! The API only lists exercises per muscle, so the provider walks the
//! configured `muscles` list and pages each one with
//! `GET /v1/exercises?muscle=<m>&offset=<n>` (fixed page size of 10).
//! Records carry no id; the folded name is used as the provider id, and an
//! exercise listed under several muscles is yielded once. A malformed record
//! is reported and skipped; the rest of its page still comes through.
//!
//! ```toml
//! [providers.ninjas]
//! base_url = "https://api.api-ninjas.com"
//! muscles = ["chest", "biceps", "quadriceps"]
//! api_key_env = "API_NINJAS_KEY"
//! ```

use std::collections::HashSet;

use anyhow::{Context, Result};
use futures::stream::{self, BoxStream};
use serde::Deserialize;
use serde_json::Value;

use crate::config::NinjasConfig;
use crate::fetch::{decode_items, HttpClient, RequestOptions};
use crate::models::{CandidateEntity, ProviderKind};
use crate::normalize::{fold_name, strip_html};
use crate::provider_exercisedb::MAX_CONSECUTIVE_PAGE_FAILURES;
use crate::traits::CatalogProvider;

/// Page size fixed by the upstream API.
const NINJAS_PAGE_SIZE: usize = 10;

#[derive(Debug, Deserialize)]
struct NinjasExercise {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    muscle: String,
    #[serde(default)]
    equipment: String,
    #[serde(default)]
    difficulty: String,
    #[serde(default)]
    instructions: String,
}

pub struct NinjasProvider {
    config: NinjasConfig,
    http: HttpClient,
    api_key: Option<String>,
}

impl NinjasProvider {
    pub fn new(config: NinjasConfig, http: HttpClient) -> Self {
        let api_key = config.resolved_key();
        Self {
            config,
            http,
            api_key,
        }
    }

    /// One page of raw records, with the URL they came from.
    async fn fetch_page(&self, key: &str, muscle: &str, offset: usize) -> Result<(String, Vec<Value>)> {
        let url = format!("{}/v1/exercises", self.config.base_url.trim_end_matches('/'));
        let options = RequestOptions::new()
            .header("X-Api-Key", key)
            .query("muscle", muscle)
            .query("offset", offset);

        let records = self
            .http
            .get_json::<Vec<Value>>(&url, &options)
            .await
            .with_context(|| format!("ninjas muscle '{}' at offset {}", muscle, offset))?;
        Ok((format!("{}?muscle={}&offset={}", url, muscle, offset), records))
    }
}

impl CatalogProvider for NinjasProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ApiNinjas
    }

    fn description(&self) -> &str {
        "API Ninjas exercises, listed per muscle"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn list_all(&self, limit_max: usize) -> BoxStream<'_, Result<CandidateEntity>> {
        let Some(key) = self.api_key.clone() else {
            return Box::pin(stream::empty());
        };

        Box::pin(async_stream::stream! {
            let mut seen = HashSet::new();
            let mut yielded = 0usize;

            'muscles: for muscle in &self.config.muscles {
                let mut offset = 0usize;
                let mut failures = 0u32;

                loop {
                    if yielded >= limit_max {
                        break 'muscles;
                    }
                    let (url, page) = match self.fetch_page(&key, muscle, offset).await {
                        Ok(fetched) => {
                            failures = 0;
                            fetched
                        }
                        Err(e) => {
                            failures += 1;
                            yield Err(e);
                            if failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                                tracing::warn!(provider = "ninjas", muscle = %muscle, "too many failed pages, next muscle");
                                break;
                            }
                            offset += NINJAS_PAGE_SIZE;
                            continue;
                        }
                    };

                    let received = page.len();
                    for record in decode_items::<NinjasExercise>(&url, page) {
                        if yielded >= limit_max {
                            break 'muscles;
                        }
                        let raw = match record {
                            Ok(raw) => raw,
                            Err(e) => {
                                yield Err(anyhow::Error::new(e).context("ninjas exercise skipped"));
                                continue;
                            }
                        };
                        let candidate = to_candidate(raw);
                        if candidate.provider_id.is_empty() || !seen.insert(candidate.provider_id.clone()) {
                            continue;
                        }
                        yielded += 1;
                        yield Ok(candidate);
                    }
                    if received < NINJAS_PAGE_SIZE {
                        break;
                    }
                    offset += received;
                }
            }
        })
    }
}

fn to_candidate(raw: NinjasExercise) -> CandidateEntity {
    let provider_id = fold_name(&raw.name);
    let mut candidate = CandidateEntity::new(ProviderKind::ApiNinjas, provider_id, raw.name);
    candidate.description = strip_html(&raw.instructions);
    candidate.primary_muscles = vec![raw.muscle.clone()];
    candidate.tags = vec![raw.muscle];
    if !raw.kind.trim().is_empty() {
        candidate.fallback_category = Some(raw.kind);
    }
    if !raw.equipment.trim().is_empty() {
        candidate.equipment = vec![raw.equipment];
    }
    candidate.difficulty = raw.difficulty;
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_raw_exercise() {
        let raw: NinjasExercise = serde_json::from_value(serde_json::json!({
            "name": "Incline Hammer Curls",
            "type": "strength",
            "muscle": "biceps",
            "equipment": "dumbbell",
            "difficulty": "beginner",
            "instructions": "Seat yourself on an incline bench."
        }))
        .unwrap();

        let c = to_candidate(raw);
        assert_eq!(c.provider_id, "incline-hammer-curls");
        assert_eq!(c.alt_id(), "ninjas:incline-hammer-curls");
        assert!(c.category.is_empty());
        assert_eq!(c.fallback_category.as_deref(), Some("strength"));
        assert_eq!(c.primary_muscles, vec!["biceps"]);
        assert_eq!(c.equipment, vec!["dumbbell"]);
        assert_eq!(c.difficulty, "beginner");
    }

    #[test]
    fn test_missing_muscle_fails_closed() {
        let parsed: Result<NinjasExercise, _> =
            serde_json::from_value(serde_json::json!({ "name": "Curl" }));
        assert!(parsed.is_err());
    }
}
