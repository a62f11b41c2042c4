//! Giphy gif search media source.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::GiphyConfig;
use crate::fetch::{HttpClient, RequestOptions};
use crate::models::{MediaItem, MediaKind};
use crate::traits::MediaSource;

#[derive(Debug, Deserialize)]
struct GiphyResponse {
    #[serde(default)]
    data: Vec<GiphyGif>,
}

#[derive(Debug, Deserialize)]
struct GiphyGif {
    images: GiphyImages,
}

#[derive(Debug, Deserialize)]
struct GiphyImages {
    original: GiphyRendition,
    #[serde(default)]
    fixed_width_still: Option<GiphyRendition>,
}

#[derive(Debug, Deserialize)]
struct GiphyRendition {
    url: String,
}

pub struct GiphySource {
    config: GiphyConfig,
    http: HttpClient,
    api_key: Option<String>,
}

impl GiphySource {
    pub fn new(config: GiphyConfig, http: HttpClient) -> Self {
        let api_key = config.resolved_key();
        Self {
            config,
            http,
            api_key,
        }
    }
}

#[async_trait]
impl MediaSource for GiphySource {
    fn name(&self) -> &str {
        "giphy"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, exercise_name: &str) -> Result<Vec<MediaItem>> {
        let Some(key) = self.api_key.as_deref() else {
            return Ok(Vec::new());
        };
        let url = format!("{}/v1/gifs/search", self.config.base_url.trim_end_matches('/'));
        let options = RequestOptions::new()
            .query("api_key", key)
            .query("q", format!("{} exercise", exercise_name))
            .query("limit", self.config.max_results);

        let response: GiphyResponse = self
            .http
            .get_json(&url, &options)
            .await
            .with_context(|| format!("giphy search for '{}'", exercise_name))?;

        Ok(response
            .data
            .into_iter()
            .filter(|gif| !gif.images.original.url.is_empty())
            .map(|gif| {
                let still = gif.images.fixed_width_still.map(|s| s.url);
                MediaItem::new(MediaKind::Gif, gif.images.original.url)
                    .with_thumbnail(still)
                    .with_source("giphy")
            })
            .collect())
    }
}
