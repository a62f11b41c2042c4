//! YouTube Data API v3 media source (`search.list`, videos only).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::YoutubeConfig;
use crate::fetch::{HttpClient, RequestOptions};
use crate::models::{MediaItem, MediaKind};
use crate::traits::MediaSource;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: VideoId,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoId {
    #[serde(default)]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    #[serde(default)]
    medium: Option<Thumbnail>,
    #[serde(default)]
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

pub struct YoutubeSource {
    config: YoutubeConfig,
    http: HttpClient,
    api_key: Option<String>,
}

impl YoutubeSource {
    pub fn new(config: YoutubeConfig, http: HttpClient) -> Self {
        let api_key = config.resolved_key();
        Self {
            config,
            http,
            api_key,
        }
    }
}

#[async_trait]
impl MediaSource for YoutubeSource {
    fn name(&self) -> &str {
        "youtube"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, exercise_name: &str) -> Result<Vec<MediaItem>> {
        let Some(key) = self.api_key.as_deref() else {
            return Ok(Vec::new());
        };
        let url = format!("{}/youtube/v3/search", self.config.base_url.trim_end_matches('/'));
        let options = RequestOptions::new()
            .query("part", "snippet")
            .query("type", "video")
            .query("q", format!("{} exercise", exercise_name))
            .query("maxResults", self.config.max_results)
            .query("key", key);

        let response: SearchResponse = self
            .http
            .get_json(&url, &options)
            .await
            .with_context(|| format!("youtube search for '{}'", exercise_name))?;

        Ok(to_media(response))
    }
}

fn to_media(response: SearchResponse) -> Vec<MediaItem> {
    response
        .items
        .into_iter()
        .filter_map(|item| {
            let video_id = item.id.video_id.filter(|id| !id.is_empty())?;
            let thumbnail = item
                .snippet
                .and_then(|s| s.thumbnails)
                .and_then(|t| t.medium.or(t.default))
                .map(|t| t.url);
            Some(
                MediaItem::new(
                    MediaKind::Video,
                    format!("https://www.youtube.com/watch?v={}", video_id),
                )
                .with_thumbnail(thumbnail)
                .with_source("youtube"),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_search_items() {
        let response: SearchResponse = serde_json::from_value(serde_json::json!({
            "items": [
                {
                    "id": { "kind": "youtube#video", "videoId": "abc123" },
                    "snippet": {
                        "title": "How to do a push-up",
                        "thumbnails": { "medium": { "url": "https://i.ytimg.com/vi/abc123/mqdefault.jpg" } }
                    }
                },
                { "id": { "kind": "youtube#channel", "channelId": "zzz" } }
            ]
        }))
        .unwrap();

        let media = to_media(response);
        assert_eq!(media.len(), 1);
        assert_eq!(media[0].kind, MediaKind::Video);
        assert_eq!(media[0].url, "https://www.youtube.com/watch?v=abc123");
        assert_eq!(
            media[0].thumbnail.as_deref(),
            Some("https://i.ytimg.com/vi/abc123/mqdefault.jpg")
        );
        assert_eq!(media[0].source.as_deref(), Some("youtube"));
    }
}
