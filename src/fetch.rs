//! Retrying HTTP/JSON client shared by every provider and media adapter.
//!
//! # Retry Strategy
//!
//! Each attempt carries the hard timeout configured in `[http].timeout_secs`.
//! Between attempts the client sleeps a fixed `[http].backoff_ms`.
//! - Timeout, connection error, body read error → retry
//! - Any non-2xx status → retry
//! - 2xx with a body that does not parse → fail immediately ([`FetchError::Malformed`])
//!
//! Adapters that receive a JSON array decode it element by element with
//! [`decode_items`], so one bad record costs that record only.
//!
//! The client holds no state besides the connection pool inside
//! [`reqwest::Client`], so it is cheap to clone into pool workers.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::HttpConfig;

/// Errors surfaced by [`HttpClient::fetch_json`].
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url} after {attempts} attempt(s)")]
    Timeout { url: String, attempts: u32 },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {url}: {message}")]
    Malformed { url: String, message: String },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } | FetchError::Network { .. } | FetchError::Status { .. } => true,
            FetchError::Malformed { .. } => false,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Timeout { url, .. }
            | FetchError::Network { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::Malformed { url, .. } => url,
        }
    }
}

/// Extra headers and query parameters for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }
}

/// JSON GET client with per-attempt timeout and fixed-backoff retry.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    backoff: Duration,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            backoff: Duration::from_millis(config.backoff_ms),
            max_retries: config.max_retries,
        })
    }

    /// GET `url` and decode the body as `T`, using the configured retry budget.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<T, FetchError> {
        self.fetch_json(url, options, self.max_retries).await
    }

    /// GET `url` and decode the body as `T`, retrying transient failures up
    /// to `max_retries` times.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        options: &RequestOptions,
        max_retries: u32,
    ) -> Result<T, FetchError> {
        let mut last_err = None;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.backoff).await;
            }

            match self.attempt(url, options, attempt + 1).await {
                Ok(bytes) => {
                    return serde_json::from_slice(&bytes).map_err(|e| {
                        tracing::warn!(url = %url, error = %e, "malformed JSON response");
                        FetchError::Malformed {
                            url: url.to_string(),
                            message: e.to_string(),
                        }
                    });
                }
                Err(e) if e.is_transient() => {
                    tracing::debug!(url = %url, attempt = attempt + 1, error = %e, "transient fetch failure");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let err = last_err.unwrap_or_else(|| FetchError::Network {
            url: url.to_string(),
            message: "no attempts made".to_string(),
        });
        tracing::warn!(url = %url, attempts = max_retries + 1, error = %err, "giving up after retries");
        Err(err)
    }

    /// One request; returns the raw body of a 2xx response.
    async fn attempt(
        &self,
        url: &str,
        options: &RequestOptions,
        attempt: u32,
    ) -> Result<Vec<u8>, FetchError> {
        let mut request = self.client.get(url).query(&options.query);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify(url, attempt, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify(url, attempt, e))?;
        Ok(bytes.to_vec())
    }
}

/// Decode every element of a JSON array on its own. A record that does not
/// match `T` becomes a [`FetchError::Malformed`] naming its index, and the
/// rest of the array is still decoded.
pub fn decode_items<T: DeserializeOwned>(url: &str, items: Vec<Value>) -> Vec<Result<T, FetchError>> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|e| {
                tracing::warn!(url = %url, index, error = %e, "malformed record skipped");
                FetchError::Malformed {
                    url: url.to_string(),
                    message: format!("record {}: {}", index, e),
                }
            })
        })
        .collect()
}

fn classify(url: &str, attempts: u32, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            attempts,
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push('…');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let status = |status| FetchError::Status {
            url: "u".into(),
            status,
            body: String::new(),
        };
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(status(408).is_transient());
        assert!(status(404).is_transient());
        assert!(!FetchError::Malformed {
            url: "u".into(),
            message: "eof".into()
        }
        .is_transient());
        assert!(FetchError::Timeout {
            url: "u".into(),
            attempts: 1
        }
        .is_transient());
    }

    #[test]
    fn test_decode_items_keeps_good_records() {
        #[derive(Debug, serde::Deserialize)]
        struct Row {
            name: String,
        }

        let items = vec![
            serde_json::json!({"name": "Good One"}),
            serde_json::json!({"name": null}),
            serde_json::json!({"name": "Good Two"}),
        ];
        let decoded = decode_items::<Row>("http://x/list", items);
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].as_ref().unwrap().name, "Good One");
        match &decoded[1] {
            Err(FetchError::Malformed { url, message }) => {
                assert_eq!(url, "http://x/list");
                assert!(message.starts_with("record 1:"));
            }
            other => panic!("expected malformed record, got {:?}", other),
        }
        assert_eq!(decoded[2].as_ref().unwrap().name, "Good Two");
    }

    #[test]
    fn test_truncate_keeps_short_bodies() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }

    #[test]
    fn test_request_options_builder() {
        let opts = RequestOptions::new()
            .header("X-Api-Key", "k")
            .query("offset", 20);
        assert_eq!(opts.headers, vec![("X-Api-Key".to_string(), "k".to_string())]);
        assert_eq!(opts.query, vec![("offset".to_string(), "20".to_string())]);
    }
}
