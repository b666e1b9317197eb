//! Web search enrichment over a Serper-style search API.
//!
//! The query combines the candidate's name with their title and location so
//! the top organic results are likely to be the candidate's own public
//! profiles. Result titles and snippets are folded into one summary.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use hireflow_core::{defaults, Candidate, Error, Result};

use crate::source::{EnrichmentSource, FetchedProfile, SourceOutcome};

/// Cache key of this source.
pub const WEB_SEARCH_SOURCE: &str = "web_search";

/// Hosts preferred as the profile URL when present in the results.
const PROFILE_HOSTS: &[&str] = &["linkedin.com/in/", "github.com/", "gitlab.com/"];

/// Configuration for the web search source.
#[derive(Debug, Clone)]
pub struct WebSearchConfig {
    /// Search endpoint (POST, JSON body `{q, num}`).
    pub api_url: String,
    /// API key; enrichment falls back to local summaries without one.
    pub api_key: Option<String>,
    /// Organic results requested per query.
    pub results: u32,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::SEARCH_API_URL.to_string(),
            api_key: None,
            results: defaults::SEARCH_RESULTS,
            timeout_seconds: defaults::ENRICHMENT_TIMEOUT_SECS,
        }
    }
}

impl WebSearchConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `ENRICHMENT_SEARCH_API_KEY` | unset |
    /// | `ENRICHMENT_SEARCH_URL` | `https://google.serper.dev/search` |
    /// | `ENRICHMENT_SEARCH_RESULTS` | `5` |
    /// | `ENRICHMENT_TIMEOUT` | `10` |
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            api_url: std::env::var("ENRICHMENT_SEARCH_URL").unwrap_or(base.api_url),
            api_key: std::env::var("ENRICHMENT_SEARCH_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            results: std::env::var("ENRICHMENT_SEARCH_RESULTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(base.results),
            timeout_seconds: std::env::var("ENRICHMENT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(base.timeout_seconds),
        }
    }

    /// Whether a credential is present.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    snippet: Option<String>,
}

/// Enrichment source backed by a web search API.
pub struct WebSearchSource {
    client: Client,
    config: WebSearchConfig,
    api_key: String,
}

impl WebSearchSource {
    /// Create the source; fails without an API key.
    pub fn new(config: WebSearchConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| Error::Config("ENRICHMENT_SEARCH_API_KEY is not set".to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// Create from environment; `None` when no credential is configured.
    pub fn from_env() -> Result<Option<Self>> {
        let config = WebSearchConfig::from_env();
        if !config.is_configured() {
            return Ok(None);
        }
        Self::new(config).map(Some)
    }

    pub fn config(&self) -> &WebSearchConfig {
        &self.config
    }
}

/// Query used to find a candidate's public profiles.
pub fn build_query(candidate: &Candidate) -> String {
    let mut query = format!("\"{}\"", candidate.full_name.trim());
    for part in [&candidate.current_title, &candidate.location]
        .into_iter()
        .flatten()
    {
        let part = part.trim();
        if !part.is_empty() {
            query.push(' ');
            query.push_str(part);
        }
    }
    query
}

fn summarize(results: &[OrganicResult]) -> String {
    results
        .iter()
        .map(|r| match r.snippet.as_deref().map(str::trim) {
            Some(snippet) if !snippet.is_empty() => format!("- {}: {}", r.title.trim(), snippet),
            _ => format!("- {}", r.title.trim()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn pick_profile_url(results: &[OrganicResult]) -> Option<String> {
    results
        .iter()
        .find(|r| PROFILE_HOSTS.iter().any(|host| r.link.contains(host)))
        .or_else(|| results.first())
        .map(|r| r.link.clone())
        .filter(|link| !link.is_empty())
}

#[async_trait]
impl EnrichmentSource for WebSearchSource {
    fn name(&self) -> &str {
        WEB_SEARCH_SOURCE
    }

    fn description(&self) -> &str {
        "Public web search for the candidate's name, title and location (professional profiles, talks, publications)"
    }

    #[instrument(skip(self, candidate), fields(subsystem = "enrichment", component = "web_search", candidate_id = %candidate.id))]
    async fn fetch(&self, candidate: &Candidate) -> Result<SourceOutcome> {
        let query = build_query(candidate);
        debug!(url = %self.config.api_url, "Sending search request");

        let response = self
            .client
            .post(&self.config.api_url)
            .header("X-API-KEY", &self.api_key)
            .json(&SearchRequest {
                q: &query,
                num: self.config.results,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Enrichment(format!(
                        "Search request timed out after {}s",
                        self.config.timeout_seconds
                    ))
                } else {
                    Error::Enrichment(format!("Search request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(SourceOutcome::NotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Search API returned an error status");
            return Err(Error::Enrichment(format!(
                "Search API returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Enrichment(format!("Unreadable search response: {}", e)))?;
        let parsed: SearchResponse = serde_json::from_value(raw.clone())
            .map_err(|e| Error::Enrichment(format!("Unexpected search response shape: {}", e)))?;

        let results: Vec<OrganicResult> = parsed
            .organic
            .into_iter()
            .filter(|r| !r.title.trim().is_empty())
            .take(self.config.results as usize)
            .collect();
        debug!(result_count = results.len(), "Search completed");

        if results.is_empty() {
            return Ok(SourceOutcome::NotFound);
        }
        Ok(SourceOutcome::Found(FetchedProfile {
            profile_url: pick_profile_url(&results),
            raw_data: Some(raw),
            summary: summarize(&results),
        }))
    }
}
