//! Podcast discovery: directory search and feed enumeration.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::validate_and_normalize_url;

pub mod feed;

pub use feed::parse_feed;

pub const ITUNES_SEARCH_ENDPOINT: &str = "https://itunes.apple.com/search";

/// One playable episode from a podcast feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub guid: String,
    pub podcast: String,
    pub title: String,
    pub audio_url: String,
    pub published: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub duration_secs: Option<u64>,
}

/// A podcast as listed by the search directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Podcast {
    pub name: String,
    pub feed_url: String,
    pub author: Option<String>,
    pub episode_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    collection_name: Option<String>,
    feed_url: Option<String>,
    artist_name: Option<String>,
    track_count: Option<u64>,
}

/// Directory entries missing a name or feed URL are unusable downstream and
/// are dropped here.
fn podcasts_from_results(results: Vec<SearchResult>) -> Vec<Podcast> {
    results
        .into_iter()
        .filter_map(|result| {
            Some(Podcast {
                name: result.collection_name?,
                feed_url: result.feed_url?,
                author: result.artist_name,
                episode_count: result.track_count,
            })
        })
        .collect()
}

/// Searches the podcast directory and enumerates feed episodes.
///
/// Feed results are memoized per feed URL in a map owned by this instance,
/// so repeated lookups within one invocation fetch each feed at most once.
pub struct DiscoveryClient {
    client: reqwest::Client,
    search_endpoint: String,
    feed_cache: HashMap<String, Vec<Episode>>,
}

impl DiscoveryClient {
    pub fn new() -> Result<Self> {
        Self::with_cache(ITUNES_SEARCH_ENDPOINT, HashMap::new())
    }

    pub fn with_cache(
        search_endpoint: impl Into<String>,
        feed_cache: HashMap<String, Vec<Episode>>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("podsift")
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            search_endpoint: search_endpoint.into(),
            feed_cache,
        })
    }

    /// Search the directory for podcasts matching `term`.
    pub async fn search(&self, term: &str, limit: usize) -> Result<Vec<Podcast>> {
        let url = format!(
            "{}?media=podcast&limit={}&term={}",
            self.search_endpoint,
            limit,
            urlencoding::encode(term)
        );
        tracing::debug!(%url, "searching podcast directory");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("podcast search request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("podcast search returned HTTP {status}");
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("malformed podcast search response")?;

        Ok(podcasts_from_results(parsed.results))
    }

    /// List the episodes of the feed at `feed_url`, newest first as the feed
    /// orders them.
    pub async fn episodes(&mut self, feed_url: &str) -> Result<Vec<Episode>> {
        if let Some(cached) = self.feed_cache.get(feed_url) {
            tracing::debug!(feed = %feed_url, "feed cache hit");
            return Ok(cached.clone());
        }

        let episodes = self.fetch_feed(feed_url).await?;
        self.feed_cache
            .insert(feed_url.to_string(), episodes.clone());
        Ok(episodes)
    }

    async fn fetch_feed(&self, feed_url: &str) -> Result<Vec<Episode>> {
        let url = validate_and_normalize_url(feed_url)?;
        tracing::debug!(feed = %url, "fetching feed");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("feed request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("feed returned HTTP {status}: {feed_url}");
        }

        let content = response.text().await.context("failed to read feed body")?;
        parse_feed(&content)
    }
}
