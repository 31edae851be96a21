//! Wikipedia as a [`WebSource`].
//!
//! `search` runs a full-text search through the MediaWiki action API and then
//! fetches the REST summary of each hit with bounded concurrency; hits whose
//! summary cannot be fetched or is empty are dropped. `fetch_full_text`
//! renders the article through `action=parse` and cleans the HTML.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use tessera_core::{TesseraError, WebCandidate, WebConfig, WebSource};

use crate::html::HtmlCleaner;

/// Client for one language edition of Wikipedia.
///
/// # Examples
///
/// ```
/// use tessera_core::WebConfig;
/// use tessera_sources::wiki::WikipediaClient;
///
/// let client = WikipediaClient::with_config(&WebConfig::default()).unwrap();
/// assert_eq!(client.base_url(), "https://es.wikipedia.org");
/// ```
pub struct WikipediaClient {
    client: reqwest::Client,
    base_url: String,
    search_limit: usize,
    concurrency: usize,
    cleaner: HtmlCleaner,
}

impl std::fmt::Debug for WikipediaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WikipediaClient")
            .field("base_url", &self.base_url)
            .field("search_limit", &self.search_limit)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    extract: Option<String>,
}

#[derive(Deserialize)]
struct ParseResponse {
    #[serde(default)]
    parse: Option<ParsedPage>,
}

#[derive(Deserialize)]
struct ParsedPage {
    text: ParsedText,
}

#[derive(Deserialize)]
struct ParsedText {
    #[serde(rename = "*")]
    html: String,
}

fn unavailable(e: reqwest::Error) -> TesseraError {
    TesseraError::ExternalSourceUnavailable(format!("Wikipedia request failed: {e}"))
}

impl WikipediaClient {
    /// Create a client from a [`WebConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Config`] if the HTTP client cannot be built.
    pub fn with_config(config: &WebConfig) -> Result<Self, TesseraError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TesseraError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("https://{}.wikipedia.org", config.language),
            search_limit: config.search_limit,
            concurrency: config.concurrency.max(1),
            cleaner: HtmlCleaner::new()?,
        })
    }

    /// Point the client at another MediaWiki host.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Wiki host the client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self) -> String {
        format!("{}/w/api.php", self.base_url)
    }

    fn summary_url(&self, title: &str) -> String {
        format!(
            "{}/api/rest_v1/page/summary/{}",
            self.base_url,
            urlencoding::encode(title)
        )
    }

    async fn search_titles(&self, query: &str) -> Result<Vec<String>, TesseraError> {
        let limit = self.search_limit.to_string();
        let response = self
            .client
            .get(self.api_url())
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("format", "json"),
                ("utf8", "1"),
                ("srlimit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(TesseraError::ExternalSourceUnavailable(format!(
                "Wikipedia search returned {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(unavailable)?;
        parse_search(&body)
    }

    async fn summary(&self, title: String) -> Option<WebCandidate> {
        let response = match self.client.get(self.summary_url(&title)).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::debug!(%title, status = %r.status(), "summary unavailable");
                return None;
            }
            Err(e) => {
                tracing::debug!(%title, error = %e, "summary request failed");
                return None;
            }
        };
        let body = response.text().await.ok()?;
        let summary = parse_summary(&body)?;
        Some(WebCandidate {
            title,
            summary,
            vector: None,
        })
    }
}

fn parse_search(body: &str) -> Result<Vec<String>, TesseraError> {
    let parsed: SearchResponse = serde_json::from_str(body).map_err(|e| {
        TesseraError::ExternalSourceUnavailable(format!("malformed Wikipedia search response: {e}"))
    })?;
    Ok(parsed
        .query
        .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
        .unwrap_or_default())
}

fn parse_summary(body: &str) -> Option<String> {
    let parsed: SummaryResponse = serde_json::from_str(body).ok()?;
    parsed.extract.filter(|e| !e.trim().is_empty())
}

fn parse_article_html(body: &str) -> Result<Option<String>, TesseraError> {
    let parsed: ParseResponse = serde_json::from_str(body).map_err(|e| {
        TesseraError::ExternalSourceUnavailable(format!("malformed Wikipedia parse response: {e}"))
    })?;
    Ok(parsed.parse.map(|page| page.text.html))
}

#[async_trait]
impl WebSource for WikipediaClient {
    async fn search(&self, query: &str) -> Result<Vec<WebCandidate>, TesseraError> {
        let titles = self.search_titles(query).await?;
        tracing::debug!(query, hits = titles.len(), "wikipedia search");

        let candidates: Vec<WebCandidate> = stream::iter(titles.into_iter().map(|t| self.summary(t)))
            .buffered(self.concurrency)
            .filter_map(|c| async move { c })
            .collect()
            .await;
        Ok(candidates)
    }

    async fn fetch_full_text(&self, title: &str) -> Result<Option<String>, TesseraError> {
        let response = self
            .client
            .get(self.api_url())
            .query(&[
                ("action", "parse"),
                ("page", title),
                ("prop", "text"),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(unavailable)?;

        if !response.status().is_success() {
            return Err(TesseraError::ExternalSourceUnavailable(format!(
                "Wikipedia parse returned {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(unavailable)?;
        let Some(html) = parse_article_html(&body)? else {
            return Ok(None);
        };
        let text = self.cleaner.clean(&html);
        Ok((!text.is_empty()).then_some(text))
    }
}
