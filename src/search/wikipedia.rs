use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::Html;
use serde::Deserialize;
use tracing::debug;

use super::{MAX_EXCERPT_CHARS, SearchProvider, build_client};
use crate::error::ProviderError;
use crate::types::{SearchResult, truncate_chars};

const NAME: &str = "wikipedia";
const DEFAULT_API: &str = "https://en.wikipedia.org/w/api.php";
const PAGE_URL: &str = "https://en.wikipedia.org/?curid=";

/// Characters of plain-text extract requested per page.
const EXTRACT_CHARS: usize = 2000;

/// English Wikipedia via the MediaWiki action API.
///
/// One search request, then one extract request per hit. A failed extract
/// falls back to the search snippet for that page.
pub struct WikipediaProvider {
    client: Client,
    api: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
pub struct SearchHit {
    pub pageid: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: HashMap<String, ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    #[serde(default)]
    extract: String,
}

impl WikipediaProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(NAME, timeout)?,
            api: DEFAULT_API.to_string(),
        })
    }

    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = api.into();
        self
    }

    async fn fetch_extract(&self, pageid: u64) -> Result<String, ProviderError> {
        let pageid = pageid.to_string();
        let exchars = EXTRACT_CHARS.to_string();
        let response = self
            .client
            .get(&self.api)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("format", "json"),
                ("pageids", pageid.as_str()),
                ("exchars", exchars.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, e))?;

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, e))?;
        parse_extract(&body, &pageid)
    }
}

#[async_trait]
impl SearchProvider for WikipediaProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let limit = max_results.to_string();
        let response = self
            .client
            .get(&self.api)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("format", "json"),
                ("srlimit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                provider: NAME,
                status,
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, e))?;
        let hits = parse_search(&body)?;

        let mut results = Vec::with_capacity(hits.len().min(max_results));
        for hit in hits.into_iter().take(max_results) {
            let extract = match self.fetch_extract(hit.pageid).await {
                Ok(text) => text,
                Err(e) => {
                    debug!(pageid = hit.pageid, title = %hit.title, "extract unavailable: {e}");
                    String::new()
                }
            };
            let text = if extract.trim().is_empty() {
                strip_markup(&hit.snippet)
            } else {
                extract
            };
            results.push(SearchResult::new(
                format!("{PAGE_URL}{}", hit.pageid),
                truncate_chars(&text, MAX_EXCERPT_CHARS),
            ));
        }
        Ok(results)
    }
}

/// Parse the `list=search` response into hits.
pub fn parse_search(body: &str) -> Result<Vec<SearchHit>, ProviderError> {
    let parsed: SearchResponse = serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        provider: NAME,
        reason: e.to_string(),
    })?;
    Ok(parsed.query.map(|q| q.search).unwrap_or_default())
}

/// Parse a `prop=extracts` response for a single page.
pub fn parse_extract(body: &str, pageid: &str) -> Result<String, ProviderError> {
    let parsed: ExtractResponse = serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        provider: NAME,
        reason: e.to_string(),
    })?;
    Ok(parsed
        .query
        .and_then(|mut q| q.pages.remove(pageid))
        .map(|p| p.extract)
        .unwrap_or_default())
}

/// Search snippets carry `<span class="searchmatch">` highlighting.
fn strip_markup(fragment: &str) -> String {
    Html::parse_fragment(fragment)
        .root_element()
        .text()
        .collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_hits() {
        let body = r#"{"batchcomplete":"","query":{"searchinfo":{"totalhits":2},"search":[
            {"ns":0,"title":"Rust (programming language)","pageid":29414838,"snippet":"<span class=\"searchmatch\">Rust</span> is a language"},
            {"ns":0,"title":"Rust","pageid":26336,"snippet":"iron oxide"}
        ]}}"#;
        let hits = parse_search(body).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].pageid, 29414838);
        assert_eq!(hits[1].title, "Rust");
    }

    #[test]
    fn search_without_query_block_is_empty() {
        assert!(parse_search(r#"{"batchcomplete":""}"#).unwrap().is_empty());
        assert!(parse_search("not json").is_err());
    }

    #[test]
    fn parses_extract_for_page() {
        let body = r#"{"query":{"pages":{"26336":{"pageid":26336,"title":"Rust","extract":"Rust is an iron oxide."}}}}"#;
        assert_eq!(parse_extract(body, "26336").unwrap(), "Rust is an iron oxide.");
        assert_eq!(parse_extract(body, "1").unwrap(), "");
    }

    #[test]
    fn strips_search_highlighting() {
        assert_eq!(
            strip_markup(r#"<span class="searchmatch">Rust</span> is a language"#),
            "Rust is a language"
        );
    }
}
