use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{MAX_EXCERPT_CHARS, SearchProvider, build_client};
use crate::error::ProviderError;
use crate::types::{SearchResult, truncate_chars};

const NAME: &str = "bing";
const DEFAULT_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";

/// Bing Web Search API. Needs a subscription key.
pub struct BingProvider {
    client: Client,
    api_key: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct BingResponse {
    #[serde(rename = "webPages")]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<WebPage>,
}

#[derive(Debug, Deserialize)]
struct WebPage {
    url: Option<String>,
    snippet: Option<String>,
}

impl BingProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(NAME, timeout)?,
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Point the provider at a different endpoint (self-hosted proxy, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for BingProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let count = max_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
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
        parse_response(&body, max_results)
    }
}

/// Extract `(url, snippet)` pairs from a Bing JSON body.
pub fn parse_response(body: &str, max_results: usize) -> Result<Vec<SearchResult>, ProviderError> {
    let parsed: BingResponse = serde_json::from_str(body).map_err(|e| ProviderError::Decode {
        provider: NAME,
        reason: e.to_string(),
    })?;

    Ok(parsed
        .web_pages
        .map(|pages| pages.value)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|page| {
            let url = page.url.filter(|u| !u.is_empty())?;
            let snippet = page.snippet.unwrap_or_default();
            Some(SearchResult::new(
                url,
                truncate_chars(&snippet, MAX_EXCERPT_CHARS),
            ))
        })
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_web_pages() {
        let body = r#"{
            "webPages": {"value": [
                {"url": "https://react.dev/blog", "snippet": "React 19 is now stable."},
                {"url": "https://github.com/facebook/react/releases", "snippet": null},
                {"snippet": "no url, skipped"}
            ]}
        }"#;
        let results = parse_response(body, 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://react.dev/blog");
        assert_eq!(results[0].excerpt, "React 19 is now stable.");
        assert_eq!(results[1].excerpt, "");
    }

    #[test]
    fn missing_web_pages_is_empty_not_error() {
        let results = parse_response(r#"{"_type":"SearchResponse"}"#, 5).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn malformed_body_is_decode_error() {
        let err = parse_response("<html>", 5).unwrap_err();
        assert!(matches!(err, ProviderError::Decode { provider: "bing", .. }));
    }

    #[test]
    fn long_snippets_are_capped() {
        let long = "x".repeat(MAX_EXCERPT_CHARS + 50);
        let body = serde_json::json!({
            "webPages": {"value": [{"url": "https://a.example", "snippet": long}]}
        })
        .to_string();
        let results = parse_response(&body, 1).unwrap();
        assert_eq!(results[0].excerpt.chars().count(), MAX_EXCERPT_CHARS);
    }
}
