use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};

use super::{MAX_EXCERPT_CHARS, SearchProvider, build_client};
use crate::error::ProviderError;
use crate::types::{SearchResult, truncate_chars};

const NAME: &str = "duckduckgo";
const DEFAULT_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

static RESULT_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.result__a").expect("valid selector"));
static ANY_LINK: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("valid selector"));
static SNIPPET: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".result__snippet").expect("valid selector"));

/// DuckDuckGo's HTML endpoint. Free, no key, best effort.
pub struct DuckDuckGoProvider {
    client: Client,
    endpoint: String,
}

impl DuckDuckGoProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Ok(Self {
            client: build_client(NAME, timeout)?,
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoProvider {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ProviderError::Status {
                provider: NAME,
                status,
                body: String::new(),
            });
        }

        let html = response
            .text()
            .await
            .map_err(|e| ProviderError::from_reqwest(NAME, e))?;
        Ok(parse_results(&html, max_results))
    }
}

/// Pull result links out of a DuckDuckGo HTML page.
///
/// Prefers the structured `result__a` anchors; if the page layout changed
/// and none exist, falls back to every absolute link on the page. The
/// excerpt is the result's snippet when present, otherwise the link text.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let document = Html::parse_document(html);

    let mut anchors: Vec<ElementRef> = document.select(&RESULT_LINK).collect();
    if anchors.is_empty() {
        anchors = document.select(&ANY_LINK).collect();
    }

    let mut results = Vec::new();
    for anchor in anchors {
        if results.len() >= max_results {
            break;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let url = normalize_url(href);
        if !url.starts_with("http") {
            continue;
        }

        let title = collapse(&anchor.text().collect::<String>());
        let snippet = result_container(anchor)
            .and_then(|container| container.select(&SNIPPET).next())
            .map(|s| collapse(&s.text().collect::<String>()))
            .unwrap_or_default();

        let excerpt = if snippet.is_empty() { title } else { snippet };
        results.push(SearchResult::new(
            url,
            truncate_chars(&excerpt, MAX_EXCERPT_CHARS),
        ));
    }
    results
}

/// Nearest ancestor with the `result` class, or the direct parent.
fn result_container(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().classes().any(|c| c == "result"))
        .or_else(|| anchor.parent().and_then(ElementRef::wrap))
}

/// Resolve `//duckduckgo.com/l/?uddg=<target>` redirect links to the target.
fn normalize_url(raw: &str) -> String {
    let absolute = if raw.starts_with("//") {
        format!("https:{raw}")
    } else {
        raw.to_string()
    };

    let Ok(parsed) = url::Url::parse(&absolute) else {
        return raw.to_string();
    };

    if parsed.domain().is_some_and(|d| d.ends_with("duckduckgo.com"))
        && parsed.path().starts_with("/l/")
    {
        if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
            return target.into_owned();
        }
    }
    absolute
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
