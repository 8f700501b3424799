pub mod bing;
pub mod cache;
pub mod duckduckgo;
pub mod wikipedia;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::error::ProviderError;
use crate::types::SearchResult;
use cache::{CacheKey, SearchCache};

pub use bing::BingProvider;
pub use duckduckgo::DuckDuckGoProvider;
pub use wikipedia::WikipediaProvider;

/// Sent with every outbound search request; some backends reject bare clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; astral/0.1)";

/// Upper bound on a provider excerpt, in characters.
pub const MAX_EXCERPT_CHARS: usize = 1600;

/// One search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, ProviderError>;
}

pub(crate) fn build_client(
    provider: &'static str,
    timeout: Duration,
) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|source| ProviderError::Client { provider, source })
}

/// Combines several search backends into one ranked, de-duplicated list.
///
/// The `chain` is tried in order until one provider returns results (a keyed
/// API first when configured, then a free web search). The encyclopedia is
/// always consulted afterwards for a couple of extra references. Provider
/// failures are logged and count as "no results", so [`search`] never fails.
///
/// [`search`]: SearchAggregator::search
pub struct SearchAggregator {
    chain: Vec<Arc<dyn SearchProvider>>,
    encyclopedia: Option<Arc<dyn SearchProvider>>,
    encyclopedia_results: usize,
    cache: SearchCache,
}

impl SearchAggregator {
    pub fn new(
        chain: Vec<Arc<dyn SearchProvider>>,
        encyclopedia: Option<Arc<dyn SearchProvider>>,
    ) -> Self {
        Self {
            chain,
            encyclopedia,
            encyclopedia_results: 2,
            cache: SearchCache::default(),
        }
    }

    pub fn with_cache(mut self, cache: SearchCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_encyclopedia_results(mut self, n: usize) -> Self {
        self.encyclopedia_results = n;
        self
    }

    /// Build the real provider stack from config.
    ///
    /// Bing joins the chain only when an API key is present.
    pub fn from_config(config: &SearchConfig) -> Result<Self, ProviderError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let mut chain: Vec<Arc<dyn SearchProvider>> = Vec::new();

        if let Some(key) = config.bing_api_key.as_deref().filter(|k| !k.is_empty()) {
            chain.push(Arc::new(BingProvider::new(key, timeout)?));
        }
        chain.push(Arc::new(DuckDuckGoProvider::new(timeout)?));

        let encyclopedia: Arc<dyn SearchProvider> = Arc::new(WikipediaProvider::new(
            Duration::from_secs(config.encyclopedia_timeout_secs),
        )?);

        let ttl = (config.cache_ttl_secs > 0).then(|| Duration::from_secs(config.cache_ttl_secs));

        info!(
            providers = ?chain.iter().map(|p| p.name()).collect::<Vec<_>>(),
            cache_capacity = config.cache_capacity,
            "search providers configured"
        );

        Ok(Self::new(chain, Some(encyclopedia))
            .with_cache(SearchCache::new(config.cache_capacity, ttl))
            .with_encyclopedia_results(config.encyclopedia_results))
    }

    /// Search every source and merge the results.
    ///
    /// The returned list holds at most `max_results` entries with unique URLs,
    /// in provider order. Worst case it is empty.
    pub async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        if max_results == 0 || query.trim().is_empty() {
            return Vec::new();
        }

        let key = CacheKey::new(query, max_results);
        if let Some(hit) = self.cache.get(&key) {
            debug!(query, "search cache hit");
            return hit;
        }

        let mut merged = Merged::new(max_results);

        for provider in &self.chain {
            if let Some(results) = run_provider(provider.as_ref(), query, max_results).await {
                merged.extend(results);
            }
            if !merged.is_empty() {
                break;
            }
        }

        if let Some(encyclopedia) = &self.encyclopedia {
            if !merged.is_full() && self.encyclopedia_results > 0 {
                if let Some(results) =
                    run_provider(encyclopedia.as_ref(), query, self.encyclopedia_results).await
                {
                    merged.extend(results);
                }
            }
        }

        let results = merged.into_results();
        info!(query, results = results.len(), "search completed");

        // An empty list usually means an outage; don't pin it.
        if !results.is_empty() {
            self.cache.insert(key, results.clone());
        }
        results
    }

    pub fn cache(&self) -> &SearchCache {
        &self.cache
    }
}

async fn run_provider(
    provider: &dyn SearchProvider,
    query: &str,
    max_results: usize,
) -> Option<Vec<SearchResult>> {
    match provider.search(query, max_results).await {
        Ok(results) => {
            debug!(provider = provider.name(), results = results.len(), "provider returned");
            Some(results)
        }
        Err(e) => {
            warn!(provider = provider.name(), "search provider failed: {e}");
            None
        }
    }
}

/// Accumulates results, dropping repeated URLs and stopping at the cap.
struct Merged {
    results: Vec<SearchResult>,
    seen: HashSet<String>,
    cap: usize,
}

impl Merged {
    fn new(cap: usize) -> Self {
        Self {
            results: Vec::with_capacity(cap),
            seen: HashSet::new(),
            cap,
        }
    }

    fn extend(&mut self, results: Vec<SearchResult>) {
        for result in results {
            if self.is_full() {
                break;
            }
            if result.url.is_empty() || !self.seen.insert(result.url.clone()) {
                continue;
            }
            self.results.push(result);
        }
    }

    fn is_full(&self) -> bool {
        self.results.len() >= self.cap
    }

    fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn into_results(self) -> Vec<SearchResult> {
        self.results
    }
}
