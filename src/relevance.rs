use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use crate::error::ProviderError;

/// Words that suggest the user wants recent information.
const RECENCY_TRIGGERS: &[&str] = &[
    "latest",
    "recent",
    "current",
    "news",
    "update",
    "updates",
    "version",
    "versions",
    "released",
    "release",
    "announced",
    "trend",
    "trending",
    "today",
];

/// Package / tooling questions where stale answers are common.
const TECH_TRIGGERS: &[&str] = &[
    "install",
    "compatibl",
    "compatibility",
    "npm",
    "pypi",
    "github",
    "stack overflow",
    "stackoverflow",
];

static YEAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"20\d{2}").expect("year pattern is valid"));

/// Decide whether a message likely needs live web results.
///
/// Case-insensitive substring match against the recency and tech trigger
/// lists, or any `20xx` year. Matches are substrings, so "updated" fires
/// on "update" and "compatible" on "compatibl".
pub fn needs_web_augmentation(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    let lower = text.to_lowercase();

    RECENCY_TRIGGERS.iter().any(|t| lower.contains(t))
        || YEAR_PATTERN.is_match(text)
        || TECH_TRIGGERS.iter().any(|t| lower.contains(t))
}

/// Lowercased alphanumeric words longer than two characters.
pub fn keywords(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 2)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Number of keywords two sets share.
pub fn overlap_score(query: &HashSet<String>, candidate: &HashSet<String>) -> usize {
    query.intersection(candidate).count()
}

/// Reachability check used to skip web search when offline.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Probes a known-stable host with a single GET.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(crate::search::USER_AGENT)
            .build()
            .map_err(|source| ProviderError::Client {
                provider: "probe",
                source,
            })?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ConnectivityProbe for HttpProbe {
    async fn is_online(&self) -> bool {
        match self.client.get(&self.url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(url = %self.url, "connectivity probe failed: {e}");
                false
            }
        }
    }
}

/// A probe with a fixed answer. Used when probing is disabled in config.
pub struct StaticProbe(pub bool);

#[async_trait]
impl ConnectivityProbe for StaticProbe {
    async fn is_online(&self) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_drop_short_words_and_punctuation() {
        let words = keywords("I'm on Rust 1.80, it's GREAT!");
        let expected: HashSet<String> = ["rust", "great"].iter().map(|s| s.to_string()).collect();
        assert_eq!(words, expected);
    }

    #[test]
    fn overlap_counts_shared_keywords_once() {
        let a = keywords("coffee coffee morning routine");
        let b = keywords("my morning coffee");
        assert_eq!(overlap_score(&a, &b), 2);
    }

    #[test]
    fn year_pattern_needs_twenty_prefix() {
        assert!(needs_web_augmentation("what happened in 2031"));
        assert!(!needs_web_augmentation("what happened in 1999"));
    }

    #[test]
    fn static_probe_reports_fixed_state() {
        assert!(tokio_test::block_on(StaticProbe(true).is_online()));
        assert!(!tokio_test::block_on(StaticProbe(false).is_online()));
    }
}
