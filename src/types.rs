use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Who produced a remembered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" | "ai" => Ok(Role::Assistant),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

/// One remembered message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub role: Role,
    pub text: String,
    #[serde(rename = "ts", deserialize_with = "timestamp::deserialize")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

mod timestamp {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    /// RFC 3339, or an offset-less ISO 8601 datetime read as UTC.
    ///
    /// Older logs were written without an offset, e.g. `2024-05-01T10:00:00.123456`.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(ts.with_timezone(&Utc));
        }
        raw.parse::<NaiveDateTime>()
            .map(|naive| naive.and_utc())
            .map_err(|e| D::Error::custom(format!("invalid timestamp '{raw}': {e}")))
    }
}

impl MemoryItem {
    /// Create an item stamped with the current time.
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

/// A single hit from a search backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub excerpt: String,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            excerpt: excerpt.into(),
        }
    }
}

/// Body of `POST /chat`.
///
/// Accepts both `useWeb`/`webQuery` and the snake_case spellings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub text: String,
    #[serde(default, alias = "use_web")]
    pub use_web: bool,
    #[serde(default, alias = "web_query", skip_serializing_if = "Option::is_none")]
    pub web_query: Option<String>,
}

impl ChatRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_web(mut self) -> Self {
        self.use_web = true;
        self
    }
}

/// Response of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub reply: String,
}

/// Body of `POST /memory`. The role is validated separately so an unknown
/// role becomes a [`ValidationError`] rather than a generic decode failure.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMemory {
    pub role: String,
    pub text: String,
}

impl NewMemory {
    pub fn parse(&self) -> Result<(Role, &str), ValidationError> {
        let role: Role = self.role.parse()?;
        if self.text.trim().is_empty() {
            return Err(ValidationError::EmptyText);
        }
        Ok((role, &self.text))
    }
}

/// Truncate to at most `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
