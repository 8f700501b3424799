use thiserror::Error;

/// Failure of an outbound call to a search or completion backend.
///
/// Search providers absorb these (the provider contributes nothing);
/// the completion client surfaces them to the caller.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: failed to build HTTP client: {source}")]
    Client {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: request failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: request timed out")]
    Timeout { provider: &'static str },

    #[error("{provider}: unexpected status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider}: malformed response: {reason}")]
    Decode {
        provider: &'static str,
        reason: String,
    },

    #[error("{provider}: response contained no completion")]
    Empty { provider: &'static str },
}

impl ProviderError {
    /// Classify a reqwest error, separating timeouts from other transport failures.
    pub fn from_reqwest(provider: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ProviderError::Timeout { provider }
        } else if source.is_decode() {
            ProviderError::Decode {
                provider,
                reason: source.to_string(),
            }
        } else {
            ProviderError::Http { provider, source }
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ProviderError::Client { provider, .. }
            | ProviderError::Http { provider, .. }
            | ProviderError::Timeout { provider }
            | ProviderError::Status { provider, .. }
            | ProviderError::Decode { provider, .. }
            | ProviderError::Empty { provider } => provider,
        }
    }
}

/// Startup configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing credential for '{provider}': set {env_var} or run `astral auth`")]
    MissingCredential {
        provider: String,
        env_var: &'static str,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Client(#[from] ProviderError),
}

/// A request that is rejected before it reaches the pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message text must not be empty")]
    EmptyText,

    #[error("unknown role '{0}': expected 'user' or 'assistant'")]
    UnknownRole(String),
}

/// Error returned by the chat pipeline.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}
