//! On-disk credential store under `~/.astral/credentials/`.
//!
//! One file per service, `0600`, inside a `0700` directory. Used as the
//! fallback when the matching environment variable is unset.

use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Services whose keys may be stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Groq,
    OpenAi,
    Bing,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Groq => "groq",
            Service::OpenAi => "openai",
            Service::Bing => "bing",
        }
    }
}

impl FromStr for Service {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Service::Groq),
            "openai" => Ok(Service::OpenAi),
            "bing" => Ok(Service::Bing),
            other => anyhow::bail!("unsupported service for key store: {other}"),
        }
    }
}

/// Directory holding config and credentials.
///
/// The parent of `ASTRAL_CONFIG` when set, else `~/.astral`.
pub fn state_dir() -> PathBuf {
    if let Some(parent) = std::env::var("ASTRAL_CONFIG")
        .ok()
        .and_then(|p| PathBuf::from(p).parent().map(Path::to_path_buf))
        .filter(|p| !p.as_os_str().is_empty())
    {
        return parent;
    }
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".astral")
}

pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Store rooted at `<state_dir>/credentials`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join("credentials"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, service: Service) -> PathBuf {
        self.dir.join(format!("{}.key", service.as_str()))
    }

    pub fn write(&self, service: Service, key: &str) -> anyhow::Result<PathBuf> {
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("API key cannot be empty");
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| anyhow::anyhow!("failed to create {}: {e}", self.dir.display()))?;
        restrict(&self.dir, 0o700)?;

        let path = self.key_path(service);
        std::fs::write(&path, key)
            .map_err(|e| anyhow::anyhow!("failed to write {}: {e}", path.display()))?;
        restrict(&path, 0o600)?;
        Ok(path)
    }

    /// The stored key, or `None` when absent, unreadable, or blank.
    pub fn read(&self, service: Service) -> Option<String> {
        let value = std::fs::read_to_string(self.key_path(service)).ok()?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(&state_dir())
    }
}

/// Load a key by service name from the default store.
pub fn load_api_key(service: &str) -> Option<String> {
    let service = service.parse().ok()?;
    CredentialStore::default().read(service)
}

#[cfg(unix)]
fn restrict(path: &Path, mode: u32) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .map_err(|e| anyhow::anyhow!("failed to chmod {mode:o} {}: {e}", path.display()))
}

#[cfg(not(unix))]
fn restrict(_path: &Path, _mode: u32) -> anyhow::Result<()> {
    Ok(())
}
