//! Webhook signing secret retrieval.
//!
//! The receiver asks a `SecretProvider` for the key on every request;
//! wrapping a provider in `CachedSecret` turns that into one fetch per
//! process.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::Config;

/// Entry name looked up in a mounted secret file.
pub const SECRET_KEY_ENTRY: &str = "SECRET_KEY";

#[derive(Debug, Error)]
pub enum SecretError {
    /// No secret source is configured at all.
    #[error("webhook secret is not configured")]
    NotConfigured,

    /// The source exists but has no usable entry.
    #[error("{0} not found in secret source")]
    KeyNotFound(&'static str),

    /// The source could not be read.
    #[error("secret source unavailable: {0}")]
    Unavailable(String),
}

impl SecretError {
    /// Whether the failure is a deployment mistake rather than an outage.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SecretError::NotConfigured | SecretError::KeyNotFound(_))
    }
}

#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self) -> Result<String, SecretError>;
}

/// Secret supplied directly through configuration.
#[derive(Clone)]
pub struct EnvSecret(Option<String>);

impl EnvSecret {
    pub fn new(secret: Option<String>) -> Self {
        Self(secret.filter(|s| !s.trim().is_empty()))
    }
}

#[async_trait]
impl SecretProvider for EnvSecret {
    async fn get_secret(&self) -> Result<String, SecretError> {
        self.0.clone().ok_or(SecretError::NotConfigured)
    }
}

/// Secret read from a mounted file of `KEY=value` lines.
#[derive(Clone)]
pub struct FileSecret {
    path: PathBuf,
}

impl FileSecret {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SecretProvider for FileSecret {
    async fn get_secret(&self) -> Result<String, SecretError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SecretError::Unavailable(format!("{}: {e}", self.path.display())))?;

        find_entry(&contents, SECRET_KEY_ENTRY).ok_or(SecretError::KeyNotFound(SECRET_KEY_ENTRY))
    }
}

/// Find `key=value` among the lines of a secret file.
///
/// The value is everything after the first `=` up to the line ending,
/// whitespace included.
fn find_entry(contents: &str, key: &str) -> Option<String> {
    contents
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(name, _)| name.trim() == key)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.trim().is_empty())
}

/// Caches the first successful fetch for the life of the process.
///
/// Failed fetches are not cached, the next request tries again.
pub struct CachedSecret<P> {
    provider: P,
    cached: OnceCell<String>,
}

impl<P: SecretProvider> CachedSecret<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cached: OnceCell::new(),
        }
    }
}

#[async_trait]
impl<P: SecretProvider> SecretProvider for CachedSecret<P> {
    async fn get_secret(&self) -> Result<String, SecretError> {
        self.cached
            .get_or_try_init(|| async {
                info!("secret_cache_miss");
                self.provider.get_secret().await
            })
            .await
            .cloned()
    }
}

/// Pick the configured secret source, file first.
pub fn from_config(config: &Config) -> Arc<dyn SecretProvider> {
    match &config.webhook_secret_file {
        Some(path) => Arc::new(CachedSecret::new(FileSecret::new(path.clone()))),
        None => Arc::new(CachedSecret::new(EnvSecret::new(config.webhook_secret.clone()))),
    }
}
