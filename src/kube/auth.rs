//! API server authentication
//!
//! Supports anonymous access, a static bearer token, or a token file that is
//! re-read periodically (service account tokens are rotated on disk).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::RwLock;

/// Service account token mounted into every pod
pub const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Service account CA bundle
pub const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// How long a token read from disk is reused before the file is read again
const TOKEN_FILE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum TokenSource {
    None,
    Static(String),
    File(PathBuf),
}

/// Bearer token provider with caching for file based tokens
#[derive(Debug, Clone)]
pub struct Credentials {
    source: TokenSource,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    /// When the file should be read again
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl Credentials {
    fn with_source(source: TokenSource) -> Self {
        Self {
            source,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Send requests without an `Authorization` header
    pub fn anonymous() -> Self {
        Self::with_source(TokenSource::None)
    }

    /// Send the same bearer token on every request
    pub fn token(token: impl Into<String>) -> Self {
        Self::with_source(TokenSource::Static(token.into()))
    }

    /// Read the bearer token from `path`, re-reading it every minute
    pub fn token_file(path: impl Into<PathBuf>) -> Self {
        Self::with_source(TokenSource::File(path.into()))
    }

    /// Get the bearer token for the next request, if any
    pub async fn get_token(&self) -> Result<Option<String>> {
        let path = match &self.source {
            TokenSource::None => return Ok(None),
            TokenSource::Static(token) => return Ok(Some(token.clone())),
            TokenSource::File(path) => path,
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(Some(cached.token.clone()));
                }
                tracing::debug!("Cached token expired, re-reading {}", path.display());
            }
        }

        let token = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read token file {}", path.display()))?
            .trim()
            .to_string();

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at: Instant::now() + TOKEN_FILE_TTL,
            });
        }

        Ok(Some(token))
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_anonymous_has_no_token() {
        assert_eq!(Credentials::anonymous().get_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_static_token() {
        let creds = Credentials::token("abc");
        assert_eq!(creds.get_token().await.unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_token_file_is_trimmed_and_cached() {
        let path = std::env::temp_dir().join(format!("kubewire-token-{}", std::process::id()));
        std::fs::write(&path, "secret\n").unwrap();

        let creds = Credentials::token_file(&path);
        assert_eq!(creds.get_token().await.unwrap().as_deref(), Some("secret"));

        // Served from cache until the TTL elapses
        std::fs::write(&path, "rotated\n").unwrap();
        assert_eq!(creds.get_token().await.unwrap().as_deref(), Some("secret"));

        // A fresh provider reads the file again
        let creds = Credentials::token_file(&path);
        assert_eq!(creds.get_token().await.unwrap().as_deref(), Some("rotated"));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_token_file_is_error() {
        let creds = Credentials::token_file("/nonexistent/kubewire/token");
        assert!(creds.get_token().await.is_err());
    }
}
