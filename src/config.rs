//! Configuration Management
//!
//! Reads the kubewire configuration file and detects the in-cluster
//! environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kube::auth::{Credentials, SERVICE_ACCOUNT_CA, SERVICE_ACCOUNT_TOKEN};
use crate::kube::DEFAULT_NAMESPACE;

/// Endpoint used when nothing else is configured (`kubectl proxy` default)
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080";

const SERVICE_ACCOUNT_NAMESPACE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    /// API server base URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Namespace used when a command does not name one
    #[serde(default)]
    pub namespace: Option<String>,
    /// Static bearer token
    #[serde(default)]
    pub token: Option<String>,
    /// File holding a bearer token, re-read periodically
    #[serde(default)]
    pub token_file: Option<PathBuf>,
    /// PEM bundle of additional trusted CAs
    #[serde(default)]
    pub ca_file: Option<PathBuf>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
    /// Timeout for one-shot requests; watches are not affected
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kubewire").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from `path`, falling back to defaults when the file
    /// is missing or unreadable
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            },
        }
    }

    /// Configuration for a process running inside a pod
    ///
    /// Returns `None` unless `KUBERNETES_SERVICE_HOST` and
    /// `KUBERNETES_SERVICE_PORT` are both set.
    pub fn in_cluster() -> Option<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST").ok();
        let port = std::env::var("KUBERNETES_SERVICE_PORT").ok();
        let mut config = Self::in_cluster_from(host.as_deref(), port.as_deref())?;
        config.namespace = std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE)
            .ok()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());
        Some(config)
    }

    fn in_cluster_from(host: Option<&str>, port: Option<&str>) -> Option<Self> {
        let host = host.filter(|h| !h.is_empty())?;
        let port = port.filter(|p| !p.is_empty())?;
        Some(Self {
            endpoint: Some(format!("https://{}", join_host_port(host, port))),
            token_file: Some(PathBuf::from(SERVICE_ACCOUNT_TOKEN)),
            ca_file: Some(PathBuf::from(SERVICE_ACCOUNT_CA)),
            ..Self::default()
        })
    }

    /// Fill unset fields from the in-cluster environment, if there is one
    ///
    /// An explicitly configured endpoint means the user is talking to some
    /// other cluster, so nothing is merged in that case.
    pub fn merge_in_cluster(self) -> Self {
        match Self::in_cluster() {
            Some(cluster) => self.merge(cluster),
            None => self,
        }
    }

    fn merge(self, cluster: Self) -> Self {
        if self.endpoint.is_some() {
            return self;
        }
        tracing::debug!("Using in-cluster configuration");
        let has_token = self.token.is_some() || self.token_file.is_some();
        Self {
            endpoint: cluster.endpoint,
            namespace: self.namespace.or(cluster.namespace),
            token_file: if has_token {
                self.token_file
            } else {
                cluster.token_file
            },
            ca_file: self.ca_file.or(cluster.ca_file),
            ..self
        }
    }

    /// Get effective endpoint (CLI > config > default)
    pub fn effective_endpoint(&self, cli: Option<&str>) -> String {
        cli.map(str::to_string)
            .or_else(|| self.endpoint.clone())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    /// Get effective namespace (config > default)
    pub fn effective_namespace(&self) -> String {
        self.namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Token source for requests; a static token wins over a token file
    pub fn credentials(&self) -> Credentials {
        match (&self.token, &self.token_file) {
            (Some(token), _) => Credentials::token(token.clone()),
            (None, Some(path)) => Credentials::token_file(path.clone()),
            (None, None) => Credentials::anonymous(),
        }
    }

    /// Timeout for one-shot requests; zero or unset means none
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// `host:port`, with IPv6 literals bracketed
fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        return format!("[{}]:{}", host, port);
    }
    format!("{}:{}", host, port)
}
