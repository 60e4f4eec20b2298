//! API server client
//!
//! Combines the endpoint, default namespace, credentials and the request
//! dispatcher. Resource clients build URLs with [`Client::url_for`] or
//! [`Client::url_for_path`] and call the typed request helpers.

use std::time::Duration;

use anyhow::Context;
use reqwest::Method;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::auth::Credentials;
use super::http::HttpClient;
use crate::api::meta::Status;
use crate::codec::Codec;
use crate::config::Config;
use crate::error::{Result, TransportError, ValidationError};
use crate::resource::{Discovery, ThirdPartyResources};
use crate::watch::Watcher;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";

/// Query parameters accepted by list and watch calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Start a watch after this version; list at least this recent
    pub resource_version: Option<String>,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
    /// Server side timeout for list and watch calls
    pub timeout_seconds: Option<u32>,
}

impl ListOptions {
    /// True when no option would add a query parameter
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Append the set options to `url` as query parameters
    pub fn apply(&self, url: &mut Url) {
        if self.is_empty() {
            return;
        }
        let mut query = url.query_pairs_mut();
        if let Some(version) = &self.resource_version {
            query.append_pair("resourceVersion", version);
        }
        if let Some(selector) = &self.label_selector {
            query.append_pair("labelSelector", selector);
        }
        if let Some(selector) = &self.field_selector {
            query.append_pair("fieldSelector", selector);
        }
        if let Some(timeout) = self.timeout_seconds {
            query.append_pair("timeoutSeconds", &timeout.to_string());
        }
    }
}

/// Main API server client
#[derive(Debug, Clone)]
pub struct Client {
    endpoint: Url,
    namespace: String,
    credentials: Credentials,
    http: HttpClient,
}

fn cannot_be_a_base() -> ValidationError {
    ValidationError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
}

impl Client {
    /// Create a client for `endpoint` with default TLS settings
    pub fn new(endpoint: &str, credentials: Credentials) -> Result<Self> {
        Self::with_http(endpoint, credentials, HttpClient::new()?)
    }

    /// Create a client that sends requests through `http`
    pub fn with_http(endpoint: &str, credentials: Credentials, http: HttpClient) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(ValidationError::from)?;
        if endpoint.cannot_be_a_base() {
            return Err(cannot_be_a_base().into());
        }
        Ok(Self {
            endpoint,
            namespace: DEFAULT_NAMESPACE.to_string(),
            credentials,
            http,
        })
    }

    /// Build a client from persisted configuration
    ///
    /// `endpoint` overrides whatever the configuration resolves to.
    pub fn from_config(config: &Config, endpoint: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("kubewire/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &config.ca_file {
            let pem = std::fs::read(path)
                .with_context(|| format!("Failed to read CA bundle {}", path.display()))?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .with_context(|| format!("Invalid CA bundle {}", path.display()))?;
            builder = builder.add_root_certificate(cert);
        }
        if config.insecure_skip_tls_verify {
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = HttpClient::from_client(builder.build().context("Failed to create HTTP client")?)
            .with_request_timeout(config.request_timeout());
        let endpoint = config.effective_endpoint(endpoint);
        tracing::info!("Using API server {}", endpoint);

        let client = Self::with_http(&endpoint, config.credentials(), http)
            .with_context(|| format!("Invalid API server endpoint {}", endpoint))?;
        Ok(client.with_namespace(config.effective_namespace()))
    }

    /// Use `namespace` instead of the default for namespaced helpers
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Bound one-shot requests made through this client
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_request_timeout(Some(timeout));
        self
    }

    /// Base URL of the API server
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Namespace used by callers that do not pick one
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the bearer token for the next request
    pub async fn token(&self) -> Result<Option<String>> {
        Ok(self
            .credentials
            .get_token()
            .await
            .map_err(TransportError::Credentials)?)
    }

    /// URL of a resource collection or, with `name`, a single object
    ///
    /// The core group (empty `api_group`) lives under `/api`, every other
    /// group under `/apis/{group}`.
    pub fn url_for(
        &self,
        api_group: &str,
        api_version: &str,
        namespace: Option<&str>,
        resource: &str,
        name: Option<&str>,
    ) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| cannot_be_a_base())?;
            segments.pop_if_empty();
            if api_group.is_empty() {
                segments.extend(["api", api_version]);
            } else {
                segments.extend(["apis", api_group, api_version]);
            }
            if let Some(namespace) = namespace.filter(|ns| !ns.is_empty()) {
                segments.extend(["namespaces", namespace]);
            }
            segments.push(resource);
            if let Some(name) = name.filter(|name| !name.is_empty()) {
                segments.push(name);
            }
        }
        Ok(url)
    }

    /// URL of an arbitrary `/`-separated path below the endpoint
    pub fn url_for_path(&self, path: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| cannot_be_a_base())?;
            segments.pop_if_empty();
            segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        }
        Ok(url)
    }

    /// Make a GET request
    pub async fn get<T, C>(&self, ctx: &CancellationToken, codec: &C, url: &Url) -> Result<T>
    where
        C: Codec<T>,
    {
        let token = self.token().await?;
        self.http.get(ctx, codec, url, token.as_deref()).await
    }

    /// Make a POST or PUT request carrying `body`
    pub async fn create<Req, Resp, C>(
        &self,
        ctx: &CancellationToken,
        codec: &C,
        method: Method,
        url: &Url,
        body: &Req,
    ) -> Result<Resp>
    where
        C: Codec<Req> + Codec<Resp>,
    {
        let token = self.token().await?;
        self.http
            .create(ctx, codec, method, url, token.as_deref(), body)
            .await
    }

    /// Make a DELETE request
    pub async fn delete<C>(&self, ctx: &CancellationToken, codec: &C, url: &Url) -> Result<()>
    where
        C: Codec<Status>,
    {
        let token = self.token().await?;
        self.http.delete(ctx, codec, url, token.as_deref()).await
    }

    /// Open a watch on `url`
    pub async fn watch<C>(&self, ctx: &CancellationToken, codec: &C, url: &Url) -> Result<Watcher>
    where
        C: Codec<Status>,
    {
        let token = self.token().await?;
        self.http.open_watch(ctx, codec, url, token.as_deref()).await
    }

    /// Client for server version and API discovery
    pub fn discovery(&self) -> Discovery {
        Discovery::new(self.clone())
    }

    /// Client for a user defined API group
    pub fn third_party_resources(
        &self,
        api_group: impl Into<String>,
        api_version: impl Into<String>,
    ) -> ThirdPartyResources {
        ThirdPartyResources::new(self.clone(), api_group, api_version)
    }
}
