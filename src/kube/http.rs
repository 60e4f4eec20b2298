//! Request dispatcher
//!
//! Every call to the API server goes through [`HttpClient`]: bodies are
//! encoded and decoded with the caller's codec, non-2xx responses become
//! [`ApiError`]s and the caller's [`CancellationToken`] aborts the exchange.

use std::time::Duration;

use bytes::Bytes;
use futures::TryStreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::meta::Status;
use crate::codec::{Codec, ContentType, JsonCodec, ProtobufCodec};
use crate::error::{ApiError, Error, Result};
use crate::watch::{Framing, Watcher};

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// HTTP client wrapper for API server calls
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    request_timeout: Option<Duration>,
}

impl HttpClient {
    /// Create a client with default TLS settings
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("kubewire/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::from_client(client))
    }

    /// Wrap an already configured `reqwest` client
    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            request_timeout: None,
        }
    }

    /// Bound one-shot requests. Watches are never subject to this timeout.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn request(
        &self,
        method: Method,
        url: &Url,
        token: Option<&str>,
        accept: &'static str,
    ) -> RequestBuilder {
        let mut request = self.client.request(method, url.clone()).header(ACCEPT, accept);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.request_timeout {
            request = request.timeout(timeout);
        }
        request
    }

    /// Send the request and return the body of a 2xx response
    async fn execute(&self, ctx: &CancellationToken, request: RequestBuilder) -> Result<Bytes> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let content_type = header_str(&response, CONTENT_TYPE);
            let body = response.bytes().await?;

            if !status.is_success() {
                return Err(api_error(status, content_type.as_deref(), &body));
            }
            Ok::<_, Error>(body)
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(Error::Cancelled),
            result = exchange => result,
        }
    }

    /// GET `url` and decode the body with `codec`
    pub async fn get<T, C>(
        &self,
        ctx: &CancellationToken,
        codec: &C,
        url: &Url,
        token: Option<&str>,
    ) -> Result<T>
    where
        C: Codec<T>,
    {
        tracing::debug!("GET {}", url);

        let request = self.request(Method::GET, url, token, codec.content_type());
        let body = self.execute(ctx, request).await?;
        Ok(codec.decode(&body)?)
    }

    /// Send `body` with `method` (POST to create, PUT to update) and decode
    /// the returned object
    pub async fn create<Req, Resp, C>(
        &self,
        ctx: &CancellationToken,
        codec: &C,
        method: Method,
        url: &Url,
        token: Option<&str>,
        body: &Req,
    ) -> Result<Resp>
    where
        C: Codec<Req> + Codec<Resp>,
    {
        tracing::debug!("{} {}", method, url);

        let content_type = <C as Codec<Req>>::content_type(codec);
        let payload = <C as Codec<Req>>::encode(codec, body)?;
        let request = self
            .request(method, url, token, content_type)
            .header(CONTENT_TYPE, content_type)
            .body(payload);
        let body = self.execute(ctx, request).await?;
        Ok(<C as Codec<Resp>>::decode(codec, &body)?)
    }

    /// DELETE `url`; the response body is not decoded
    pub async fn delete<C>(
        &self,
        ctx: &CancellationToken,
        codec: &C,
        url: &Url,
        token: Option<&str>,
    ) -> Result<()>
    where
        C: Codec<Status>,
    {
        tracing::debug!("DELETE {}", url);

        let request = self.request(Method::DELETE, url, token, codec.content_type());
        self.execute(ctx, request).await?;
        Ok(())
    }

    /// Open a streaming watch on `url`
    ///
    /// `codec` only picks the `Accept` header and decodes error bodies. The
    /// framing follows the response `Content-Type`, so the raw watcher reads
    /// whatever the server sends; typed watchers check that it fits their
    /// codec with [`TypedWatcher::for_codec`](crate::watch::TypedWatcher::for_codec).
    pub async fn open_watch<C>(
        &self,
        ctx: &CancellationToken,
        codec: &C,
        url: &Url,
        token: Option<&str>,
    ) -> Result<Watcher>
    where
        C: Codec<Status>,
    {
        let mut url = url.clone();
        if !url.query_pairs().any(|(key, _)| key == "watch") {
            url.query_pairs_mut().append_pair("watch", "true");
        }
        tracing::debug!("WATCH {}", url);

        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, codec.content_type());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(Error::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        let content_type = header_str(&response, CONTENT_TYPE);
        if status != StatusCode::OK {
            let body = tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(Error::Cancelled),
                body = response.bytes() => body?,
            };
            return Err(api_error(status, content_type.as_deref(), &body));
        }

        let framing = Framing::from_content_type(content_type.as_deref());
        tracing::debug!(?framing, "watch established");

        let body = response.bytes_stream().map_err(std::io::Error::other);
        let reader = StreamReader::new(Box::pin(body));
        Ok(Watcher::new(reader, framing, ctx.clone()))
    }
}

fn header_str(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// Decode a Status from an error body, trying the announced format first
fn decode_status(content_type: Option<&str>, body: &[u8]) -> Option<Status> {
    let json = || <JsonCodec as Codec<Status>>::decode(&JsonCodec, body).ok();
    let protobuf = || <ProtobufCodec as Codec<Status>>::decode(&ProtobufCodec, body).ok();
    let status = match ContentType::from_header(content_type) {
        Some(ContentType::Json) => json(),
        Some(ContentType::Protobuf) => protobuf(),
        None => json().or_else(protobuf),
    };
    status.filter(|status| status.message.is_some() || status.reason.is_some())
}

/// Build the error for a non-success response
fn api_error(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> Error {
    let text = String::from_utf8_lossy(body);
    tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));

    let code = status.as_u16();
    match decode_status(content_type, body) {
        Some(decoded) => ApiError::from_status(code, decoded).into(),
        None => {
            let sanitized = sanitize_for_log(&text);
            let message = if sanitized.is_empty() {
                status.canonical_reason().unwrap_or("unknown status").to_string()
            } else {
                sanitized
            };
            ApiError {
                code,
                status: None,
                reason: None,
                message,
            }
            .into()
        },
    }
}

/// Format an error for display to a user
pub fn format_api_error(error: &Error) -> String {
    match error {
        Error::Api(err) => match err.code {
            401 => "Authentication failed. Check the configured token.".to_string(),
            403 => format!("Permission denied: {}", err.message),
            404 => format!("Resource not found: {}", err.message),
            409 => format!("Resource conflict: {}", err.message),
            410 => "Resource version expired. Restart the watch without a resource version."
                .to_string(),
            429 => "Rate limit exceeded. Please try again later.".to_string(),
            500..=599 => "API server temporarily unavailable. Please try again.".to_string(),
            _ => err.to_string(),
        },
        Error::Transport(err) if err.is_timeout() => "Request timed out.".to_string(),
        Error::Transport(_) => {
            "Request failed. Check the API server endpoint and your network connection."
                .to_string()
        },
        other => other.to_string(),
    }
}
