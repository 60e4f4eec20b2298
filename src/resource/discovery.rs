use tokio_util::sync::CancellationToken;
use url::Url;

use crate::api::discovery::{ApiGroup, ApiGroupList, ApiResource, ApiResourceList, Version};
use crate::codec::{JsonCodec, ProtobufCodec};
use crate::error::{Result, ValidationError};
use crate::kube::Client;
use crate::watch::TypedWatcher;

/// Watch over the resources of one group version
pub type ApiWatcher = TypedWatcher<ApiResource>;

/// Client used to determine the API version and supported resources of the
/// server
#[derive(Debug, Clone)]
pub struct Discovery {
    client: Client,
}

impl Discovery {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }

    /// `/api/{version}` for the core group, `/apis/{group}/{version}` otherwise
    fn group_version_url(&self, group: &str, version: &str) -> Result<Url> {
        if version.is_empty() {
            return Err(ValidationError::MissingApiVersion.into());
        }
        if group.is_empty() {
            self.client.url_for_path(&format!("api/{}", version))
        } else {
            self.client.url_for_path(&format!("apis/{}/{}", group, version))
        }
    }

    /// Server build information
    pub async fn version(&self, ctx: &CancellationToken) -> Result<Version> {
        let url = self.client.url_for_path("version")?;
        self.client.get(ctx, &JsonCodec, &url).await
    }

    /// All API groups the server serves
    pub async fn api_groups(&self, ctx: &CancellationToken) -> Result<ApiGroupList> {
        let url = self.client.url_for_path("apis")?;
        self.client.get(ctx, &ProtobufCodec, &url).await
    }

    /// One API group by name
    pub async fn api_group(&self, ctx: &CancellationToken, name: &str) -> Result<ApiGroup> {
        if name.is_empty() {
            return Err(ValidationError::MissingApiGroup.into());
        }
        let url = self.client.url_for_path(&format!("apis/{}", name))?;
        self.client.get(ctx, &ProtobufCodec, &url).await
    }

    /// Resources served by one group version
    pub async fn api_resources(
        &self,
        ctx: &CancellationToken,
        group: &str,
        version: &str,
    ) -> Result<ApiResourceList> {
        let url = self.group_version_url(group, version)?;
        self.client.get(ctx, &ProtobufCodec, &url).await
    }

    /// Watch the resources of one group version
    ///
    /// Payloads are protobuf; a server that answers the watch in another
    /// format fails with a decode error instead of yielding a watcher whose
    /// every event would fail.
    pub async fn api_watch(
        &self,
        ctx: &CancellationToken,
        group: &str,
        version: &str,
    ) -> Result<ApiWatcher> {
        let url = self.group_version_url(group, version)?;
        let watcher = self.client.watch(ctx, &ProtobufCodec, &url).await?;
        TypedWatcher::for_codec(watcher, ProtobufCodec)
    }
}
