//! Client for user defined API groups
//!
//! These groups have no protobuf schema, so every request is JSON. Callers
//! define their own object types:
//!
//! ```no_run
//! use kubewire::api::meta::{Object, ObjectMeta};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Metric {
//!     metadata: Option<ObjectMeta>,
//!     value: i64,
//! }
//!
//! impl Object for Metric {
//!     fn metadata(&self) -> Option<&ObjectMeta> {
//!         self.metadata.as_ref()
//!     }
//! }
//! ```

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::check_resource;
use crate::api::meta::Object;
use crate::codec::JsonCodec;
use crate::error::Result;
use crate::kube::{Client, ListOptions};
use crate::watch::{TypedWatcher, Watcher};

/// JSON client for one user defined group version
#[derive(Debug, Clone)]
pub struct ThirdPartyResources {
    client: Client,
    api_group: String,
    api_version: String,
}

impl ThirdPartyResources {
    pub(crate) fn new(
        client: Client,
        api_group: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_group: api_group.into(),
            api_version: api_version.into(),
        }
    }

    /// Group this client talks to
    pub fn api_group(&self) -> &str {
        &self.api_group
    }

    /// Version this client talks to
    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    fn url(&self, resource: &str, namespace: &str, name: Option<&str>) -> Result<Url> {
        check_resource(&self.api_group, &self.api_version, resource, namespace, name)?;
        self.client.url_for(
            &self.api_group,
            &self.api_version,
            Some(namespace),
            resource,
            name,
        )
    }

    /// Create `object` in `namespace` and return what the server stored
    pub async fn create<T>(
        &self,
        ctx: &CancellationToken,
        resource: &str,
        namespace: &str,
        object: &T,
    ) -> Result<T>
    where
        T: Object + Serialize + DeserializeOwned,
    {
        let url = self.url(resource, namespace, None)?;
        self.client
            .create(ctx, &JsonCodec, Method::POST, &url, object)
            .await
    }

    /// Replace an existing object; its name is taken from the metadata.
    /// A missing name is reported after the other identity fields.
    pub async fn update<T>(
        &self,
        ctx: &CancellationToken,
        resource: &str,
        namespace: &str,
        object: &T,
    ) -> Result<T>
    where
        T: Object + Serialize + DeserializeOwned,
    {
        let name = object.name().unwrap_or_default();
        let url = self.url(resource, namespace, Some(name))?;
        self.client
            .create(ctx, &JsonCodec, Method::PUT, &url, object)
            .await
    }

    /// Fetch one object by name
    pub async fn get<T>(
        &self,
        ctx: &CancellationToken,
        resource: &str,
        namespace: &str,
        name: &str,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
    {
        let url = self.url(resource, namespace, Some(name))?;
        self.client.get(ctx, &JsonCodec, &url).await
    }

    /// Delete one object by name
    pub async fn delete(
        &self,
        ctx: &CancellationToken,
        resource: &str,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        let url = self.url(resource, namespace, Some(name))?;
        self.client.delete(ctx, &JsonCodec, &url).await
    }

    /// List objects; `L` is usually [`ObjectList`](crate::api::meta::ObjectList)
    pub async fn list<L>(
        &self,
        ctx: &CancellationToken,
        resource: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<L>
    where
        L: Serialize + DeserializeOwned,
    {
        let mut url = self.url(resource, namespace, None)?;
        options.apply(&mut url);
        self.client.get(ctx, &JsonCodec, &url).await
    }

    /// Watch a collection; payloads are left as raw JSON
    pub async fn watch(
        &self,
        ctx: &CancellationToken,
        resource: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Watcher> {
        let mut url = self.url(resource, namespace, None)?;
        options.apply(&mut url);
        self.client.watch(ctx, &JsonCodec, &url).await
    }

    /// Watch a collection, decoding every payload into `T`
    pub async fn watch_typed<T>(
        &self,
        ctx: &CancellationToken,
        resource: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<TypedWatcher<T, JsonCodec>>
    where
        T: Serialize + DeserializeOwned,
    {
        let watcher = self.watch(ctx, resource, namespace, options).await?;
        TypedWatcher::for_codec(watcher, JsonCodec)
    }
}
