//! Kubernetes API client core
//!
//! `kubewire` talks to a Kubernetes style API server: it dispatches CRUD
//! requests with a pluggable [`codec`] (JSON or protobuf), translates error
//! responses into [`Error::Api`], and decodes long-lived watch responses into
//! a pull-based sequence of change events.
//!
//! ```no_run
//! use kubewire::kube::{Client, Credentials};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> kubewire::Result<()> {
//! let client = Client::new("http://localhost:8080", Credentials::anonymous())?;
//! let ctx = CancellationToken::new();
//!
//! let mut watcher = client.discovery().api_watch(&ctx, "apps", "v1").await?;
//! while let Ok((event_type, resource)) = watcher.next().await {
//!     println!("{} {:?}", event_type, resource.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod codec;
pub mod config;
pub mod error;
pub mod kube;
pub mod resource;
pub mod watch;

pub use error::{
    ApiError, DecodeError, EncodeError, Error, ErrorKind, FramingError, Result, StreamClosed,
    TransportError, ValidationError,
};
pub use kube::{Client, Credentials, ListOptions};
pub use resource::{check_resource, ApiWatcher, Discovery, ThirdPartyResources};
pub use watch::{Framing, TypedWatcher, WatchCloser, Watcher};
