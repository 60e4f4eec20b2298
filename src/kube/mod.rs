//! API server access
//!
//! - [`auth`] - bearer token sources
//! - [`http`] - request dispatcher
//! - [`client`] - endpoint, namespace and URL construction

pub mod auth;
pub mod client;
pub mod http;

pub use auth::Credentials;
pub use client::{Client, ListOptions, DEFAULT_NAMESPACE};
pub use http::{format_api_error, HttpClient};
