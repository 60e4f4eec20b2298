//! API object definitions
//!
//! Only the messages the client core itself needs are defined here:
//!
//! - [`meta`] - type/object metadata, the `Unknown` envelope and `Status`
//! - [`discovery`] - server version and API group/resource discovery
//! - [`watch`] - watch event wire message and decoded event
//!
//! Protobuf field numbers follow `k8s.io/apimachinery` so the messages are
//! wire compatible with a real API server.

pub mod discovery;
pub mod meta;
pub mod watch;
