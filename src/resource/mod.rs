//! Resource clients
//!
//! Thin call sites over [`Client`](crate::kube::Client): each operation
//! validates the resource identity, builds a URL and picks a codec.
//!
//! - [`Discovery`] - server version, API groups and resources
//! - [`ThirdPartyResources`] - user defined API groups, JSON only

mod discovery;
mod third_party;

pub use discovery::{ApiWatcher, Discovery};
pub use third_party::ThirdPartyResources;

use crate::error::ValidationError;

/// Check that every identity component of a request is present
///
/// Fields are checked in order and the first empty one is reported. `name`
/// is `None` for operations that act on a collection (create, list, watch).
pub fn check_resource(
    api_group: &str,
    api_version: &str,
    resource: &str,
    namespace: &str,
    name: Option<&str>,
) -> Result<(), ValidationError> {
    if api_group.is_empty() {
        return Err(ValidationError::MissingApiGroup);
    }
    if api_version.is_empty() {
        return Err(ValidationError::MissingApiVersion);
    }
    if resource.is_empty() {
        return Err(ValidationError::MissingResource);
    }
    if namespace.is_empty() {
        return Err(ValidationError::MissingNamespace);
    }
    if name.is_some_and(str::is_empty) {
        return Err(ValidationError::MissingName);
    }
    Ok(())
}
