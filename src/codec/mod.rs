//! Wire codecs
//!
//! Two codecs are provided:
//!
//! - [`JsonCodec`] - self-describing text, used for user defined resources
//!   that have no protobuf schema
//! - [`ProtobufCodec`] - compact binary, used for well-known resources
//!
//! Codecs are stateless unit values; construct one where it is needed and
//! pass it to the dispatcher explicitly.

mod json;
mod protobuf;

pub use json::JsonCodec;
pub use protobuf::{decode_envelope, encode_envelope, ProtobufCodec, MAGIC};

use crate::error::{DecodeError, EncodeError};

/// Serialization strategy for values of type `T`
pub trait Codec<T>: Send + Sync {
    /// MIME type sent in `Content-Type` and `Accept`
    fn content_type(&self) -> &'static str;

    /// Serialize `value` into a request body
    fn encode(&self, value: &T) -> Result<Vec<u8>, EncodeError>;

    /// Parse a response body
    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError>;
}

/// Body format announced by a response's `Content-Type` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Protobuf,
}

impl ContentType {
    /// Classify a header value, ignoring parameters; `None` when unrecognized
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        let mime = value?.split(';').next()?.trim();
        match mime {
            protobuf::CONTENT_TYPE => Some(ContentType::Protobuf),
            json::CONTENT_TYPE => Some(ContentType::Json),
            _ if mime.ends_with("+json") => Some(ContentType::Json),
            _ => None,
        }
    }
}
