//! Watch stream decoding
//!
//! A watch is a long-lived response body carrying one change event after
//! another. Decoding happens in two layers:
//!
//! - [`Watcher`] - owns the body, splits it into messages and yields each
//!   event together with its still undecoded payload ([`Unknown`])
//! - [`TypedWatcher`] - decodes that payload into a concrete type with a
//!   [`Codec`](crate::codec::Codec)
//!
//! Two framings exist. Protobuf watches send `k8s\0 | u32 BE length |
//! payload` frames; JSON watches send one JSON object per event.
//!
//! [`Unknown`]: crate::api::meta::Unknown

mod binary;
mod text;
mod typed;
mod watcher;

pub use binary::{encode_frame, FRAME_HEADER_LEN};
pub use typed::TypedWatcher;
pub use watcher::{BodyReader, WatchCloser, Watcher};

use crate::codec::ContentType;

/// Upper bound for a single frame or JSON record
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// How events are delimited on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Magic + length prefixed protobuf frames
    Binary,
    /// Concatenated JSON objects
    Text,
}

impl Framing {
    /// Pick the framing matching a response `Content-Type`
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match ContentType::from_header(content_type) {
            Some(ContentType::Protobuf) => Framing::Binary,
            _ => Framing::Text,
        }
    }
}
