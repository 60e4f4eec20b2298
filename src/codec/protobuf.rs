use prost::Message;

use super::Codec;
use crate::api::meta::Unknown;
use crate::error::{DecodeError, EncodeError};

pub(super) const CONTENT_TYPE: &str = "application/vnd.kubernetes.protobuf";

/// Prefix of every protobuf envelope, and of every binary watch frame
pub const MAGIC: [u8; 4] = *b"k8s\0";

/// Protobuf codec
///
/// Encoded values are wrapped the way the API server wraps them: the four
/// magic bytes followed by an [`Unknown`] whose `raw` field holds the
/// message. Decoding also accepts a bare message without the envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProtobufCodec;

impl<T> Codec<T> for ProtobufCodec
where
    T: Message + Default,
{
    fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    fn encode(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        let unknown = Unknown {
            raw: Some(value.encode_to_vec()),
            content_type: Some(CONTENT_TYPE.to_string()),
            ..Unknown::default()
        };
        Ok(encode_envelope(&unknown))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        if bytes.starts_with(&MAGIC) {
            let unknown = decode_envelope(bytes)?;
            return Ok(T::decode(unknown.raw())?);
        }
        Ok(T::decode(bytes)?)
    }
}

/// Serialize an envelope with its magic prefix
pub fn encode_envelope(unknown: &Unknown) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAGIC.len() + unknown.encoded_len());
    buf.extend_from_slice(&MAGIC);
    buf.extend_from_slice(&unknown.encode_to_vec());
    buf
}

/// Parse a magic-prefixed envelope
pub fn decode_envelope(bytes: &[u8]) -> Result<Unknown, DecodeError> {
    let Some(body) = bytes.strip_prefix(MAGIC.as_slice()) else {
        let prefix = &bytes[..bytes.len().min(MAGIC.len())];
        return Err(DecodeError::new(format!(
            "envelope is missing the protobuf magic prefix (found {:02x?})",
            prefix
        )));
    };
    Ok(Unknown::decode(body)?)
}
