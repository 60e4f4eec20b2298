//! Protobuf watch framing

use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::api::meta::Unknown;
use crate::api::watch::{Event, EventType, WireEvent};
use crate::codec::{decode_envelope, MAGIC};
use crate::error::{DecodeError, FramingError, Result, StreamClosed, TransportError};

/// Magic plus big-endian length
pub const FRAME_HEADER_LEN: usize = 8;

/// Read bytes until `buf` is full or the reader hits EOF
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Read one frame and return its payload. Frames declaring more than
/// `max_len` bytes are rejected before anything is allocated.
pub(super) async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let got = read_full(reader, &mut header)
        .await
        .map_err(TransportError::Read)?;
    match got {
        0 => return Err(StreamClosed::EndOfStream.into()),
        FRAME_HEADER_LEN => {},
        got => return Err(FramingError::TruncatedHeader { got }.into()),
    }

    let mut magic = [0u8; 4];
    magic.copy_from_slice(&header[..4]);
    if magic != MAGIC {
        return Err(FramingError::BadMagic { found: magic }.into());
    }

    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > max_len {
        return Err(FramingError::FrameTooLarge { len, max: max_len }
        .into());
    }

    let mut payload = vec![0u8; len];
    let got = read_full(reader, &mut payload)
        .await
        .map_err(TransportError::Read)?;
    if got < len {
        return Err(FramingError::TruncatedPayload { expected: len, got }.into());
    }
    Ok(payload)
}

/// Decode a frame payload into the event and its nested envelope
pub(super) fn decode_event(payload: &[u8]) -> Result<(Event, Unknown)> {
    let wire = WireEvent::decode(payload).map_err(DecodeError::from)?;
    let event_type: EventType = wire
        .r#type
        .as_deref()
        .ok_or_else(|| DecodeError::new("watch event has no type"))?
        .parse()?;
    let object = wire
        .object
        .and_then(|object| object.raw)
        .ok_or_else(|| DecodeError::new("watch event has no object"))?;
    let unknown = decode_envelope(&object)?;
    Ok((Event { event_type, object }, unknown))
}

/// Build a frame around an encoded event payload
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}
