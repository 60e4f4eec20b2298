//! Typed layer over [`Watcher`]

use std::fmt;
use std::marker::PhantomData;

use super::{Framing, WatchCloser, Watcher};
use crate::api::meta::Status;
use crate::api::watch::EventType;
use crate::codec::{Codec, ProtobufCodec};
use crate::error::{ApiError, DecodeError, Result};

/// Decodes each watch payload into `T` with codec `C`
///
/// Errors from [`next`](TypedWatcher::next) keep their origin: a payload
/// that does not match `T` is [`Error::Decode`](crate::Error::Decode) and
/// leaves the stream usable, while stream failures come through unchanged.
/// `ERROR` events carry a `Status` and are returned as
/// [`Error::Api`](crate::Error::Api).
///
/// The codec has to match the body's framing: a JSON body cannot be read
/// with [`ProtobufCodec`]. [`for_codec`](TypedWatcher::for_codec) checks
/// this up front.
pub struct TypedWatcher<T, C = ProtobufCodec> {
    watcher: Watcher,
    codec: C,
    _object: PhantomData<fn() -> T>,
}

impl<T> TypedWatcher<T, ProtobufCodec> {
    /// Decode protobuf payloads; `watcher` is expected to be binary framed
    pub fn new(watcher: Watcher) -> Self {
        Self::with_codec(watcher, ProtobufCodec)
    }
}

impl<T, C> TypedWatcher<T, C> {
    /// Decode payloads with `codec`, without checking the framing
    pub fn with_codec(watcher: Watcher, codec: C) -> Self {
        Self {
            watcher,
            codec,
            _object: PhantomData,
        }
    }

    /// Handle that can close the underlying watcher from another task
    pub fn closer(&self) -> WatchCloser {
        self.watcher.closer()
    }

    /// Close the underlying watcher
    pub fn close(&mut self) -> Result<()> {
        self.watcher.close()
    }

    /// Give back the raw watcher
    pub fn into_inner(self) -> Watcher {
        self.watcher
    }
}

impl<T, C> TypedWatcher<T, C>
where
    C: Codec<Status>,
{
    /// Like [`with_codec`](TypedWatcher::with_codec), but fails with
    /// [`Error::Decode`](crate::Error::Decode) when the server answered in a
    /// format `codec` cannot read. The watcher is closed in that case.
    pub fn for_codec(mut watcher: Watcher, codec: C) -> Result<Self> {
        let content_type = codec.content_type();
        let expected = Framing::from_content_type(Some(content_type));
        if watcher.framing() != expected {
            tracing::warn!(
                framing = ?watcher.framing(),
                codec = content_type,
                "watch response format does not match the requested codec"
            );
            watcher.close()?;
            return Err(DecodeError::new(format!(
                "watch response is {:?} framed but the codec expects {}",
                watcher.framing(),
                content_type
            ))
            .into());
        }
        Ok(Self::with_codec(watcher, codec))
    }
}

impl<T, C> TypedWatcher<T, C>
where
    C: Codec<T> + Codec<Status>,
{
    /// Wait for the next event and decode its object
    pub async fn next(&mut self) -> Result<(EventType, T)> {
        let (event, unknown) = self.watcher.next().await?;
        if event.event_type == EventType::Error {
            let status: Status = <C as Codec<Status>>::decode(&self.codec, unknown.raw())?;
            let code = status
                .code
                .and_then(|code| u16::try_from(code).ok())
                .unwrap_or(500);
            return Err(ApiError::from_status(code, status).into());
        }
        let object = <C as Codec<T>>::decode(&self.codec, unknown.raw())?;
        Ok((event.event_type, object))
    }
}

impl<T, C: fmt::Debug> fmt::Debug for TypedWatcher<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedWatcher")
            .field("watcher", &self.watcher)
            .field("codec", &self.codec)
            .field("object", &std::any::type_name::<T>())
            .finish()
    }
}
