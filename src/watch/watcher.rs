//! Raw watch stream decoder

use std::fmt;

use futures::stream::{self, Stream};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use super::text::TextDecoder;
use super::{binary, Framing, MAX_FRAME_SIZE};
use crate::api::meta::Unknown;
use crate::api::watch::Event;
use crate::error::{Error, ErrorKind, Result, StreamClosed};

/// Readable response body owned by a [`Watcher`]
pub type BodyReader = Box<dyn AsyncRead + Send + Unpin>;

/// Decodes a watch response body into a sequence of events
///
/// The watcher is `Open` until [`close`](Watcher::close) is called, the
/// server ends the stream, or a read fails for good; after that every call
/// to [`next`](Watcher::next) returns [`Error::StreamClosed`] without
/// touching the network.
pub struct Watcher {
    reader: Option<BodyReader>,
    framing: Framing,
    max_frame_size: usize,
    text: TextDecoder,
    ctx: CancellationToken,
    closed: CancellationToken,
    closed_reason: Option<StreamClosed>,
}

/// Handle that closes a [`Watcher`] from another task
#[derive(Debug, Clone)]
pub struct WatchCloser {
    token: CancellationToken,
}

impl WatchCloser {
    /// Close the watch; a blocked `next()` returns `StreamClosed`
    pub fn close(&self) {
        self.token.cancel();
    }
}

impl Watcher {
    /// Wrap an open body. `ctx` governs the connection: cancelling it makes a
    /// pending or future `next()` fail with [`Error::Cancelled`].
    pub fn new<R>(reader: R, framing: Framing, ctx: CancellationToken) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Some(Box::new(reader)),
            framing,
            max_frame_size: MAX_FRAME_SIZE,
            text: TextDecoder::default(),
            ctx,
            closed: CancellationToken::new(),
            closed_reason: None,
        }
    }

    /// Limit a single frame or JSON record to `max` bytes instead of
    /// [`MAX_FRAME_SIZE`]; anything larger fails with `FrameTooLarge`
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// How this body delimits events
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// False once closed, cancelled, ended by the server or corrupted
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Handle that can close this watcher from another task
    pub fn closer(&self) -> WatchCloser {
        WatchCloser {
            token: self.closed.clone(),
        }
    }

    /// Wait for the next event
    ///
    /// Returns the event and the envelope holding its undecoded payload.
    pub async fn next(&mut self) -> Result<(Event, Unknown)> {
        if self.closed.is_cancelled() {
            self.shutdown(StreamClosed::Closed);
        }
        if let Some(reason) = self.closed_reason {
            return Err(reason.into());
        }

        let ctx = self.ctx.clone();
        let closed = self.closed.clone();
        let result: Result<(Event, Unknown)> = tokio::select! {
            biased;
            _ = closed.cancelled() => Err(StreamClosed::Closed.into()),
            _ = ctx.cancelled() => Err(Error::Cancelled),
            result = self.read_next() => result,
        };

        match &result {
            Ok((event, _)) => {
                tracing::trace!(
                    event_type = %event.event_type,
                    bytes = event.object.len(),
                    "watch event"
                );
            },
            Err(err) if self.is_terminal(err) => {
                match err {
                    Error::StreamClosed(StreamClosed::EndOfStream) => {
                        tracing::debug!("watch stream ended by server");
                        self.shutdown(StreamClosed::EndOfStream);
                    },
                    Error::Framing(_) => {
                        tracing::warn!(error = %err, "corrupt watch stream");
                        self.shutdown(StreamClosed::Closed);
                    },
                    _ => {
                        tracing::debug!(error = %err, "watch stream terminated");
                        self.shutdown(StreamClosed::Closed);
                    },
                }
            },
            Err(err) => {
                tracing::debug!(error = %err, "skipping undecodable watch event");
            },
        }
        result
    }

    async fn read_next(&mut self) -> Result<(Event, Unknown)> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(StreamClosed::Closed.into());
        };
        match self.framing {
            Framing::Binary => {
                let payload = binary::read_frame(reader, self.max_frame_size).await?;
                binary::decode_event(&payload)
            },
            Framing::Text => self.text.next_event(reader, self.max_frame_size).await,
        }
    }

    /// Whether `err` leaves the stream unusable
    fn is_terminal(&self, err: &Error) -> bool {
        match err.kind() {
            ErrorKind::Decode => self.framing == Framing::Text && self.text.is_poisoned(),
            _ => true,
        }
    }

    fn shutdown(&mut self, reason: StreamClosed) {
        self.reader = None;
        self.closed_reason.get_or_insert(reason);
    }

    /// Release the body. Closing an already closed watcher is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.reader.is_some() {
            tracing::debug!("closing watch stream");
        }
        self.closed.cancel();
        self.shutdown(StreamClosed::Closed);
        Ok(())
    }

    /// Adapt into a [`Stream`] that ends when the watch is closed
    pub fn into_stream(self) -> impl Stream<Item = Result<(Event, Unknown)>> + Send {
        stream::unfold(Some(self), |state| async move {
            let Some(mut watcher) = state else {
                return None;
            };
            match watcher.next().await {
                Ok(item) => Some((Ok(item), Some(watcher))),
                Err(Error::StreamClosed(_)) => None,
                Err(err) => {
                    let keep = watcher.is_open().then_some(watcher);
                    Some((Err(err), keep))
                },
            }
        })
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("framing", &self.framing)
            .field("open", &self.is_open())
            .field("closed_reason", &self.closed_reason)
            .finish()
    }
}
