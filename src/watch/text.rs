//! JSON watch framing
//!
//! The server writes one JSON object per event with no length prefix. Reads
//! can split an object anywhere, so bytes accumulate in `pending` while a
//! [`Scanner`] tracks object nesting. The buffer is only handed to
//! `serde_json` once the outermost object has closed, so each byte is
//! scanned once however many reads a record spans.

use serde::Deserialize;
use serde_json::value::RawValue;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::api::meta::{TypeMeta, Unknown};
use crate::api::watch::{Event, EventType};
use crate::error::{DecodeError, FramingError, Result, StreamClosed, TransportError};

const READ_CHUNK: usize = 8 * 1024;
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Deserialize)]
struct TextEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    object: Option<Box<RawValue>>,
}

/// Incremental brace matcher over the start of `pending`
#[derive(Debug, Default)]
struct Scanner {
    /// Bytes of `pending` already looked at
    pos: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// A non-whitespace byte was seen
    started: bool,
    /// The record does not start with `{`; let the parser judge it
    scalar: bool,
}

impl Scanner {
    /// Advance over unseen bytes of `buf`. Returns true once the first value
    /// may be complete, leaving `pos` just past its closing brace.
    fn advance(&mut self, buf: &[u8]) -> bool {
        if self.scalar {
            self.pos = buf.len();
            return true;
        }
        while self.pos < buf.len() {
            let byte = buf[self.pos];
            self.pos += 1;

            if !self.started {
                if byte.is_ascii_whitespace() {
                    continue;
                }
                self.started = true;
                if byte != b'{' {
                    self.scalar = true;
                    self.pos = buf.len();
                    return true;
                }
                self.depth = 1;
                continue;
            }

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return true;
                    }
                },
                _ => {},
            }
        }
        false
    }
}

#[derive(Debug, Default)]
pub(super) struct TextDecoder {
    pending: Vec<u8>,
    scan: Scanner,
    poisoned: bool,
}

impl TextDecoder {
    /// Malformed input was seen; the stream cannot be trusted any more
    pub(super) fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Read until one complete record is buffered and decode it. A record
    /// that grows past `max_record` bytes is a framing error.
    pub(super) async fn next_event<R>(
        &mut self,
        reader: &mut R,
        max_record: usize,
    ) -> Result<(Event, Unknown)>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let complete = self.scan.advance(&self.pending);
            if self.scan.pos > max_record {
                return Err(FramingError::FrameTooLarge {
                    len: self.scan.pos,
                    max: max_record,
                }
                .into());
            }
            if complete {
                if let Some(record) = self.take_record()? {
                    return decode_record(record);
                }
            } else if !self.scan.started {
                // Only whitespace so far (the server sometimes appends `\n`)
                self.pending.clear();
                self.scan = Scanner::default();
            }

            let n = reader.read(&mut chunk).await.map_err(TransportError::Read)?;
            if n == 0 {
                return Err(self.finish());
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
    }

    /// Pop the first complete record off `pending`, if there is one
    fn take_record(&mut self) -> Result<Option<TextEvent>> {
        let (parsed, consumed) = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.pending).into_iter::<TextEvent>();
            let parsed = stream.next();
            (parsed, stream.byte_offset())
        };
        match parsed {
            Some(Ok(record)) => {
                self.pending.drain(..consumed);
                self.scan = Scanner::default();
                Ok(Some(record))
            },
            Some(Err(err)) if err.is_eof() => Ok(None),
            Some(Err(err)) => {
                tracing::error!(
                    pending_bytes = self.pending.len(),
                    error = %err,
                    "Error while decoding watch record"
                );
                self.poisoned = true;
                Err(DecodeError::from(err).into())
            },
            None => {
                self.pending.clear();
                self.scan = Scanner::default();
                Ok(None)
            },
        }
    }

    /// Error to report once the reader is exhausted
    fn finish(&self) -> crate::Error {
        if self.pending.iter().all(u8::is_ascii_whitespace) {
            StreamClosed::EndOfStream.into()
        } else {
            FramingError::TruncatedRecord {
                pending: self.pending.len(),
            }
            .into()
        }
    }
}

fn decode_record(record: TextEvent) -> Result<(Event, Unknown)> {
    let event_type: EventType = record.event_type.parse()?;
    let object = record
        .object
        .ok_or_else(|| DecodeError::new("watch event has no object"))?;

    let type_meta = serde_json::from_str::<TypeMeta>(object.get())
        .ok()
        .filter(|meta| meta.api_version.is_some() || meta.kind.is_some());
    let raw = object.get().as_bytes().to_vec();
    let unknown = Unknown {
        type_meta,
        raw: Some(raw.clone()),
        content_encoding: None,
        content_type: Some(JSON_CONTENT_TYPE.to_string()),
    };
    Ok((
        Event {
            event_type,
            object: raw,
        },
        unknown,
    ))
}
