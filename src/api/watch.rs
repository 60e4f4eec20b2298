//! Watch events

use std::fmt;
use std::str::FromStr;

use prost::Message;
use serde::{Deserialize, Serialize};

use super::meta::RawExtension;
use crate::error::DecodeError;

/// Kind of change a watch event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Error,
}

impl EventType {
    /// Wire spelling of the event type
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Added => "ADDED",
            EventType::Modified => "MODIFIED",
            EventType::Deleted => "DELETED",
            EventType::Error => "ERROR",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADDED" => Ok(EventType::Added),
            "MODIFIED" => Ok(EventType::Modified),
            "DELETED" => Ok(EventType::Deleted),
            "ERROR" => Ok(EventType::Error),
            other => Err(DecodeError::new(format!("unknown watch event type {:?}", other))),
        }
    }
}

/// Protobuf encoding of a single watch event, the payload of one frame
#[derive(Clone, PartialEq, Eq, Message)]
pub struct WireEvent {
    #[prost(string, optional, tag = "1")]
    pub r#type: Option<String>,
    #[prost(message, optional, tag = "2")]
    pub object: Option<RawExtension>,
}

impl WireEvent {
    /// Event whose object holds `object` as raw bytes
    pub fn new(event_type: EventType, object: Vec<u8>) -> Self {
        Self {
            r#type: Some(event_type.as_str().to_string()),
            object: Some(RawExtension { raw: Some(object) }),
        }
    }
}

/// A decoded change event
///
/// `object` holds the codec specific serialization of the changed resource,
/// or of a `Status` when `event_type` is [`EventType::Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub event_type: EventType,
    pub object: Vec<u8>,
}
