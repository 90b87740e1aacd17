//! Status change events and their wire format.
//!
//! An event frame is a JSON object:
//!
//! ```text
//! { "kind": "<event kind>", "created": "<RFC3339>", "meta": <any JSON> }
//! ```
//!
//! `meta` is passthrough data. It is kept as the raw JSON bytes received and
//! handed to listeners without interpretation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;

use crate::error::CodecError;

/// A single status change event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Event {
    /// Kind of status change; the dispatch key.
    pub kind: String,
    /// Time the event occurred.
    pub created: DateTime<Utc>,
    /// Raw JSON passthrough data. Empty only when the frame had no `meta`
    /// key; an explicit `null` is kept as the bytes `null`.
    pub meta: Vec<u8>,
}

#[derive(Deserialize)]
struct WireEventIn<'a> {
    #[serde(default)]
    kind: String,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    #[serde(default, borrow, deserialize_with = "present_raw")]
    meta: Option<&'a RawValue>,
}

/// `Some` whenever the key is present, including for `null`.
fn present_raw<'de, D>(deserializer: D) -> Result<Option<&'de RawValue>, D::Error>
where
    D: Deserializer<'de>,
{
    <&'de RawValue>::deserialize(deserializer).map(Some)
}

#[derive(Serialize)]
struct WireEventOut<'a> {
    kind: &'a str,
    created: &'a DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a RawValue>,
}

impl Event {
    /// Create a new event stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, meta: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: kind.into(),
            created: Utc::now(),
            meta: meta.into(),
        }
    }

    /// Decode an event from a wire frame.
    ///
    /// A missing `kind` or `created` takes its zero value.
    /// `meta` is kept verbatim whenever the key is present.
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let wire: WireEventIn<'_> = serde_json::from_slice(frame).map_err(|e| CodecError::Decode {
            message: e.to_string(),
        })?;

        Ok(Self {
            kind: wire.kind,
            created: wire.created.unwrap_or_default(),
            meta: wire.meta.map(|m| m.get().as_bytes().to_vec()).unwrap_or_default(),
        })
    }

    /// Encode this event as a wire frame.
    ///
    /// Empty `meta` is omitted from the frame. Fails if `meta` is non-empty
    /// and not valid JSON.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let meta = if self.meta.is_empty() {
            None
        } else {
            Some(serde_json::from_slice::<&RawValue>(&self.meta).map_err(|e| CodecError::Encode {
                message: format!("meta is not valid JSON: {e}"),
            })?)
        };

        let wire = WireEventOut {
            kind: &self.kind,
            created: &self.created,
            meta,
        };
        serde_json::to_vec(&wire).map_err(|e| CodecError::Encode {
            message: e.to_string(),
        })
    }

    /// Meta as UTF-8 text, if it is.
    #[must_use]
    pub fn meta_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.meta).ok()
    }
}
