//! Decoding and encoding of order board messages.
//!
//! The wire format has no header.  A message is either the four ASCII bytes
//! `ping` or a UTF-8 JSON object with `active_orders` and `completed_orders`
//! arrays of non-negative integers.  Unknown members are ignored.

use serde::Deserialize;
use thiserror::Error;

use crate::protocol::messages::{Message, OrderNumber, OrderSnapshot, PING};

/// Errors that can occur while decoding or encoding a message.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// Zero bytes were received.
    #[error("empty message")]
    Empty,

    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    /// The payload is not a JSON document of the expected shape.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(String),

    /// A required member is absent (or `null`) and lenient decoding is off.
    #[error("missing required member `{0}`")]
    MissingMember(&'static str),

    /// A snapshot could not be serialized.
    #[error("failed to encode snapshot: {0}")]
    Encode(String),
}

/// Knobs that change how payloads are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Treat a missing or `null` order list as an empty list instead of an error.
    pub lenient_missing_lists: bool,
}

impl DecodeOptions {
    /// Strict decoding: both order lists must be present.
    pub const STRICT: Self = Self {
        lenient_missing_lists: false,
    };

    /// Lenient decoding: absent lists default to empty.
    pub const LENIENT: Self = Self {
        lenient_missing_lists: true,
    };
}

/// Payload shape before the missing-member policy is applied.
#[derive(Debug, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    active_orders: Option<Vec<OrderNumber>>,
    #[serde(default)]
    completed_orders: Option<Vec<OrderNumber>>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one message from `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError`] when `bytes` is empty, not UTF-8, not a JSON
/// object with integer arrays, or (in strict mode) lacks one of the lists.
///
/// # Examples
///
/// ```rust
/// use orderboard_core::protocol::{decode_message, DecodeOptions, Message};
///
/// assert_eq!(decode_message(b"ping", DecodeOptions::STRICT).unwrap(), Message::Ping);
///
/// let msg = decode_message(
///     br#"{"active_orders": [12, 45], "completed_orders": [7]}"#,
///     DecodeOptions::STRICT,
/// )
/// .unwrap();
/// match msg {
///     Message::Snapshot(s) => assert_eq!(s.active, vec![12, 45]),
///     Message::Ping => unreachable!(),
/// }
/// ```
pub fn decode_message(bytes: &[u8], options: DecodeOptions) -> Result<Message, ProtocolError> {
    if bytes.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if bytes == PING {
        return Ok(Message::Ping);
    }

    let text = std::str::from_utf8(bytes).map_err(|e| ProtocolError::InvalidUtf8(e.to_string()))?;
    let raw: RawSnapshot =
        serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    let active = resolve_list(raw.active_orders, "active_orders", options)?;
    let completed = resolve_list(raw.completed_orders, "completed_orders", options)?;

    Ok(Message::Snapshot(OrderSnapshot { active, completed }))
}

/// Serializes a snapshot into the JSON payload a controller sends.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode_snapshot(snapshot: &OrderSnapshot) -> Result<Vec<u8>, ProtocolError> {
    serde_json::to_vec(snapshot).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Returns `true` if `bytes` already forms a whole message, so the reader can
/// stop waiting for more data.
///
/// A complete message is the heartbeat literal or any syntactically complete
/// JSON value.  Whether that value is a valid snapshot is decided later by
/// [`decode_message`].
pub fn is_complete_message(bytes: &[u8]) -> bool {
    if bytes == PING {
        return true;
    }
    // Heartbeat prefixes ("p", "pi", "pin") never parse as JSON, so they keep
    // the reader waiting.
    serde_json::from_slice::<serde::de::IgnoredAny>(bytes).is_ok()
}

fn resolve_list(
    list: Option<Vec<OrderNumber>>,
    member: &'static str,
    options: DecodeOptions,
) -> Result<Vec<OrderNumber>, ProtocolError> {
    match list {
        Some(list) => Ok(list),
        None if options.lenient_missing_lists => Ok(Vec::new()),
        None => Err(ProtocolError::MissingMember(member)),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
