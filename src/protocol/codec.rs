//! Frame encoding for subscriptions and heartbeats.
//!
//! The manager never interprets message content. It only needs to turn
//! descriptors into frames and opportunistically decode inbound text.
//! Hosts speaking a different subscription dialect plug in their own
//! [`FrameCodec`].

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value, from_str, json, to_string};
use tracing::trace;

use crate::error::Result;
use crate::transport::Frame;

use super::{Descriptor, Payload};

// ============================================================================
// FrameCodec
// ============================================================================

/// Encodes outbound control frames and decodes inbound payloads.
pub trait FrameCodec: Send + Sync + 'static {
    /// Encodes a subscribe request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the descriptor cannot
    /// be serialized.
    fn encode_subscribe(&self, descriptor: &Descriptor) -> Result<String>;

    /// Encodes an unsubscribe request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if the descriptor cannot
    /// be serialized.
    fn encode_unsubscribe(&self, descriptor: &Descriptor) -> Result<String>;

    /// Returns the liveness probe frame.
    fn heartbeat(&self) -> Frame;

    /// Decodes an inbound text frame. Never fails.
    fn decode_text(&self, text: &str) -> Payload;

    /// Decodes any inbound frame.
    ///
    /// Control frames (ping/pong) carry no payload and yield `None`.
    fn decode(&self, frame: Frame) -> Option<Payload> {
        match frame {
            Frame::Text(text) => Some(self.decode_text(&text)),
            Frame::Binary(bytes) => Some(Payload::Binary(bytes)),
            Frame::Ping(_) | Frame::Pong(_) => None,
        }
    }
}

// ============================================================================
// JsonCodec
// ============================================================================

/// Default JSON codec.
///
/// | Operation | Frame |
/// |-----------|-------|
/// | subscribe | descriptor verbatim |
/// | unsubscribe | descriptor with `"type": "unsubscribe"` merged in |
/// | heartbeat | `{"type":"ping"}` |
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl FrameCodec for JsonCodec {
    fn encode_subscribe(&self, descriptor: &Descriptor) -> Result<String> {
        Ok(to_string(descriptor)?)
    }

    fn encode_unsubscribe(&self, descriptor: &Descriptor) -> Result<String> {
        let frame = match descriptor {
            Value::Object(fields) => {
                let mut merged = Map::with_capacity(fields.len() + 1);
                merged.insert("type".to_owned(), Value::from("unsubscribe"));
                for (key, value) in fields {
                    if key != "type" {
                        merged.insert(key.clone(), value.clone());
                    }
                }
                Value::Object(merged)
            }
            other => json!({ "type": "unsubscribe", "descriptor": other }),
        };

        Ok(to_string(&frame)?)
    }

    fn heartbeat(&self) -> Frame {
        Frame::Text(r#"{"type":"ping"}"#.to_owned())
    }

    fn decode_text(&self, text: &str) -> Payload {
        match from_str::<Value>(text) {
            Ok(value) => Payload::Json(value),
            Err(e) => {
                trace!(error = %e, "Inbound text is not JSON, passing through raw");
                Payload::Raw(text.to_owned())
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
