//! Reassembly of chunked inbound messages.
//!
//! Hosts that cap the size of a single frame split large protocol messages
//! into an envelope sequence:
//!
//! ```json
//! { "messageChunk": "{\"id\":1,\"res", "messageSize": 24 }
//! { "messageChunk": "ult\":{}}" }
//! ```
//!
//! A non-zero `messageSize` starts a new message; the message is complete
//! once the buffered length (in bytes) reaches it. Frames without a
//! `messageChunk` field are ordinary messages and share the connection with
//! chunked ones.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use serde::de::IgnoredAny;
use tracing::trace;

use crate::error::{Error, Result};

// ============================================================================
// ChunkEnvelope
// ============================================================================

#[derive(Deserialize)]
struct ChunkEnvelope {
    #[serde(rename = "messageChunk")]
    message_chunk: String,
    #[serde(rename = "messageSize", default)]
    message_size: usize,
}

/// Only looks for the `messageChunk` key.
#[derive(Deserialize)]
struct EnvelopeMarker {
    #[serde(rename = "messageChunk")]
    message_chunk: Option<IgnoredAny>,
}

// ============================================================================
// ChunkAssembler
// ============================================================================

/// Buffers chunks until a full message is available.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    buffer: String,
    expected: usize,
}

impl ChunkAssembler {
    /// Creates an empty assembler.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` while a message is partially buffered.
    #[inline]
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.expected > 0
    }

    /// Returns `true` if `frame` is a JSON object with a `messageChunk` field.
    #[must_use]
    pub fn is_envelope(frame: &str) -> bool {
        serde_json::from_str::<EnvelopeMarker>(frame).is_ok_and(|m| m.message_chunk.is_some())
    }

    /// Feeds one envelope frame.
    ///
    /// Returns the complete message once its last chunk arrives.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the frame is not an envelope or the
    /// chunk sequence is inconsistent. The partial buffer is discarded.
    pub fn push_frame(&mut self, frame: &str) -> Result<Option<String>> {
        let envelope: ChunkEnvelope = serde_json::from_str(frame)
            .map_err(|e| Error::protocol(format!("invalid chunk envelope: {e}")))?;
        self.push(&envelope.message_chunk, envelope.message_size)
    }

    /// Feeds one chunk; `size` is non-zero only on the first chunk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] on a continuation chunk with no message
    /// in progress, or when the buffer grows past the announced size.
    pub fn push(&mut self, chunk: &str, size: usize) -> Result<Option<String>> {
        if size > 0 {
            if self.in_progress() {
                trace!(
                    buffered = self.buffer.len(),
                    expected = self.expected,
                    "Discarding incomplete chunked message"
                );
            }
            self.buffer.clear();
            self.expected = size;
        } else if !self.in_progress() {
            return Err(Error::protocol("continuation chunk without a message in progress"));
        }

        self.buffer.push_str(chunk);

        if self.buffer.len() > self.expected {
            let overflow = self.buffer.len();
            let expected = self.expected;
            self.reset();
            return Err(Error::protocol(format!(
                "chunked message overflow: {overflow} bytes, expected {expected}"
            )));
        }

        if self.buffer.len() == self.expected {
            self.expected = 0;
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }

        Ok(None)
    }

    /// Drops any partially buffered message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.expected = 0;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_chunk_message() {
        let mut assembler = ChunkAssembler::new();
        let out = assembler.push("{\"id\":1}", 8).unwrap();
        assert_eq!(out.as_deref(), Some("{\"id\":1}"));
        assert!(!assembler.in_progress());
    }

    #[test]
    fn test_multi_chunk_message() {
        let mut assembler = ChunkAssembler::new();
        let message = r#"{"id":1,"result":{}}"#;
        let (head, tail) = message.split_at(9);

        assert_eq!(assembler.push(head, message.len()).unwrap(), None);
        assert!(assembler.in_progress());
        assert_eq!(assembler.push(tail, 0).unwrap().as_deref(), Some(message));
    }

    #[test]
    fn test_envelope_frames() {
        let mut assembler = ChunkAssembler::new();
        let first = r#"{"messageChunk":"{\"id\":","messageSize":8}"#;
        let second = r#"{"messageChunk":"1}"}"#;
        // {"id":1} is 8 bytes; the first chunk carries 6 of them.
        assert_eq!(assembler.push_frame(first).unwrap(), None);
        assert_eq!(assembler.push_frame(second).unwrap().as_deref(), Some("{\"id\":1}"));
    }

    #[test]
    fn test_continuation_without_start() {
        let mut assembler = ChunkAssembler::new();
        assert!(assembler.push("abc", 0).is_err());
    }

    #[test]
    fn test_overflow_resets() {
        let mut assembler = ChunkAssembler::new();
        assert!(assembler.push("abcdef", 3).is_err());
        assert!(!assembler.in_progress());
    }

    #[test]
    fn test_new_message_replaces_partial() {
        let mut assembler = ChunkAssembler::new();
        assert_eq!(assembler.push("ab", 10).unwrap(), None);
        assert_eq!(assembler.push("xyz", 3).unwrap().as_deref(), Some("xyz"));
    }

    #[test]
    fn test_is_envelope() {
        assert!(ChunkAssembler::is_envelope(r#"{"messageChunk":"{}","messageSize":2}"#));
        assert!(ChunkAssembler::is_envelope(r#"{"messageChunk":"x"}"#));
        assert!(!ChunkAssembler::is_envelope(r#"{"id":1,"result":{}}"#));
        assert!(!ChunkAssembler::is_envelope("not json"));
        assert!(!ChunkAssembler::is_envelope("[1]"));
    }

    #[test]
    fn test_invalid_envelope() {
        let mut assembler = ChunkAssembler::new();
        assert!(assembler.push_frame(r#"{"id":1}"#).is_err());
    }
}
