//! Message codec for framing JSON-RPC messages.
//!
//! The stdio transport uses newline-delimited JSON (NDJSON): one message per
//! line, `\n` terminated, UTF-8.

use rapormcp_core::logging::{debug, targets};
use rapormcp_protocol::JsonRpcMessage;

/// Default maximum size of one framed message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Codec for encoding/decoding NDJSON-framed messages.
///
/// Decoding is incremental: partial lines are buffered until their newline
/// arrives. A malformed line yields an error entry and does not affect the
/// lines around it.
#[derive(Debug)]
pub struct Codec {
    /// Bytes of the line currently being received.
    buffer: Vec<u8>,
    /// Maximum allowed message size in bytes.
    max_message_size: usize,
    /// Set after an oversized line; bytes are dropped until the next newline.
    discarding: bool,
}

impl Default for Codec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec {
    /// Creates a codec with the default 10 MiB limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_message_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Creates a codec with a custom size limit.
    #[must_use]
    pub fn with_max_message_size(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_size,
            discarding: false,
        }
    }

    /// Returns the maximum allowed message size in bytes.
    #[must_use]
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Encodes a message as one NDJSON line.
    pub fn encode(&self, message: &JsonRpcMessage) -> Result<Vec<u8>, CodecError> {
        let mut bytes = serde_json::to_vec(message)?;
        if bytes.len() > self.max_message_size {
            return Err(CodecError::MessageTooLarge(bytes.len()));
        }
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Feeds received bytes, returning one entry per completed line.
    ///
    /// Blank lines are skipped.
    pub fn decode(&mut self, data: &[u8]) -> Vec<Result<JsonRpcMessage, CodecError>> {
        let mut out = Vec::new();
        let mut rest = data;

        while let Some(newline) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(newline);
            rest = &tail[1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if self.buffer.len() + head.len() > self.max_message_size {
                out.push(Err(CodecError::MessageTooLarge(self.buffer.len() + head.len())));
                self.buffer.clear();
                continue;
            }
            self.buffer.extend_from_slice(head);
            let line = std::mem::take(&mut self.buffer);
            if let Some(parsed) = self.parse_line(&line) {
                out.push(parsed);
            }
        }

        if !self.discarding && !rest.is_empty() {
            if self.buffer.len() + rest.len() > self.max_message_size {
                out.push(Err(CodecError::MessageTooLarge(self.buffer.len() + rest.len())));
                self.buffer.clear();
                self.discarding = true;
            } else {
                self.buffer.extend_from_slice(rest);
            }
        }

        out
    }

    /// Flushes a final unterminated line at end of input.
    pub fn finish(&mut self) -> Option<Result<JsonRpcMessage, CodecError>> {
        self.discarding = false;
        let line = std::mem::take(&mut self.buffer);
        self.parse_line(&line)
    }

    /// Drops any partially received line.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    fn parse_line(&self, line: &[u8]) -> Option<Result<JsonRpcMessage, CodecError>> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let parsed = serde_json::from_slice(line).map_err(CodecError::from);
        if let Err(ref err) = parsed {
            debug!(target: targets::CODEC, "Dropping malformed line: {}", err);
        }
        Some(parsed)
    }
}

/// Codec error types.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Message too large.
    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapormcp_protocol::{JsonRpcRequest, JsonRpcResponse, RequestId};
    use serde_json::json;

    fn line(value: serde_json::Value) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(&value).unwrap();
        bytes.push(b'\n');
        bytes
    }

    #[test]
    fn encode_appends_newline() {
        let codec = Codec::new();
        let request = JsonRpcRequest::new("tools/list", None, 1i64);
        let encoded = codec.encode(&request.into()).unwrap();
        assert!(encoded.ends_with(b"\n"));
        assert_eq!(encoded.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn decode_multiple_messages_in_one_chunk() {
        let mut codec = Codec::new();
        let mut data = line(json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}));
        data.extend(line(json!({"jsonrpc": "2.0", "id": 1, "result": {}})));

        let messages = codec.decode(&data);
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], Ok(JsonRpcMessage::Request(_))));
        assert!(matches!(messages[1], Ok(JsonRpcMessage::Response(_))));
    }

    #[test]
    fn decode_buffers_partial_lines() {
        let mut codec = Codec::new();
        let data = line(json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"}));
        let (first, second) = data.split_at(10);

        assert!(codec.decode(first).is_empty());
        let messages = codec.decode(second);
        assert_eq!(messages.len(), 1);
        let Ok(JsonRpcMessage::Request(request)) = &messages[0] else {
            panic!("expected request");
        };
        assert_eq!(request.id, Some(RequestId::from("a")));
    }

    #[test]
    fn malformed_line_does_not_poison_neighbours() {
        let mut codec = Codec::new();
        let mut data = b"{not json}\n".to_vec();
        data.extend(line(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})));

        let messages = codec.decode(&data);
        assert_eq!(messages.len(), 2);
        assert!(matches!(messages[0], Err(CodecError::Json(_))));
        assert!(messages[1].is_ok());
    }

    #[test]
    fn blank_and_crlf_lines() {
        let mut codec = Codec::new();
        let mut data = b"\n  \r\n".to_vec();
        let mut message = serde_json::to_vec(&json!({"jsonrpc": "2.0", "method": "x"})).unwrap();
        message.extend_from_slice(b"\r\n");
        data.extend(message);

        let messages = codec.decode(&data);
        assert_eq!(messages.len(), 1);
        assert!(messages[0].is_ok());
    }

    #[test]
    fn oversized_line_is_rejected_and_skipped() {
        let mut codec = Codec::with_max_message_size(16);
        let mut data = vec![b'x'; 40];
        data.push(b'\n');
        data.extend(b"{\"jsonrpc\":\"2.0\"".iter());

        let messages = codec.decode(&data);
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], Err(CodecError::MessageTooLarge(40))));
    }

    #[test]
    fn oversized_partial_line_discards_until_newline() {
        let mut codec = Codec::with_max_message_size(8);
        let first = codec.decode(&[b'y'; 20]);
        assert!(matches!(first[0], Err(CodecError::MessageTooLarge(20))));

        // Rest of the oversized line, then a small valid line.
        let mut data = b"yyyy\n".to_vec();
        data.extend(b"{}\n");
        let messages = codec.decode(&data);
        assert_eq!(messages.len(), 1);
        // `{}` is valid JSON but not a JSON-RPC message.
        assert!(matches!(messages[0], Err(CodecError::Json(_))));
    }

    #[test]
    fn finish_flushes_unterminated_line() {
        let mut codec = Codec::new();
        let data = serde_json::to_vec(&JsonRpcResponse::success(RequestId::from(3i64), json!({})))
            .unwrap();
        assert!(codec.decode(&data).is_empty());
        assert!(matches!(codec.finish(), Some(Ok(JsonRpcMessage::Response(_)))));
        assert!(codec.finish().is_none());
    }

    #[test]
    fn error_display() {
        assert_eq!(
            CodecError::MessageTooLarge(42).to_string(),
            "Message too large: 42 bytes"
        );
    }
}
