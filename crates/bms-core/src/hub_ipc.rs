//! NDJSON envelopes spoken between a feed client and the push hub socket.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Wire protocol revision. Sent as a string; older hubs send a bare number or `"v1"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WireVersion", into = "WireVersion")]
pub struct ProtocolVersion(pub u16);

impl ProtocolVersion {
    pub const CURRENT: Self = Self(1);

    pub fn is_supported(self) -> bool {
        self.0 >= 1 && self.0 <= Self::CURRENT.0
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireVersion {
    Number(u64),
    Text(String),
}

impl From<ProtocolVersion> for WireVersion {
    fn from(version: ProtocolVersion) -> Self {
        WireVersion::Text(version.0.to_string())
    }
}

impl TryFrom<WireVersion> for ProtocolVersion {
    type Error = String;

    fn try_from(raw: WireVersion) -> Result<Self, Self::Error> {
        let parsed = match &raw {
            WireVersion::Number(value) => u16::try_from(*value).ok(),
            WireVersion::Text(text) => text.trim().trim_start_matches('v').parse().ok(),
        };
        parsed.map(ProtocolVersion).ok_or_else(|| match raw {
            WireVersion::Number(value) => format!("protocol version out of range: {value}"),
            WireVersion::Text(text) => format!("invalid protocol version '{text}'"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HubEnvelope {
    #[serde(default)]
    pub version: ProtocolVersion,
    pub sender_id: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub msg: HubMsg,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum HubMsg {
    Hello(HelloPayload),
    Subscribe(TopicPayload),
    Unsubscribe(TopicPayload),
    Ready(TopicPayload),
    Event(PushEventPayload),
    Error(HubErrorPayload),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HelloPayload {
    pub client_id: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicPayload {
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushEventPayload {
    pub topic: String,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HubErrorPayload {
    #[serde(default)]
    pub topic: Option<String>,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("unterminated line of {size} bytes exceeds the {max} byte limit")]
    LineTooLong { size: usize, max: usize },
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),
    #[error("malformed frame: {0}")]
    Malformed(String),
}

impl HubEnvelope {
    /// Stamps `msg` with the current protocol version and time.
    pub fn new(sender_id: impl Into<String>, msg: HubMsg) -> Self {
        Self {
            version: ProtocolVersion::CURRENT,
            sender_id: sender_id.into(),
            timestamp: Utc::now().to_rfc3339(),
            request_id: None,
            msg,
        }
    }

    /// One newline-terminated JSON line.
    pub fn encode(&self, max_frame_bytes: usize) -> Result<Vec<u8>, FrameError> {
        let mut line =
            serde_json::to_vec(self).map_err(|err| FrameError::Malformed(err.to_string()))?;
        if line.len() > max_frame_bytes {
            return Err(FrameError::TooLarge {
                size: line.len(),
                max: max_frame_bytes,
            });
        }
        line.push(b'\n');
        Ok(line)
    }

    /// Parses one line without its terminator and refuses versions this client does not speak.
    pub fn decode(line: &[u8], max_frame_bytes: usize) -> Result<Self, FrameError> {
        if line.len() > max_frame_bytes {
            return Err(FrameError::TooLarge {
                size: line.len(),
                max: max_frame_bytes,
            });
        }
        let envelope: Self =
            serde_json::from_slice(line).map_err(|err| FrameError::Malformed(err.to_string()))?;
        if !envelope.version.is_supported() {
            return Err(FrameError::UnsupportedVersion(envelope.version.0));
        }
        Ok(envelope)
    }
}

/// Cuts a byte stream into lines. An unterminated tail may not grow past the limit.
#[derive(Debug)]
pub struct LineSplitter {
    max_line_bytes: usize,
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new(max_line_bytes: usize) -> Self {
        Self {
            max_line_bytes,
            buf: Vec::new(),
        }
    }

    /// Appends `chunk`. On overflow the unterminated tail is dropped; complete
    /// lines already buffered are kept.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), FrameError> {
        self.buf.extend_from_slice(chunk);
        let complete = self
            .buf
            .iter()
            .rposition(|byte| *byte == b'\n')
            .map_or(0, |newline| newline + 1);
        let tail = self.buf.len() - complete;
        if tail > self.max_line_bytes {
            self.buf.truncate(complete);
            return Err(FrameError::LineTooLong {
                size: tail,
                max: self.max_line_bytes,
            });
        }
        Ok(())
    }

    /// Next complete line, without `\n` or `\r\n`. Blank lines are skipped.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let newline = self.buf.iter().position(|byte| *byte == b'\n')?;
            let mut line: Vec<u8> = self.buf.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                return Some(line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_line(topic: &str) -> Vec<u8> {
        HubEnvelope::new(
            "hub",
            HubMsg::Event(PushEventPayload {
                topic: topic.to_string(),
                event: ".message.sent".to_string(),
                data: serde_json::json!({"id": 1, "user_name": "ana", "message": "hola"}),
            }),
        )
        .encode(DEFAULT_MAX_FRAME_BYTES)
        .expect("encode")
    }

    #[test]
    fn envelope_wire_shape_is_flat_type_and_payload() {
        let value: Value = serde_json::from_slice(&event_line("chat.Admin")).expect("json");
        assert_eq!(value["type"], "event");
        assert_eq!(value["version"], "1");
        assert_eq!(value["sender_id"], "hub");
        assert_eq!(value["payload"]["topic"], "chat.Admin");
        assert!(value.get("request_id").is_none());
    }

    #[test]
    fn decode_accepts_legacy_versions_and_refuses_newer_ones() {
        let ready = |version: &str| {
            format!(
                r#"{{"version":{version},"sender_id":"hub","timestamp":"t","type":"ready","payload":{{"topic":"notifications"}}}}"#
            )
        };
        let envelope =
            HubEnvelope::decode(ready("\"v1\"").as_bytes(), DEFAULT_MAX_FRAME_BYTES).expect("v1");
        assert_eq!(envelope.version, ProtocolVersion(1));
        assert!(HubEnvelope::decode(ready("1").as_bytes(), DEFAULT_MAX_FRAME_BYTES).is_ok());

        assert_eq!(
            HubEnvelope::decode(ready("2").as_bytes(), DEFAULT_MAX_FRAME_BYTES),
            Err(FrameError::UnsupportedVersion(2))
        );
        assert!(matches!(
            HubEnvelope::decode(ready("\"next\"").as_bytes(), DEFAULT_MAX_FRAME_BYTES),
            Err(FrameError::Malformed(_))
        ));
    }

    #[test]
    fn oversized_envelopes_are_refused_both_ways() {
        let line = event_line("chat.Admin");
        let envelope = HubEnvelope::decode(&line[..line.len() - 1], DEFAULT_MAX_FRAME_BYTES)
            .expect("decode");
        assert!(matches!(
            envelope.encode(16),
            Err(FrameError::TooLarge { max: 16, .. })
        ));
        assert!(matches!(
            HubEnvelope::decode(&line, 16),
            Err(FrameError::TooLarge { max: 16, .. })
        ));
    }

    #[test]
    fn splitter_reassembles_lines_across_chunks() {
        let mut bytes = event_line("chat.Admin");
        bytes.extend_from_slice(b"\r\n\n");
        bytes.extend_from_slice(&event_line("chat.Seguridad"));

        let mut lines = LineSplitter::new(DEFAULT_MAX_FRAME_BYTES);
        let (head, tail) = bytes.split_at(17);
        lines.feed(head).expect("head");
        assert!(lines.next_line().is_none());
        lines.feed(tail).expect("tail");

        let topics: Vec<String> = std::iter::from_fn(|| lines.next_line())
            .map(|line| HubEnvelope::decode(&line, DEFAULT_MAX_FRAME_BYTES).expect("decode"))
            .filter_map(|envelope| match envelope.msg {
                HubMsg::Event(payload) => Some(payload.topic),
                _ => None,
            })
            .collect();
        assert_eq!(topics, vec!["chat.Admin", "chat.Seguridad"]);
    }

    #[test]
    fn splitter_drops_runaway_tail_but_keeps_complete_lines() {
        let mut lines = LineSplitter::new(8);
        assert_eq!(
            lines.feed(b"ok\n0123456789abcdef"),
            Err(FrameError::LineTooLong { size: 16, max: 8 })
        );
        assert_eq!(lines.next_line(), Some(b"ok".to_vec()));
        assert!(lines.next_line().is_none());
    }
}
