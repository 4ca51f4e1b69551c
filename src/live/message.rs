//! Control-channel message codec.

use serde_json::{json, Value};

/// Reply to a `ping`, sent before [`KEEP_SEAT`].
pub const PONG: &str = r#"{"type":"pong"}"#;
/// Tells the service the viewer slot is still in use.
pub const KEEP_SEAT: &str = r#"{"type":"keepSeat"}"#;

/// An inbound control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveControlMessage {
    /// Playlist announcement; `uri` may be empty.
    Stream { uri: String },
    Ping,
    Disconnect,
    /// Fatal error; `message` is the error code when present, otherwise the
    /// raw frame.
    Error { message: String },
    Other { kind: Option<String> },
}

impl LiveControlMessage {
    /// Decode one text frame. Blank frames and frames that are not JSON
    /// objects yield `None`.
    pub fn decode(frame: &str) -> Option<Self> {
        let frame = frame.trim();
        if frame.is_empty() {
            return None;
        }
        let value: Value = serde_json::from_str(frame).ok()?;
        let object = value.as_object()?;

        let message = match object.get("type").and_then(Value::as_str) {
            Some("stream") => Self::Stream {
                uri: value
                    .pointer("/data/uri")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            },
            Some("ping") => Self::Ping,
            Some("disconnect") => Self::Disconnect,
            Some("error") => Self::Error {
                message: value
                    .pointer("/body/code")
                    .and_then(Value::as_str)
                    .unwrap_or(frame)
                    .to_string(),
            },
            other => Self::Other {
                kind: other.map(str::to_string),
            },
        };
        Some(message)
    }
}

/// The `startWatching` command opening every relay attempt.
pub fn start_watching(quality: &str, reconnect: bool) -> String {
    json!({
        "type": "startWatching",
        "data": {
            "stream": {
                "quality": quality,
                "protocol": "hls",
                "latency": "high",
                "chasePlay": false,
            },
            "room": {
                "protocol": "webSocket",
                "commentable": true,
            },
            "reconnect": reconnect,
        }
    })
    .to_string()
}

/// First 100 characters of a frame, for logging.
pub fn truncate_frame(frame: &str) -> String {
    const LIMIT: usize = 100;
    match frame.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &frame[..idx]),
        None => frame.to_string(),
    }
}
