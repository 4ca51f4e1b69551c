//! Live broadcast relay
//!
//! A live broadcast's playlist URL is announced over a WebSocket control
//! channel. The relay keeps that channel open for as long as the stream is
//! being recorded, since the service releases the viewer seat as soon as
//! it stops receiving `pong`/`keepSeat` replies.

pub mod message;
pub mod relay;
pub mod supervisor;

pub use message::LiveControlMessage;
pub use relay::{ChannelConnector, ControlChannel, Outcome};
pub use supervisor::{LiveRelay, LiveSession};

pub const LIVE_ORIGIN: &str = "https://live2.nicovideo.jp";

/// Qualities the live service accepts in `startWatching`.
pub const LIVE_QUALITIES: [&str; 6] = ["abr", "super_low", "low", "normal", "high", "super_high"];

/// Handshake headers for the control channel.
pub fn handshake_headers(cookies: Option<&str>, user_agent: &str) -> Vec<(String, String)> {
    vec![
        ("Cookie".into(), cookies.unwrap_or_default().into()),
        ("Origin".into(), LIVE_ORIGIN.into()),
        ("Accept".into(), "*/*".into()),
        ("User-Agent".into(), user_agent.into()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_headers() {
        let headers = handshake_headers(Some("user_session=abc"), "UA/1.0");
        assert_eq!(headers[0], ("Cookie".into(), "user_session=abc".into()));
        assert_eq!(headers[1].1, LIVE_ORIGIN);
        assert_eq!(headers[3], ("User-Agent".into(), "UA/1.0".into()));

        let anonymous = handshake_headers(None, "UA/1.0");
        assert_eq!(anonymous[0].1, "");
    }
}
