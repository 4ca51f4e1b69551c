//! Error types shared by the negotiation, relay and radio components.

use thiserror::Error;

/// Errors raised while resolving or keeping alive a media stream.
#[derive(Error, Debug)]
pub enum StreamError {
    /// Session creation failed permanently (after retries, where eligible).
    #[error("session negotiation for {format_id} failed after {attempts} attempt(s): {source}")]
    Negotiation {
        format_id: String,
        attempts: u32,
        #[source]
        source: Box<StreamError>,
    },

    /// A remote endpoint answered with an unexpected status.
    #[error("HTTP error {status} from {url}")]
    Http { status: u16, url: String },

    /// Control-channel I/O failure. The reconnect supervisor recovers from these.
    #[error("control channel error: {0}")]
    Transport(String),

    /// The live service sent an explicit error frame, or the relay could not
    /// be started at all.
    #[error("live service error: {0}")]
    Remote(String),

    /// A downloader backend failed (e.g. ffmpeg exited with an error).
    #[error("download failed: {0}")]
    Download(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl StreamError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            Self::Negotiation { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Session creation answers 500/503/404 while the backend is warming up.
    pub fn is_transient_http(&self) -> bool {
        matches!(self.status(), Some(500 | 503 | 404))
    }

    /// Connection-level failures the live relay reconnects after.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Io(_))
    }
}

impl From<tungstenite::Error> for StreamError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
