//! `streamgate` - Stream session negotiation and live relay
//!
//! # Features
//!
//! - **DMC sessions**: Negotiate one delivery session per audio/video/transport
//!   candidate, with retries and a keep-alive heartbeat while downloading
//! - **Live relay**: Resolve a live playlist over a WebSocket control channel,
//!   reconnecting on failure and holding the viewer seat
//! - **Time-shifted radio**: Locate a past program in the station schedule and
//!   build its authenticated playlists
//! - **Downloads**: Direct HTTP or ffmpeg, chosen by the format's protocol
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streamgate::{config::Config, radio::AuthCache, stream, HttpClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let client = Arc::new(HttpClient::new(&config)?);
//!     let extractors = stream::extractors(client, &config, Arc::new(AuthCache::new()));
//!
//!     let url = "https://www.nicovideo.jp/watch/sm9";
//!     let info = stream::find_extractor(&extractors, url)?.extract(url).await?;
//!     println!("{}: {} formats", info.title, info.formats.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod hls;
pub mod http_client;
pub mod live;
pub mod radio;
pub mod session;
pub mod stream;
pub mod websocket;

pub use error::{Result, StreamError};
pub use http_client::{HttpClient, SessionTransport};
pub use live::{LiveRelay, LiveSession};
pub use session::{SessionDescriptor, SessionNegotiator};
pub use stream::{Downloader, FormatRecord, MediaExtractor, MediaInfo, Protocol};
pub use websocket::{WebSocket, WebSocketConnector, WebSocketMessage};

/// Version of streamgate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
