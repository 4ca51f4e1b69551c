//! One attempt of the live relay loop.
//!
//! An attempt moves through `Connecting -> Watching` and ends in one of
//! `Resolved`, `Disconnected` or `Failed`:
//!
//! - `Connecting`: open the control channel and send `startWatching`
//! - `Watching`: answer pings and wait for the playlist announcement
//! - `Resolved`: the first non-empty `stream` URL is published, and the
//!   attempt keeps the seat until the channel ends
//! - `Disconnected`: the service closed the session cleanly
//! - `Failed`: the service sent an error frame
//!
//! Losing the channel while watching is a transport error; the
//! [supervisor](super::supervisor) decides what happens next.

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument};

use super::message::{start_watching, truncate_frame, LiveControlMessage, KEEP_SEAT, PONG};
use crate::error::{Result, StreamError};

/// A bidirectional text-frame channel to the live service.
#[async_trait]
pub trait ControlChannel: Send {
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Next text frame, or `None` once the peer has closed the channel.
    async fn recv_text(&mut self) -> Result<Option<String>>;
}

/// Opens a fresh [`ControlChannel`] for every relay attempt.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ControlChannel>>;
}

/// Final result of a live relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Resolved(String),
    Failed(String),
}

/// Write-once slot the relay publishes its [`Outcome`] through.
#[derive(Debug)]
pub struct OutcomeSignal {
    tx: Option<oneshot::Sender<Outcome>>,
}

impl OutcomeSignal {
    pub fn new() -> (Self, oneshot::Receiver<Outcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn is_set(&self) -> bool {
        self.tx.is_none()
    }

    /// Publish `outcome`. Returns `false` if an outcome was already
    /// published, in which case `outcome` is discarded.
    pub fn fire(&mut self, outcome: Outcome) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The receiver may be gone; the outcome is still spent.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// How an attempt ended without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptEnd {
    Disconnected,
    Failed,
}

/// Run one relay attempt over a freshly connected channel.
#[instrument(skip(connector, signal))]
pub async fn run_attempt(
    connector: &dyn ChannelConnector,
    quality: &str,
    reconnect: bool,
    signal: &mut OutcomeSignal,
) -> Result<AttemptEnd> {
    let mut channel = connector.connect().await?;
    debug!("Sending HLS server request");
    channel.send_text(&start_watching(quality, reconnect)).await?;

    loop {
        let Some(frame) = channel.recv_text().await? else {
            return Err(StreamError::Transport(
                "control channel closed by peer".into(),
            ));
        };
        let Some(message) = LiveControlMessage::decode(&frame) else {
            continue;
        };

        match message {
            LiveControlMessage::Stream { uri } if !uri.is_empty() && !signal.is_set() => {
                info!("Live stream resolved");
                signal.fire(Outcome::Resolved(uri));
            }
            LiveControlMessage::Ping => {
                channel.send_text(PONG).await?;
                channel.send_text(KEEP_SEAT).await?;
            }
            LiveControlMessage::Disconnect => {
                info!("Server requested disconnect: {}", truncate_frame(&frame));
                return Ok(AttemptEnd::Disconnected);
            }
            LiveControlMessage::Error { message } => {
                signal.fire(Outcome::Failed(message));
                return Ok(AttemptEnd::Failed);
            }
            LiveControlMessage::Stream { .. } | LiveControlMessage::Other { .. } => {
                debug!("Server said: {}", truncate_frame(&frame));
            }
        }
    }
}
