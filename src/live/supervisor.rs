//! Reconnect supervision for the live relay.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::relay::{run_attempt, AttemptEnd, ChannelConnector, Outcome, OutcomeSignal};
use crate::error::{Result, StreamError};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Builder for a supervised live relay.
pub struct LiveRelay {
    connector: Arc<dyn ChannelConnector>,
    quality: String,
    reconnect_delay: Duration,
}

impl LiveRelay {
    pub fn new(connector: Arc<dyn ChannelConnector>, quality: impl Into<String>) -> Self {
        Self {
            connector,
            quality: quality.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Wait applied before reconnecting after a transport failure.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Spawn the relay. It keeps running, and keeps the seat, until the
    /// returned session is dropped or the service reports an error.
    pub fn start(self) -> LiveSession {
        let (signal, outcome) = OutcomeSignal::new();
        let quality = self.quality.clone();
        let task = tokio::spawn(supervise(
            self.connector,
            self.quality,
            self.reconnect_delay,
            signal,
        ));
        LiveSession {
            outcome: Some(outcome),
            received: None,
            quality,
            task,
        }
    }
}

async fn supervise(
    connector: Arc<dyn ChannelConnector>,
    quality: String,
    delay: Duration,
    mut signal: OutcomeSignal,
) {
    let mut reconnect = false;
    loop {
        match run_attempt(connector.as_ref(), &quality, reconnect, &mut signal).await {
            Ok(AttemptEnd::Failed) => return,
            Ok(AttemptEnd::Disconnected) => {
                info!("Control channel disconnected, reconnecting");
            }
            Err(e) if e.is_transport() => {
                warn!(
                    "Connection error occurred, reconnecting after {} seconds: {e}",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                warn!("Live relay stopped: {e}");
                signal.fire(Outcome::Failed(e.to_string()));
                return;
            }
        }
        reconnect = true;
    }
}

/// A running live relay.
#[derive(Debug)]
pub struct LiveSession {
    outcome: Option<oneshot::Receiver<Outcome>>,
    received: Option<Outcome>,
    quality: String,
    task: JoinHandle<()>,
}

impl LiveSession {
    pub fn quality(&self) -> &str {
        &self.quality
    }

    /// Wait until the relay resolves a playlist URL or fails.
    ///
    /// Can be called again; later calls return the same result.
    pub async fn wait(&mut self) -> Result<String> {
        if let Some(rx) = self.outcome.take() {
            self.received = rx.await.ok();
        }
        match &self.received {
            Some(Outcome::Resolved(url)) => Ok(url.clone()),
            Some(Outcome::Failed(message)) => Err(StreamError::Remote(message.clone())),
            None => Err(StreamError::Transport(
                "live relay stopped before resolving a stream".into(),
            )),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::super::message::{KEEP_SEAT, PONG};
    use super::super::relay::testing::{Script, ScriptedConnector};
    use super::super::relay::ControlChannel;
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STREAM: &str = r#"{"type":"stream","data":{"uri":"https://live.example/a.m3u8"}}"#;

    #[tokio::test(start_paused = true)]
    async fn test_failures_then_stream() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            None,
            Some(Script::frames(&[r#"{"type":"ping"}"#])),
            Some(Script::hanging(&[STREAM])),
        ]));
        let started = tokio::time::Instant::now();

        let mut session = LiveRelay::new(connector.clone(), "high").start();
        let url = session.wait().await.unwrap();

        assert_eq!(url, "https://live.example/a.m3u8");
        let connects = connector.connect_times();
        assert_eq!(connects.len(), 3);
        assert!(connects[1] - connects[0] >= DEFAULT_RECONNECT_DELAY);
        assert!(connects[2] - connects[1] >= DEFAULT_RECONNECT_DELAY);
        assert!(started.elapsed() >= DEFAULT_RECONNECT_DELAY * 2);

        // The first connect failed, so every startWatching sent is a reconnect
        let sent = connector.sent();
        assert!(sent[0].contains(r#""reconnect":true"#));
        assert_eq!(&sent[1..3], [PONG, KEEP_SEAT]);
        assert!(sent[3].contains(r#""reconnect":true"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_reconnects_immediately() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            Some(Script::frames(&[r#"{"type":"disconnect"}"#])),
            Some(Script::hanging(&[STREAM])),
        ]));

        let mut session = LiveRelay::new(connector.clone(), "normal").start();
        session.wait().await.unwrap();

        let connects = connector.connect_times();
        assert_eq!(connects.len(), 2);
        assert!(connects[1] - connects[0] < Duration::from_secs(1));
        assert!(connector.sent()[1].contains(r#""reconnect":true"#));
        assert_eq!(session.quality(), "normal");
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_is_not_reconnect() {
        let connector = Arc::new(ScriptedConnector::new(vec![Some(Script::hanging(&[STREAM]))]));

        let mut session = LiveRelay::new(connector.clone(), "high").start();
        session.wait().await.unwrap();

        let sent = connector.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains(r#""type":"startWatching""#));
        assert!(sent[0].contains(r#""reconnect":false"#));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transport_error_fails_relay() {
        let connector = Arc::new(BrokenConnector::default());

        let mut session = LiveRelay::new(connector.clone(), "high").start();
        let err = session.wait().await.unwrap_err();

        assert!(matches!(err, StreamError::Remote(ref m) if m.contains("invalid WebSocket URL")));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        tokio::task::yield_now().await;
        assert!(!session.is_running());
    }

    /// Connector whose URL can never be connected to.
    #[derive(Default)]
    struct BrokenConnector {
        connects: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ChannelConnector for BrokenConnector {
        async fn connect(&self) -> Result<Box<dyn ControlChannel>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Err(StreamError::Parse("invalid WebSocket URL wss//x".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_delay() {
        let connector = Arc::new(ScriptedConnector::new(vec![
            None,
            Some(Script::hanging(&[STREAM])),
        ]));

        let mut session = LiveRelay::new(connector.clone(), "high")
            .with_reconnect_delay(Duration::from_secs(3))
            .start();
        session.wait().await.unwrap();

        let connects = connector.connect_times();
        let gap = connects[1] - connects[0];
        assert!(gap >= Duration::from_secs(3));
        assert!(gap < DEFAULT_RECONNECT_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_frame_is_remote_error() {
        let connector = Arc::new(ScriptedConnector::new(vec![Some(Script::frames(&[
            r#"{"type":"error","body":{"code":"NO_PERMISSION"}}"#,
        ]))]));

        let mut session = LiveRelay::new(connector.clone(), "high").start();
        let err = session.wait().await.unwrap_err();
        assert!(matches!(err, StreamError::Remote(ref code) if code == "NO_PERMISSION"));

        // Same answer on a second wait, and the relay has stopped
        assert!(matches!(session.wait().await, Err(StreamError::Remote(_))));
        tokio::task::yield_now().await;
        assert!(!session.is_running());
        assert_eq!(connector.connect_times().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seat_held_after_resolve() {
        let connector = Arc::new(ScriptedConnector::new(vec![Some(Script::hanging(&[
            STREAM,
            r#"{"type":"ping"}"#,
        ]))]));

        let mut session = LiveRelay::new(connector.clone(), "high").start();
        session.wait().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(session.is_running());
        assert_eq!(&connector.sent()[1..], [PONG, KEEP_SEAT]);
        drop(session);
    }
}
