//! Keep-alive task for a negotiated session.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use super::SessionDescriptor;
use crate::http_client::SessionTransport;

/// Owns a running heartbeat; dropping it stops the heartbeat.
#[derive(Debug)]
pub struct HeartbeatHandle {
    task: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Stop sending heartbeats.
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start sending `session`'s heartbeat payload every
/// `session.heartbeat_interval`, beginning immediately.
///
/// Failures are logged and the next tick is attempted anyway.
pub fn spawn_heartbeat(
    transport: Arc<dyn SessionTransport>,
    session: &SessionDescriptor,
) -> HeartbeatHandle {
    let url = session.heartbeat_url.clone();
    let payload = session.heartbeat_payload.clone();
    let period = session.heartbeat_interval;
    let session_id = session.session_id.clone();

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match transport.keep_alive(&url, &payload).await {
                Ok(()) => debug!("Heartbeat sent for session {session_id}"),
                Err(e) => warn!("Heartbeat for session {session_id} failed: {e}"),
            }
        }
    });

    HeartbeatHandle { task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{descriptor, FakeTransport};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_fires_every_interval() {
        let transport = Arc::new(FakeTransport::default());
        let session = descriptor(Duration::from_secs(15));

        let handle = spawn_heartbeat(transport.clone(), &session);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.keep_alive_count(), 1);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(transport.keep_alive_count(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.keep_alive_count(), 4);

        let calls = transport.keep_alives();
        assert_eq!(calls[0].0, session.heartbeat_url);
        assert_eq!(calls[0].1, session.heartbeat_payload);
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_heartbeat() {
        let transport = Arc::new(FakeTransport::default());
        transport.fail_keep_alive(true);
        let session = descriptor(Duration::from_secs(15));

        let handle = spawn_heartbeat(transport.clone(), &session);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(transport.keep_alive_count(), 3);
        assert!(handle.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_heartbeat() {
        let transport = Arc::new(FakeTransport::default());
        let session = descriptor(Duration::from_secs(15));

        let handle = spawn_heartbeat(transport.clone(), &session);
        tokio::time::sleep(Duration::from_millis(1)).await;
        handle.stop();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.keep_alive_count(), 1);
    }
}
