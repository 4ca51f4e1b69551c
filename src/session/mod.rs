//! DMC session negotiation
//!
//! Turns a watch page's delivery manifest into downloadable formats:
//!
//! 1. [`manifest`] resolves (audio, video, transport) candidates
//! 2. [`negotiator`] creates one remote session per candidate
//! 3. [`retry`] retries session creation on transient statuses
//! 4. [`heartbeat`] keeps a session alive while it is downloaded

pub mod heartbeat;
pub mod manifest;
pub mod negotiator;
pub mod quality;
pub mod retry;

use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::info;

pub use heartbeat::{spawn_heartbeat, HeartbeatHandle};
pub use manifest::{resolve_candidates, DeliveryManifest, StreamCandidate, Transport};
pub use negotiator::SessionNegotiator;
pub use retry::RetryPolicy;

use crate::error::{Result, StreamError};
use crate::stream::format::{sort_formats, FormatRecord, Protocol};

/// A negotiated session and what it takes to keep it alive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionDescriptor {
    pub session_id: String,
    pub content_uri: String,
    pub protocol: Protocol,
    pub heartbeat_url: String,
    /// Serialized `data` of the session-creation response, sent back verbatim.
    #[serde(skip)]
    pub heartbeat_payload: String,
    #[serde(
        rename = "heartbeat_interval_seconds",
        serialize_with = "serialize_secs"
    )]
    pub heartbeat_interval: Duration,
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Heartbeat period for a session declared to live `lifetime_ms`.
///
/// The session is refreshed eight times per lifetime.
pub fn heartbeat_interval(lifetime_ms: u64) -> Result<Duration> {
    if lifetime_ms == 0 {
        return Err(StreamError::Parse(
            "session declares a non-positive heartbeat lifetime".into(),
        ));
    }
    Ok(Duration::from_millis(lifetime_ms) / 8)
}

/// Negotiate every candidate of `manifest`, best format last.
///
/// One candidate failing permanently fails the whole item.
pub async fn negotiate_formats(
    negotiator: &SessionNegotiator,
    retry: &RetryPolicy,
    manifest: &DeliveryManifest,
    video_id: &str,
) -> Result<Vec<FormatRecord>> {
    let candidates = resolve_candidates(manifest)?;
    info!("Negotiating {} candidate(s) for {video_id}", candidates.len());

    let mut formats = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let format_id = candidate.format_id();
        let format = retry
            .run(&format_id, || {
                negotiator.negotiate(manifest, video_id, candidate)
            })
            .await?;
        formats.push(format);
    }

    sort_formats(&mut formats);
    Ok(formats)
}
