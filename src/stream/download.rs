//! Download orchestration
//!
//! Picks a backend for a format and keeps whatever the remote side needs
//! alive while it runs: the DMC heartbeat for negotiated sessions, the
//! live relay's seat for live formats.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument};

use super::backend::{BackendType, ProgressCallback, StreamBackend};
use super::backends::{FfmpegBackend, HttpBackend};
use super::format::{FormatRecord, Protocol};
use super::provider::{MediaExtractor, MediaInfo, PlaylistEntry};
use super::providers::find_extractor;
use crate::config::Config;
use crate::error::{Result, StreamError};
use crate::http_client::{HttpClient, SessionTransport};
use crate::live::{handshake_headers, ChannelConnector, LiveRelay, LiveSession};
use crate::session::spawn_heartbeat;
use crate::websocket::WebSocketConnector;

/// Run `work` while `format`'s session heartbeat is armed.
///
/// The heartbeat stops as soon as `work` finishes, successfully or not.
pub async fn with_heartbeat<T, F>(
    transport: Arc<dyn SessionTransport>,
    format: &FormatRecord,
    work: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let heartbeat = format
        .heartbeat
        .as_ref()
        .map(|session| spawn_heartbeat(transport, session));
    let result = work.await;
    if let Some(handle) = heartbeat {
        handle.stop();
    }
    result
}

/// The backend for `format`'s protocol.
pub fn select_backend<'a>(
    backends: &'a [Box<dyn StreamBackend>],
    format: &FormatRecord,
) -> Result<&'a dyn StreamBackend> {
    let wanted = BackendType::for_protocol(format.protocol);
    backends
        .iter()
        .find(|b| b.backend_type() == wanted && b.can_handle(format))
        .map(|b| &**b)
        .ok_or_else(|| {
            StreamError::Download(format!(
                "no backend for {} ({})",
                format.format_id, format.protocol
            ))
        })
}

/// Start the relay for a live format and wait for its playlist URL.
///
/// The returned session holds the viewer seat; keep it until the
/// recording ends.
pub async fn resolve_live(
    connector: Arc<dyn ChannelConnector>,
    quality: &str,
    reconnect_delay: Duration,
) -> Result<(LiveSession, String)> {
    let mut session = LiveRelay::new(connector, quality)
        .with_reconnect_delay(reconnect_delay)
        .start();
    let url = session.wait().await?;
    info!("Live stream resolved at {quality} quality");
    Ok((session, url))
}

/// The downloadable format behind a resolved live playlist.
fn resolved_live_format(format: &FormatRecord, url: String) -> FormatRecord {
    FormatRecord {
        format_id: format.format_id.clone(),
        url,
        ext: format.ext.clone(),
        protocol: Protocol::M3u8,
        http_headers: format.http_headers.clone(),
        ..FormatRecord::default()
    }
}

/// File a playlist entry is saved to inside `dir`.
pub fn entry_path(dir: &Path, entry: &PlaylistEntry, ext: &str) -> PathBuf {
    dir.join(format!("{}.{ext}", entry.id))
}

/// `format_id` of `info`, or its best format.
fn choose_format<'a>(info: &'a MediaInfo, format_id: Option<&str>) -> Result<&'a FormatRecord> {
    match format_id {
        Some(id) => info
            .format(id)
            .ok_or_else(|| StreamError::NotFound(format!("no format {id} for {}", info.id))),
        None => info
            .best_format()
            .ok_or_else(|| StreamError::NotFound(format!("no downloadable formats for {}", info.id))),
    }
}

/// Downloads formats produced by the extractors.
pub struct Downloader {
    transport: Arc<dyn SessionTransport>,
    backends: Vec<Box<dyn StreamBackend>>,
    user_agent: String,
    live_quality: String,
    reconnect_delay: Duration,
}

impl Downloader {
    pub fn new(client: Arc<HttpClient>, config: &Config) -> Self {
        let mut ffmpeg = FfmpegBackend::new();
        if let Some(path) = &config.ffmpeg_path {
            ffmpeg = ffmpeg.with_ffmpeg_path(path);
        }
        let backends: Vec<Box<dyn StreamBackend>> =
            vec![Box::new(HttpBackend::new(client.clone())), Box::new(ffmpeg)];
        Self::with_backends(client, backends, config)
    }

    pub fn with_backends(
        transport: Arc<dyn SessionTransport>,
        backends: Vec<Box<dyn StreamBackend>>,
        config: &Config,
    ) -> Self {
        Self {
            transport,
            backends,
            user_agent: config.user_agent.clone(),
            live_quality: config.live_quality.clone(),
            reconnect_delay: config.reconnect_delay(),
        }
    }

    /// Quality to request for a live format.
    pub fn live_quality<'a>(&'a self, format: &'a FormatRecord) -> &'a str {
        format
            .live
            .as_ref()
            .map_or(self.live_quality.as_str(), |live| live.quality.as_str())
    }

    /// Control-channel connector for a live format.
    pub fn live_connector(&self, format: &FormatRecord) -> Arc<dyn ChannelConnector> {
        let cookies = format.live.as_ref().and_then(|l| l.cookies.as_deref());
        Arc::new(WebSocketConnector::new(
            format.url.clone(),
            handshake_headers(cookies, &self.user_agent),
        ))
    }

    /// Download `format` into `path`.
    #[instrument(skip(self, format, progress), fields(format_id = %format.format_id))]
    pub async fn download(
        &self,
        format: &FormatRecord,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        if format.protocol == Protocol::NiconicoLive {
            let connector = self.live_connector(format);
            return self.download_live(connector, format, path, progress).await;
        }

        let backend = select_backend(&self.backends, format)?;
        info!("Downloading {} via {:?}", format.format_id, backend.backend_type());
        with_heartbeat(
            self.transport.clone(),
            format,
            backend.download(format, path, progress),
        )
        .await
    }

    /// Resolve a live format over `connector` and record the stream.
    pub async fn download_live(
        &self,
        connector: Arc<dyn ChannelConnector>,
        format: &FormatRecord,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let quality = self.live_quality(format);
        let (session, url) = resolve_live(connector, quality, self.reconnect_delay).await?;

        let resolved = resolved_live_format(format, url);
        let backend = select_backend(&self.backends, &resolved)?;
        let result = backend.download(&resolved, path, progress).await;

        // Release the seat only once the recording is over
        drop(session);
        result
    }

    /// Extract and download every entry of `playlist` into `dir`, one after
    /// the other. The first failing entry aborts the rest.
    ///
    /// Returns the files written, in playlist order.
    pub async fn download_playlist<P>(
        &self,
        extractors: &[Box<dyn MediaExtractor>],
        playlist: &MediaInfo,
        dir: &Path,
        format_id: Option<&str>,
        progress: P,
    ) -> Result<Vec<PathBuf>>
    where
        P: Fn(&PlaylistEntry) -> Option<ProgressCallback>,
    {
        let entries = playlist.entries.as_deref().unwrap_or_default();
        tokio::fs::create_dir_all(dir).await?;

        let mut written = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            info!(
                "Downloading {} ({} of {})",
                entry.id,
                index + 1,
                entries.len()
            );
            let info = find_extractor(extractors, &entry.url)?
                .extract(&entry.url)
                .await?;
            let format = choose_format(&info, format_id)?;
            let path = entry_path(dir, entry, &format.ext);
            self.download(format, &path, progress(entry)).await?;
            written.push(path);
        }
        Ok(written)
    }
}
