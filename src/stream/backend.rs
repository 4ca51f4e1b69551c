//! Stream backend trait for downloading media data.
//!
//! A [`StreamBackend`] takes a resolved [`FormatRecord`] and writes the
//! media to a file. Two implementations are available:
//! [`HttpBackend`](super::backends::HttpBackend) for progressive downloads
//! and [`FfmpegBackend`](super::backends::FfmpegBackend) for everything
//! segmented.

use std::path::Path;

use async_trait::async_trait;

use super::format::{FormatRecord, Protocol};
use crate::error::Result;

/// Identifies which backend implementation is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// Direct HTTP body download.
    Http,
    /// ffmpeg subprocess.
    Ffmpeg,
}

impl BackendType {
    /// Backend able to download a format delivered over `protocol`.
    pub fn for_protocol(protocol: Protocol) -> Self {
        match protocol {
            Protocol::Http => Self::Http,
            Protocol::M3u8 | Protocol::M3u8Native | Protocol::NiconicoLive => {
                Self::Ffmpeg
            }
        }
    }
}

/// Callback invoked periodically with download progress.
pub type ProgressCallback = Box<dyn Fn(DownloadProgress) + Send + Sync>;

/// Snapshot of download progress at a point in time.
#[derive(Debug, Clone, Default)]
pub struct DownloadProgress {
    /// Total bytes written so far, when the backend can tell.
    pub bytes_downloaded: u64,
    /// Total bytes expected, if the server declared a length.
    pub bytes_total: Option<u64>,
    /// Media time written so far, for backends that report it.
    pub media_seconds: Option<f64>,
    /// Wall-clock seconds since the download started.
    pub elapsed_seconds: f64,
}

/// Trait for media download backends.
#[async_trait]
pub trait StreamBackend: Send + Sync {
    /// The type of this backend.
    fn backend_type(&self) -> BackendType;

    /// Returns `true` if this backend can download `format`.
    fn can_handle(&self, format: &FormatRecord) -> bool;

    /// Download `format` into `path`, overwriting it.
    async fn download(
        &self,
        format: &FormatRecord,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<()>;
}
