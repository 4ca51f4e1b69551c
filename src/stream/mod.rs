//! Media extraction and download
//!
//! Extractors turn page URLs into [`MediaInfo`] with sorted
//! [`FormatRecord`]s; the [`Downloader`] hands a chosen format to the
//! HTTP or ffmpeg backend and keeps its session alive meanwhile.

pub mod backend;
pub mod backends;
pub mod download;
pub mod format;
pub mod provider;
pub mod providers;

pub use backend::{BackendType, DownloadProgress, ProgressCallback, StreamBackend};
pub use download::Downloader;
pub use format::{sort_formats, FormatRecord, LiveParams, Protocol};
pub use provider::{MediaExtractor, MediaInfo, PlaylistEntry};
pub use providers::{extractors, find_extractor};
