//! Direct HTTP backend for progressive formats.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};

use crate::error::Result;
use crate::http_client::HttpClient;
use crate::stream::backend::{BackendType, DownloadProgress, ProgressCallback, StreamBackend};
use crate::stream::format::{FormatRecord, Protocol};

/// Report progress at most once per this many bytes.
const PROGRESS_STEP: u64 = 1024 * 1024;

/// Streams the response body of a format URL straight to disk.
pub struct HttpBackend {
    client: Arc<HttpClient>,
}

impl HttpBackend {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StreamBackend for HttpBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Http
    }

    fn can_handle(&self, format: &FormatRecord) -> bool {
        format.protocol == Protocol::Http
    }

    async fn download(
        &self,
        format: &FormatRecord,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let response = self
            .client
            .get_stream(&format.url, &format.header_pairs())
            .await?;
        let bytes_total = response.content_length();
        debug!("Downloading {:?} bytes from {}", bytes_total, format.url);

        let mut writer = BufWriter::new(File::create(path).await?);
        let mut body = response.bytes_stream();
        let start_time = Instant::now();
        let mut bytes_downloaded = 0u64;
        let mut next_report = PROGRESS_STEP;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            writer.write_all(&chunk).await?;
            bytes_downloaded += chunk.len() as u64;

            if bytes_downloaded >= next_report {
                next_report = bytes_downloaded + PROGRESS_STEP;
                if let Some(ref cb) = progress {
                    cb(DownloadProgress {
                        bytes_downloaded,
                        bytes_total,
                        media_seconds: None,
                        elapsed_seconds: start_time.elapsed().as_secs_f64(),
                    });
                }
            }
        }
        writer.flush().await?;

        if let Some(ref cb) = progress {
            cb(DownloadProgress {
                bytes_downloaded,
                bytes_total,
                media_seconds: None,
                elapsed_seconds: start_time.elapsed().as_secs_f64(),
            });
        }

        info!(
            "Saved {} ({} bytes) to {:?}",
            format.format_id, bytes_downloaded, path
        );
        Ok(())
    }
}
