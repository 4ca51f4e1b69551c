//! ffmpeg bridge backend
//!
//! Uses an ffmpeg subprocess for:
//! - HLS (encrypted or native) and live playlists
//! - Time-shifted radio, seeking with the format's input params
//! - Remuxing to the format's container without re-encoding

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Result, StreamError};
use crate::stream::backend::{BackendType, DownloadProgress, ProgressCallback, StreamBackend};
use crate::stream::format::{FormatRecord, Protocol};

/// ffmpeg-based download backend
pub struct FfmpegBackend {
    /// Path to ffmpeg binary
    ffmpeg_path: PathBuf,
}

impl FfmpegBackend {
    /// Create new ffmpeg backend, searching for binary in PATH
    pub fn new() -> Self {
        let ffmpeg_path = which::which("ffmpeg").unwrap_or_else(|_| PathBuf::from("ffmpeg"));
        Self { ffmpeg_path }
    }

    /// Specify custom ffmpeg binary path
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Build ffmpeg command arguments
    fn build_args(&self, format: &FormatRecord, output_path: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "warning", "-stats"]
            .iter()
            .map(ToString::to_string)
            .collect();

        if !format.http_headers.is_empty() {
            let header_str = format
                .http_headers
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join("\r\n");
            args.push("-headers".to_string());
            args.push(format!("{header_str}\r\n"));
        }

        // Reconnection for reliability
        args.extend(
            [
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "2",
            ]
            .iter()
            .map(ToString::to_string),
        );

        // Seek offsets and similar must precede the input
        args.extend(format.input_params.iter().cloned());

        args.push("-i".to_string());
        args.push(format.url.clone());

        // Copy streams without re-encoding
        args.extend(["-c", "copy"].iter().map(ToString::to_string));

        // ADTS audio from HLS segments needs rewrapping for MP4
        let segmented = matches!(
            format.protocol,
            Protocol::M3u8 | Protocol::M3u8Native | Protocol::NiconicoLive
        );
        if segmented && format.ext == "mp4" {
            args.extend(["-bsf:a", "aac_adtstoasc"].iter().map(ToString::to_string));
        }

        args.push("-y".to_string());
        args.push(output_path.to_string_lossy().into_owned());

        args
    }

    /// Parse progress from ffmpeg stderr
    fn parse_progress(line: &str) -> Option<FfmpegProgress> {
        // "size=   1234kB time=00:01:23.45 bitrate=1234.5kbits/s speed=1.5x"
        let time = line.split("time=").nth(1)?.split_whitespace().next()?;

        let parts: Vec<&str> = time.split(':').collect();
        if parts.len() != 3 {
            return None;
        }
        let hours: f64 = parts[0].parse().ok()?;
        let minutes: f64 = parts[1].parse().ok()?;
        let seconds: f64 = parts[2].parse().ok()?;

        let size_bytes = line.split("size=").nth(1).and_then(|s| {
            let s = s.split_whitespace().next()?;
            let kib = s
                .trim_end_matches("KiB")
                .trim_end_matches("kB")
                .parse::<u64>()
                .ok()?;
            Some(kib * 1024)
        });

        Some(FfmpegProgress {
            time_seconds: hours * 3600.0 + minutes * 60.0 + seconds,
            size_bytes,
        })
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamBackend for FfmpegBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Ffmpeg
    }

    fn can_handle(&self, format: &FormatRecord) -> bool {
        // ffmpeg can handle everything except the unresolved live relay URL
        format.protocol != Protocol::NiconicoLive
    }

    async fn download(
        &self,
        format: &FormatRecord,
        path: &Path,
        progress: Option<ProgressCallback>,
    ) -> Result<()> {
        let args = self.build_args(format, path);
        debug!("ffmpeg args: {:?}", args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StreamError::Download("failed to capture ffmpeg stderr".into()))?;

        let start_time = Instant::now();
        let mut last_error = None;

        // -stats writes progress lines terminated by '\r'
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        while reader.read_until(b'\r', &mut buf).await? > 0 {
            for line in String::from_utf8_lossy(&buf).lines() {
                let line = line.trim();
                if let Some(prog) = Self::parse_progress(line) {
                    if let Some(ref cb) = progress {
                        cb(DownloadProgress {
                            bytes_downloaded: prog.size_bytes.unwrap_or(0),
                            bytes_total: None,
                            media_seconds: Some(prog.time_seconds),
                            elapsed_seconds: start_time.elapsed().as_secs_f64(),
                        });
                    }
                } else if !line.is_empty() {
                    warn!("ffmpeg: {}", line);
                    last_error = Some(line.to_string());
                }
            }
            buf.clear();
        }

        let status = child.wait().await?;

        if !status.success() {
            return Err(StreamError::Download(match last_error {
                Some(line) => format!("ffmpeg exited with {status}: {line}"),
                None => format!("ffmpeg exited with {status}"),
            }));
        }

        info!("Saved {} to {:?} via ffmpeg", format.format_id, path);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FfmpegProgress {
    time_seconds: f64,
    size_bytes: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> FfmpegBackend {
        FfmpegBackend::new().with_ffmpeg_path("ffmpeg")
    }

    fn hls_format() -> FormatRecord {
        FormatRecord {
            format_id: "h264_720p-aac_128kbps-hls".into(),
            url: "https://example.com/master.m3u8".into(),
            ext: "mp4".into(),
            protocol: Protocol::M3u8,
            ..FormatRecord::default()
        }
    }

    #[test]
    fn test_parse_progress() {
        let line = "frame=  123 fps= 30 q=28.0 size=    1234kB time=00:01:23.45 bitrate=1234.5kbits/s speed=1.5x";
        let prog = FfmpegBackend::parse_progress(line).unwrap();

        assert!((prog.time_seconds - 83.45).abs() < 0.01);
        assert_eq!(prog.size_bytes, Some(1234 * 1024));
        assert!(FfmpegBackend::parse_progress("Input #0, hls, from 'x':").is_none());
    }

    #[test]
    fn test_build_args_basic() {
        let args = backend().build_args(&hls_format(), Path::new("/tmp/out.mp4"));

        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "https://example.com/master.m3u8");
        assert!(args.contains(&"copy".to_string()));
        assert!(args.contains(&"aac_adtstoasc".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/out.mp4");
        assert!(!args.contains(&"-headers".to_string()));
    }

    #[test]
    fn test_build_args_with_headers() {
        let mut format = hls_format();
        format
            .http_headers
            .insert("Referer".into(), "https://www.nicovideo.jp/watch/sm9".into());
        format
            .http_headers
            .insert("X-Radiko-AuthToken".into(), "tok".into());

        let args = backend().build_args(&format, Path::new("out.mp4"));

        let headers_idx = args.iter().position(|a| a == "-headers").unwrap();
        let headers_value = &args[headers_idx + 1];
        assert!(headers_value.contains("Referer: https://www.nicovideo.jp/watch/sm9"));
        assert!(headers_value.contains("X-Radiko-AuthToken: tok"));
        assert!(headers_value.ends_with("\r\n"));
    }

    #[test]
    fn test_input_params_precede_input() {
        let mut format = hls_format();
        format.input_params = vec!["-ss".into(), "780".into()];

        let args = backend().build_args(&format, Path::new("out.m4a"));

        let seek = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[seek + 1], "780");
        assert!(seek < input);
    }

    #[test]
    fn test_http_format_not_rewrapped() {
        let mut format = hls_format();
        format.protocol = Protocol::Http;
        let args = backend().build_args(&format, Path::new("out.mp4"));
        assert!(!args.contains(&"aac_adtstoasc".to_string()));
    }

    #[test]
    fn test_can_handle() {
        let backend = backend();
        assert!(backend.can_handle(&hls_format()));

        let mut live = hls_format();
        live.protocol = Protocol::NiconicoLive;
        assert!(!backend.can_handle(&live));
    }
}
