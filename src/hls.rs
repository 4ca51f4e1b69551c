//! HLS master playlist probing
//!
//! Fetches a playlist and reports the technical metadata of each variant
//! (bandwidth, resolution, codecs) without downloading any media. Used to
//! enrich negotiated native-HLS formats and to expand radio playlists into
//! formats.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::Result;
use crate::http_client::HttpClient;

/// One entry of a master playlist (or the playlist itself when it is
/// already a media playlist).
#[derive(Debug, Clone, PartialEq)]
pub struct HlsVariant {
    pub uri: String,
    /// Bits per second, 0 when not declared.
    pub bandwidth: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codecs: Option<String>,
    pub frame_rate: Option<f64>,
}

impl HlsVariant {
    fn bare(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            bandwidth: 0,
            width: None,
            height: None,
            codecs: None,
            frame_rate: None,
        }
    }

    /// Split the `CODECS` attribute into (video, audio) codec strings.
    pub fn split_codecs(&self) -> (Option<String>, Option<String>) {
        let Some(codecs) = &self.codecs else {
            return (None, None);
        };
        let mut video = None;
        let mut audio = None;
        for codec in codecs.split(',').map(str::trim) {
            let family = codec.split('.').next().unwrap_or(codec);
            match family {
                "avc1" | "avc3" | "hvc1" | "hev1" | "vp09" | "vp8" | "vp9" | "av01" => {
                    video.get_or_insert_with(|| codec.to_string());
                }
                "mp4a" | "opus" | "ac-3" | "ec-3" | "flac" | "mp3" => {
                    audio.get_or_insert_with(|| codec.to_string());
                }
                _ => {}
            }
        }
        (video, audio)
    }
}

/// Fetches HLS playlists and returns their variants.
#[async_trait]
pub trait VariantProbe: Send + Sync {
    async fn probe(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<HlsVariant>>;
}

#[async_trait]
impl VariantProbe for HttpClient {
    async fn probe(&self, url: &str, headers: &[(&str, &str)]) -> Result<Vec<HlsVariant>> {
        let content = self.get_text(url, headers).await?;
        let variants = parse_variants(&content, url);
        debug!("Found {} variants in {}", variants.len(), url);
        Ok(variants)
    }
}

/// Parse a playlist body fetched from `playlist_url`.
///
/// A media playlist (no `#EXT-X-STREAM-INF`) yields a single bare variant
/// pointing at the playlist itself.
pub fn parse_variants(content: &str, playlist_url: &str) -> Vec<HlsVariant> {
    if !content.contains("#EXT-X-STREAM-INF:") {
        return vec![HlsVariant::bare(playlist_url)];
    }

    let mut variants = Vec::new();
    let mut pending: Option<HashMap<String, String>> = None;

    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") {
            pending = Some(parse_attributes(rest));
            continue;
        }
        // Comments and other tags may sit between a variant and its URI
        if line.starts_with('#') {
            continue;
        }
        let Some(attrs) = pending.take() else {
            continue;
        };

        let (width, height) = attrs
            .get("RESOLUTION")
            .and_then(|r| r.split_once('x'))
            .map_or((None, None), |(w, h)| (w.parse().ok(), h.parse().ok()));

        variants.push(HlsVariant {
            uri: resolve_url(playlist_url, line),
            bandwidth: attrs
                .get("BANDWIDTH")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            width,
            height,
            codecs: attrs.get("CODECS").cloned(),
            frame_rate: attrs.get("FRAME-RATE").and_then(|v| v.parse().ok()),
        });
    }

    variants
}

fn parse_attributes(attr_str: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut chars = attr_str.chars().peekable();

    while chars.peek().is_some() {
        let key: String = chars.by_ref().take_while(|&c| c != '=').collect();
        if key.is_empty() {
            break;
        }

        // Quoted values may contain commas
        let value = if chars.peek() == Some(&'"') {
            chars.next();
            let v: String = chars.by_ref().take_while(|&c| c != '"').collect();
            chars.next();
            v
        } else {
            chars.by_ref().take_while(|&c| c != ',').collect()
        };

        attrs.insert(key.trim().to_string(), value.trim().to_string());
    }

    attrs
}

fn resolve_url(base: &str, relative: &str) -> String {
    Url::parse(base)
        .and_then(|b| b.join(relative))
        .map_or_else(|_| relative.to_string(), |u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "#EXTM3U
#EXT-X-VERSION:6
#EXT-X-INDEPENDENT-SEGMENTS
#EXT-X-STREAM-INF:BANDWIDTH=1200000,AVERAGE-BANDWIDTH=1100000,CODECS=\"avc1.4d401f,mp4a.40.2\",RESOLUTION=1280x720,FRAME-RATE=29.970
1/ts/playlist.m3u8?ht2_nicovideo=abc
#EXT-X-STREAM-INF:BANDWIDTH=400000,CODECS=\"mp4a.40.2\"
/audio/playlist.m3u8
";

    #[test]
    fn test_parse_master_playlist() {
        let variants = parse_variants(MASTER, "https://delivery.example/hls/master.m3u8?t=1");
        assert_eq!(variants.len(), 2);

        let video = &variants[0];
        assert_eq!(video.bandwidth, 1_200_000);
        assert_eq!(video.width, Some(1280));
        assert_eq!(video.height, Some(720));
        assert_eq!(video.codecs.as_deref(), Some("avc1.4d401f,mp4a.40.2"));
        assert_eq!(video.frame_rate, Some(29.97));
        assert_eq!(
            video.uri,
            "https://delivery.example/hls/1/ts/playlist.m3u8?ht2_nicovideo=abc"
        );

        assert_eq!(variants[1].uri, "https://delivery.example/audio/playlist.m3u8");
        assert_eq!(variants[1].height, None);
    }

    #[test]
    fn test_comment_between_variant_and_uri() {
        let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000,RESOLUTION=640x360
# served from the edge cache
low/index.m3u8
## stray comment
high/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2400000,RESOLUTION=1280x720
#EXT-X-SESSION-DATA:DATA-ID=\"com.example.title\",VALUE=\"x\"
hd/index.m3u8
";
        let variants = parse_variants(master, "https://cdn.example/master.m3u8");
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].uri, "https://cdn.example/low/index.m3u8");
        assert_eq!(variants[0].height, Some(360));
        assert_eq!(variants[1].uri, "https://cdn.example/hd/index.m3u8");
        assert_eq!(variants[1].bandwidth, 2_400_000);
    }

    #[test]
    fn test_media_playlist_is_single_variant() {
        let media = "#EXTM3U\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nseg0.ts\n";
        let variants = parse_variants(media, "https://cdn.example/live.m3u8");
        assert_eq!(variants, vec![HlsVariant::bare("https://cdn.example/live.m3u8")]);
    }

    #[test]
    fn test_parse_attributes() {
        let attrs = parse_attributes("BANDWIDTH=1280000,RESOLUTION=720x480");
        assert_eq!(attrs.get("BANDWIDTH"), Some(&"1280000".to_string()));
        assert_eq!(attrs.get("RESOLUTION"), Some(&"720x480".to_string()));

        let attrs2 = parse_attributes("CODECS=\"avc1.4d401f,mp4a.40.2\",BANDWIDTH=2000000");
        assert_eq!(
            attrs2.get("CODECS"),
            Some(&"avc1.4d401f,mp4a.40.2".to_string())
        );
        assert_eq!(attrs2.get("BANDWIDTH"), Some(&"2000000".to_string()));
    }

    #[test]
    fn test_split_codecs() {
        let mut variant = HlsVariant::bare("https://cdn.example/a.m3u8");
        assert_eq!(variant.split_codecs(), (None, None));

        variant.codecs = Some("avc1.4d401f,mp4a.40.2".into());
        assert_eq!(
            variant.split_codecs(),
            (Some("avc1.4d401f".into()), Some("mp4a.40.2".into()))
        );

        variant.codecs = Some("mp4a.40.5".into());
        assert_eq!(variant.split_codecs(), (None, Some("mp4a.40.5".into())));
    }
}
