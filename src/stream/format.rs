//! Uniform downloadable-format representation.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::session::SessionDescriptor;

/// Delivery protocol of a format; drives downloader selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// Progressive download over plain HTTP(S).
    #[default]
    Http,
    /// Segmented HLS that needs an external demuxer (e.g. encrypted).
    M3u8,
    /// HLS whose segments can be fetched and concatenated natively.
    M3u8Native,
    /// A live stream whose playlist URL is announced over a control channel.
    NiconicoLive,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::M3u8 => "m3u8",
            Self::M3u8Native => "m3u8_native",
            Self::NiconicoLive => "niconico_live",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra fields carried only by live-relay formats.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveParams {
    /// Quality requested in `startWatching`.
    pub quality: String,
    /// `Cookie` header for the control-channel handshake.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
}

/// One downloadable rendition of a media item.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct FormatRecord {
    pub format_id: String,
    pub url: String,
    pub ext: String,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcodec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acodec: Option<String>,
    /// Audio bitrate in kbit/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abr: Option<f64>,
    /// Video bitrate in kbit/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vbr: Option<f64>,
    /// Total bitrate in kbit/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tbr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Ranking hint within one platform's formats; higher is better.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<i32>,
    /// Ranking hint across sources; higher is better.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preference: Option<i32>,
    /// Negotiated session that must be kept alive while downloading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<SessionDescriptor>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub http_headers: BTreeMap<String, String>,
    /// Arguments placed before the input when handing the URL to ffmpeg.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub input_params: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<LiveParams>,
}

impl FormatRecord {
    /// Headers as borrowed pairs, the shape the HTTP helpers take.
    pub fn header_pairs(&self) -> Vec<(&str, &str)> {
        self.http_headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    fn total_bitrate(&self) -> f64 {
        self.tbr
            .unwrap_or_else(|| self.vbr.unwrap_or(0.0) + self.abr.unwrap_or(0.0))
    }
}

/// Order formats worst-first so the preferred rendition is last.
pub fn sort_formats(formats: &mut [FormatRecord]) {
    formats.sort_by(compare_formats);
}

fn compare_formats(a: &FormatRecord, b: &FormatRecord) -> Ordering {
    a.preference
        .unwrap_or(0)
        .cmp(&b.preference.unwrap_or(0))
        .then(a.quality.unwrap_or(0).cmp(&b.quality.unwrap_or(0)))
        .then(a.total_bitrate().total_cmp(&b.total_bitrate()))
        .then(a.height.unwrap_or(0).cmp(&b.height.unwrap_or(0)))
        .then_with(|| a.format_id.cmp(&b.format_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(id: &str) -> FormatRecord {
        FormatRecord {
            format_id: id.to_string(),
            url: format!("https://cdn.example/{id}"),
            ext: "mp4".into(),
            ..FormatRecord::default()
        }
    }

    #[test]
    fn test_protocol_names() {
        assert_eq!(Protocol::M3u8Native.to_string(), "m3u8_native");
        assert_eq!(
            serde_json::to_value(Protocol::NiconicoLive).unwrap(),
            serde_json::json!("niconico_live")
        );
    }

    #[test]
    fn test_sort_best_last() {
        let mut low = format("360p-64kbps-http");
        low.height = Some(360);
        low.vbr = Some(600.0);
        low.quality = Some(-2);

        let mut high = format("720p-192kbps-http");
        high.height = Some(720);
        high.vbr = Some(2000.0);

        let mut mid = format("480p-128kbps-http");
        mid.height = Some(480);
        mid.vbr = Some(900.0);

        let mut formats = vec![high, low, mid];
        sort_formats(&mut formats);
        let ids: Vec<_> = formats.iter().map(|f| f.format_id.as_str()).collect();
        assert_eq!(
            ids,
            ["360p-64kbps-http", "480p-128kbps-http", "720p-192kbps-http"]
        );
    }

    #[test]
    fn test_preference_dominates() {
        let mut other_station = format("c-radiko.smartstream.ne.jp");
        other_station.preference = Some(-100);
        other_station.tbr = Some(999.0);
        let plain = format("radiko.jp");

        let mut formats = vec![plain, other_station];
        sort_formats(&mut formats);
        assert_eq!(formats[0].format_id, "c-radiko.smartstream.ne.jp");
    }

    #[test]
    fn test_serialize_skips_empty_fields() {
        let value = serde_json::to_value(format("a")).unwrap();
        assert_eq!(value["protocol"], "http");
        assert!(value.get("heartbeat").is_none());
        assert!(value.get("http_headers").is_none());
    }
}
