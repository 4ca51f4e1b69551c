//! Media extractor trait and common types.
//!
//! A [`MediaExtractor`] knows how to turn a page URL of one platform into
//! normalized [`MediaInfo`]: metadata plus every downloadable
//! [`FormatRecord`], sorted so the preferred one is last.

use async_trait::async_trait;
use serde::Serialize;

use super::format::FormatRecord;
use crate::error::Result;

/// Metadata and formats for a single media item.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MediaInfo {
    /// Platform-specific id (`sm9`, `lv1234`, `20210425101300`).
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Longer program notes, for radio programs that carry them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_id: Option<String>,
    /// Unix timestamp of publication or broadcast start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Duration in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    pub webpage_url: String,
    pub is_live: bool,
    /// Worst first, preferred last.
    pub formats: Vec<FormatRecord>,
    /// Listed videos, for playlists. A playlist has no formats of its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<PlaylistEntry>>,
}

/// A video listed by a playlist. It is resolved by its own extractor when
/// downloaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploader_id: Option<String>,
}

impl MediaInfo {
    /// The preferred format.
    pub fn best_format(&self) -> Option<&FormatRecord> {
        self.formats.last()
    }

    pub fn format(&self, format_id: &str) -> Option<&FormatRecord> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }

    pub fn is_playlist(&self) -> bool {
        self.entries.is_some()
    }
}

/// Trait for platform extractors.
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Short lowercase extractor name (e.g., `"niconico"`, `"radiko"`).
    fn name(&self) -> &'static str;

    /// Returns `true` if this extractor can handle the given URL.
    fn matches(&self, url: &str) -> bool;

    /// Fetch metadata and formats for the media at `url`.
    async fn extract(&self, url: &str) -> Result<MediaInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_lookup() {
        let info = MediaInfo {
            id: "sm9".into(),
            formats: vec![
                FormatRecord {
                    format_id: "low".into(),
                    ..FormatRecord::default()
                },
                FormatRecord {
                    format_id: "high".into(),
                    ..FormatRecord::default()
                },
            ],
            ..MediaInfo::default()
        };
        assert_eq!(info.best_format().unwrap().format_id, "high");
        assert_eq!(info.format("low").unwrap().format_id, "low");
        assert!(info.format("mid").is_none());
        assert!(MediaInfo::default().best_format().is_none());
        assert!(!info.is_playlist());
    }

    #[test]
    fn test_playlist_serialization() {
        let playlist = MediaInfo {
            id: "27411728".into(),
            title: "Radio archive".into(),
            entries: Some(vec![PlaylistEntry {
                id: "sm9".into(),
                url: "https://www.nicovideo.jp/watch/sm9".into(),
                duration: Some(320),
                ..PlaylistEntry::default()
            }]),
            ..MediaInfo::default()
        };
        assert!(playlist.is_playlist());

        let json = serde_json::to_value(&playlist).unwrap();
        assert_eq!(json["entries"][0]["id"], "sm9");
        assert_eq!(json["entries"][0]["duration"], 320);
        assert!(json["entries"][0].get("title").is_none());
        assert!(serde_json::to_value(MediaInfo::default())
            .unwrap()
            .get("entries")
            .is_none());
    }
}
