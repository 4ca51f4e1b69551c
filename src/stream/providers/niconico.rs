//! Niconico video extractor
//!
//! The watch page embeds the whole player state as JSON in a
//! `data-api-data` attribute. Its delivery manifest is negotiated into one
//! DMC session per (audio, video, transport) candidate.

use std::sync::Arc;

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, StreamError};
use crate::http_client::HttpClient;
use crate::session::negotiator::SITE_ORIGIN;
use crate::session::{negotiate_formats, DeliveryManifest, RetryPolicy, SessionNegotiator};
use crate::stream::provider::{MediaExtractor, MediaInfo};

static VALID_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://(?:(?:www\.|secure\.|sp\.)?nicovideo\.jp/watch|nico\.ms)/|nico(?:nico|video)?:)(?P<id>(?P<alphabet>[a-z]{2})?[0-9]+)",
    )
    .expect("valid regex")
});

static API_DATA: Lazy<Selector> =
    Lazy::new(|| Selector::parse("[data-api-data]").expect("valid selector"));
static ERROR_SECTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("section.ErrorMessage, section.WatchExceptionPage-message")
        .expect("valid selector")
});
static OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).expect("valid selector"));
static OG_IMAGE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:image"]"#).expect("valid selector"));

const TRACKING_URL: &str = "https://nvapi.nicovideo.jp/v1/2ab0cbaa/watch";

/// Headers the `nvapi` endpoints expect from the web frontend.
pub(crate) const API_HEADERS: [(&str, &str); 3] = [
    ("X-Frontend-ID", "6"),
    ("X-Frontend-Version", "0"),
    ("X-Niconico-Language", "en-us"),
];

/// Video id of a watch URL, or `None` for live ids and other sites.
pub fn video_id(url: &str) -> Option<String> {
    let caps = VALID_URL.captures(url)?;
    if caps.name("alphabet").is_some_and(|a| a.as_str() == "lv") {
        return None;
    }
    Some(caps["id"].to_string())
}

/// JSON of the `data-api-data` attribute.
pub fn extract_api_data(html: &str) -> Result<Value> {
    let document = Html::parse_document(html);
    let raw = document
        .select(&API_DATA)
        .next()
        .and_then(|el| el.value().attr("data-api-data"))
        .ok_or_else(|| StreamError::Parse("watch page without data-api-data".into()))?;
    Ok(serde_json::from_str(raw)?)
}

/// Human-readable reason from a watch error page.
pub fn watch_error_message(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let section = document.select(&ERROR_SECTION).next()?;
    let text = section
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn meta_content(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
}

pub(crate) fn str_at(data: &Value, pointer: &str) -> Option<String> {
    data.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Numbers and numeric strings (the API is not consistent about ids).
pub(crate) fn id_at(data: &Value, pointer: &str) -> Option<String> {
    match data.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Metadata of a watch page. Formats are filled in separately.
pub fn media_metadata(api_data: &Value, html: &str, video_id: &str, url: &str) -> MediaInfo {
    let document = Html::parse_document(html);
    let video = api_data.get("video").unwrap_or(&Value::Null);

    let title = str_at(video, "/originalTitle")
        .or_else(|| str_at(video, "/title"))
        .or_else(|| meta_content(&document, &OG_TITLE))
        .unwrap_or_else(|| video_id.to_string());

    let thumbnail = meta_content(&document, &OG_IMAGE)
        .or_else(|| str_at(video, "/thumbnail/largeUrl"))
        .or_else(|| str_at(video, "/thumbnail/url"));

    let timestamp = str_at(video, "/registeredAt")
        .and_then(|date| DateTime::parse_from_rfc3339(&date).ok())
        .map(|date| date.timestamp());

    let tags = api_data
        .pointer("/tag/items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    MediaInfo {
        id: video_id.to_string(),
        title,
        description: str_at(video, "/description"),
        thumbnail,
        uploader: str_at(api_data, "/owner/nickname").or_else(|| str_at(api_data, "/channel/name")),
        uploader_id: id_at(api_data, "/owner/id").or_else(|| id_at(api_data, "/channel/id")),
        timestamp,
        duration: video.get("duration").and_then(Value::as_u64),
        view_count: video.pointer("/count/view").and_then(Value::as_u64),
        comment_count: video.pointer("/count/comment").and_then(Value::as_u64),
        tags,
        genre: str_at(api_data, "/genre/label"),
        webpage_url: url.to_string(),
        ..MediaInfo::default()
    }
}

/// Extractor for `nicovideo.jp/watch/<id>`, `nico.ms/<id>` and
/// `nico:<id>` URLs.
pub struct NiconicoExtractor {
    client: Arc<HttpClient>,
    negotiator: SessionNegotiator,
    retry: RetryPolicy,
}

impl NiconicoExtractor {
    pub fn new(client: Arc<HttpClient>, retries: u32) -> Self {
        let negotiator = SessionNegotiator::new(client.clone(), client.clone());
        Self::with_negotiator(client, negotiator, RetryPolicy::new(retries))
    }

    pub fn with_negotiator(
        client: Arc<HttpClient>,
        negotiator: SessionNegotiator,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            client,
            negotiator,
            retry,
        }
    }

    /// Fetch the watch page; error pages surface their message.
    async fn watch_page(&self, video_id: &str) -> Result<(String, String)> {
        let url = format!("{SITE_ORIGIN}/watch/{video_id}");
        let resp = self.client.send_get(&url, &[]).await?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        let body = resp.text().await?;

        if !status.is_success() {
            if let Some(message) = watch_error_message(&body) {
                return Err(StreamError::NotFound(message));
            }
            return Err(StreamError::Http {
                status: status.as_u16(),
                url: final_url,
            });
        }
        Ok((body, final_url))
    }

    /// Negotiate formats and collect metadata from an already fetched page.
    pub async fn media_from_page(
        &self,
        api_data: &Value,
        html: &str,
        video_id: &str,
        url: &str,
    ) -> Result<MediaInfo> {
        let manifest = DeliveryManifest::from_api_data(api_data)?;
        let formats = negotiate_formats(&self.negotiator, &self.retry, &manifest, video_id).await?;
        if formats.is_empty() {
            return Err(StreamError::NotFound(format!(
                "no available formats for {video_id}"
            )));
        }

        let mut info = media_metadata(api_data, html, video_id, url);
        info.formats = formats;

        if let Some(tracking_id) = manifest.tracking_id.as_deref() {
            self.acquire_permission(tracking_id, video_id).await;
        }
        Ok(info)
    }

    /// Ask for watch permission. The download may still work without it.
    #[instrument(skip(self))]
    async fn acquire_permission(&self, tracking_id: &str, video_id: &str) {
        let url = format!("{TRACKING_URL}?t={}", urlencoding::encode(tracking_id));
        let referer = format!("{SITE_ORIGIN}/watch/{video_id}");
        let mut headers = API_HEADERS.to_vec();
        headers.extend([("Referer", referer.as_str()), ("Origin", SITE_ORIGIN)]);

        let status = match self.client.send_get(&url, &headers).await {
            Ok(resp) => resp
                .json::<Value>()
                .await
                .ok()
                .and_then(|v| v.pointer("/meta/status").and_then(Value::as_u64)),
            Err(e) => {
                debug!("Permission request failed: {e}");
                None
            }
        };
        if status != Some(200) {
            warn!("Failed to acquire permission for playing video. The video may not download.");
        }
    }
}

#[async_trait::async_trait]
impl MediaExtractor for NiconicoExtractor {
    fn name(&self) -> &'static str {
        "niconico"
    }

    fn matches(&self, url: &str) -> bool {
        video_id(url).is_some()
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<MediaInfo> {
        let mut id = video_id(url)
            .ok_or_else(|| StreamError::NotFound(format!("not a niconico video URL: {url}")))?;

        let (html, final_url) = self.watch_page(&id).await?;
        // Channel videos redirect to their canonical id
        if id.starts_with("so") {
            if let Some(canonical) = video_id(&final_url) {
                id = canonical;
            }
        }

        let api_data = extract_api_data(&html)?;
        info!("Extracting {id}");
        self.media_from_page(&api_data, &html, &id, url).await
    }
}
