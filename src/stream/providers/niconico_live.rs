//! Niconico live extractor

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{Result, StreamError};
use crate::http_client::HttpClient;
use crate::live::{LIVE_ORIGIN, LIVE_QUALITIES};
use crate::stream::format::{FormatRecord, LiveParams, Protocol};
use crate::stream::provider::{MediaExtractor, MediaInfo};

static VALID_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:https?://(?:sp\.)?live2?\.nicovideo\.jp/(?:watch|gate)/|nico(?:nico|video)?:)(?P<id>lv\d+)",
    )
    .expect("valid regex")
});

static EMBEDDED_DATA: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#embedded-data").expect("valid selector"));
static TITLE_META: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"meta[property="og:title"], meta[name="twitter:title"]"#)
        .expect("valid selector")
});

pub fn live_id(url: &str) -> Option<String> {
    VALID_URL.captures(url).map(|caps| caps["id"].to_string())
}

/// Control-channel URL and title from a live watch page.
pub fn parse_watch_page(html: &str) -> Result<(String, Option<String>)> {
    let document = Html::parse_document(html);
    let props = document
        .select(&EMBEDDED_DATA)
        .next()
        .and_then(|el| el.value().attr("data-props"))
        .ok_or_else(|| StreamError::Parse("live page without embedded data".into()))?;
    let data: Value = serde_json::from_str(props)?;

    let ws_url = data
        .pointer("/site/relive/webSocketUrl")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if ws_url.is_empty() {
        return Err(StreamError::NotFound(
            "the live hasn't started yet or already ended".into(),
        ));
    }

    let title = data
        .pointer("/program/title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            document
                .select(&TITLE_META)
                .next()
                .and_then(|el| el.value().attr("content"))
                .map(str::to_string)
        });

    Ok((ws_url.to_string(), title))
}

/// One format per known quality. Qualities are listed worst first, so the
/// index doubles as the ranking.
pub fn live_formats(ws_url: &str, cookies: Option<String>) -> Vec<FormatRecord> {
    LIVE_QUALITIES
        .iter()
        .zip(0..)
        .map(|(quality, rank)| FormatRecord {
            format_id: (*quality).to_string(),
            url: ws_url.to_string(),
            ext: "mp4".into(),
            protocol: Protocol::NiconicoLive,
            quality: Some(rank),
            live: Some(LiveParams {
                quality: (*quality).to_string(),
                cookies: cookies.clone(),
            }),
            ..FormatRecord::default()
        })
        .collect()
}

/// Extractor for `live.nicovideo.jp/watch/lv<id>` and `nico:lv<id>`.
pub struct NiconicoLiveExtractor {
    client: Arc<HttpClient>,
}

impl NiconicoLiveExtractor {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaExtractor for NiconicoLiveExtractor {
    fn name(&self) -> &'static str {
        "niconico:live"
    }

    fn matches(&self, url: &str) -> bool {
        VALID_URL.is_match(url)
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<MediaInfo> {
        let id = live_id(url)
            .ok_or_else(|| StreamError::NotFound(format!("not a niconico live URL: {url}")))?;
        let page_url = format!("{LIVE_ORIGIN}/watch/{id}");
        let html = self.client.get_text(&page_url, &[]).await?;

        let (ws_url, title) = parse_watch_page(&html)?;
        info!("Live {id} control channel found");

        let cookies = self.client.cookie_header(&format!("{LIVE_ORIGIN}/"));
        Ok(MediaInfo {
            title: title.unwrap_or_else(|| id.clone()),
            id,
            webpage_url: page_url,
            is_live: true,
            formats: live_formats(&ws_url, cookies),
            ..MediaInfo::default()
        })
    }
}
