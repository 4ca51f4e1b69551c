//! Radiko time-shifted radio extractor

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{Result, StreamError};
use crate::hls::{HlsVariant, VariantProbe};
use crate::http_client::HttpClient;
use crate::radio::auth::authorize;
use crate::radio::{
    locate, parse_schedule, parse_stream_endpoints, parse_timestamp, playlist_requests,
    schedule_url, stream_list_url, time_to_skip, AuthCache, PlaylistRequest, RadioAuth,
};
use crate::stream::format::{sort_formats, FormatRecord, Protocol};
use crate::stream::provider::{MediaExtractor, MediaInfo};

static VALID_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www.)?radiko\.jp/#!/ts/(?P<station>[A-Z]+)/(?P<id>\d+)")
        .expect("valid regex")
});

/// Playlist hosts that tend to serve a different station.
static FOREIGN_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[cf]-radiko\.smartstream\.ne\.jp$").expect("valid regex"));

/// Schedule times are Japan Standard Time.
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Station and `YYYYMMDDhhmmss` timestamp of a time-shift URL.
pub fn station_and_time(url: &str) -> Option<(String, String)> {
    let caps = VALID_URL.captures(url)?;
    Some((caps["station"].to_string(), caps["id"].to_string()))
}

fn jst_timestamp(t: NaiveDateTime) -> Option<i64> {
    let jst = FixedOffset::east_opt(JST_OFFSET_SECS)?;
    t.and_local_timezone(jst).single().map(|d| d.timestamp())
}

fn auth_headers(auth: &RadioAuth) -> [(&str, &str); 2] {
    [
        ("X-Radiko-AreaId", auth.area_id.as_str()),
        ("X-Radiko-AuthToken", auth.token.as_str()),
    ]
}

/// Formats for the variants of one playlist request.
pub fn radio_formats(
    request: &PlaylistRequest,
    variants: &[HlsVariant],
    auth: &RadioAuth,
    skip_seconds: i64,
) -> Vec<FormatRecord> {
    variants
        .iter()
        .map(|variant| {
            let format_id = Url::parse(&variant.uri)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_else(|| variant.uri.clone());
            let preference = FOREIGN_HOST.is_match(&format_id).then_some(-100);
            let input_params = if request.timefree && skip_seconds > 0 {
                vec!["-ss".to_string(), skip_seconds.to_string()]
            } else {
                Vec::new()
            };
            let (_, acodec) = variant.split_codecs();

            FormatRecord {
                format_id,
                url: variant.uri.clone(),
                ext: "mp4".into(),
                protocol: Protocol::M3u8,
                acodec,
                tbr: (variant.bandwidth > 0).then(|| variant.bandwidth as f64 / 1000.0),
                preference,
                http_headers: auth_headers(auth)
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                input_params,
                ..FormatRecord::default()
            }
        })
        .collect()
}

/// Extractor for `radiko.jp/#!/ts/<STATION>/<YYYYMMDDhhmmss>` URLs.
pub struct RadikoExtractor {
    client: Arc<HttpClient>,
    probe: Arc<dyn VariantProbe>,
    cache: Arc<AuthCache>,
}

impl RadikoExtractor {
    pub fn new(client: Arc<HttpClient>, cache: Arc<AuthCache>) -> Self {
        let probe: Arc<dyn VariantProbe> = client.clone();
        Self::with_probe(client, probe, cache)
    }

    pub fn with_probe(
        client: Arc<HttpClient>,
        probe: Arc<dyn VariantProbe>,
        cache: Arc<AuthCache>,
    ) -> Self {
        Self {
            client,
            probe,
            cache,
        }
    }

    /// Probe every playlist; unreachable ones are skipped.
    pub async fn collect_formats(
        &self,
        requests: &[PlaylistRequest],
        auth: &RadioAuth,
        skip_seconds: i64,
    ) -> Result<Vec<FormatRecord>> {
        let headers = auth_headers(auth);
        let mut formats = Vec::new();
        for request in requests {
            match self.probe.probe(&request.url, &headers).await {
                Ok(variants) => {
                    formats.extend(radio_formats(request, &variants, auth, skip_seconds));
                }
                Err(e) => debug!("Skipping playlist {}: {e}", request.url),
            }
        }

        if formats.is_empty() {
            // The token may have expired or been issued for another area
            self.cache.clear();
            return Err(StreamError::NotFound("no playable radio playlists".into()));
        }
        sort_formats(&mut formats);
        Ok(formats)
    }
}

#[async_trait]
impl MediaExtractor for RadikoExtractor {
    fn name(&self) -> &'static str {
        "radiko"
    }

    fn matches(&self, url: &str) -> bool {
        VALID_URL.is_match(url)
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<MediaInfo> {
        let (station, id) = station_and_time(url)
            .ok_or_else(|| StreamError::NotFound(format!("not a radiko time-shift URL: {url}")))?;
        let target = parse_timestamp(&id)?;

        let auth = authorize(&self.cache, &self.client).await?;

        info!("Downloading radio program for {station} station");
        let schedule = self.client.get_text(&schedule_url(&station), &[]).await?;
        let windows = parse_schedule(&schedule)?;
        let window = locate(&windows, target)?;

        let stream_list = self.client.get_text(&stream_list_url(&station), &[]).await?;
        let endpoints = parse_stream_endpoints(&stream_list)?;
        let requests = playlist_requests(&endpoints, &station, window, &id)?;
        if requests.is_empty() {
            warn!("{station} lists no playlist endpoints");
        }

        let skip = time_to_skip(window, target);
        let formats = self.collect_formats(&requests, &auth, skip).await?;

        Ok(MediaInfo {
            id,
            title: window.title.clone(),
            description: window.description.clone(),
            program_description: window.info.clone(),
            timestamp: jst_timestamp(window.start),
            duration: u64::try_from((window.end - window.start).num_seconds()).ok(),
            webpage_url: url.to_string(),
            is_live: true,
            formats,
            ..MediaInfo::default()
        })
    }
}
