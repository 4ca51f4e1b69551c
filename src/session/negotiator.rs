//! Session creation for one stream candidate.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;

use super::manifest::{DeliveryManifest, StreamCandidate, Transport};
use super::quality::label_bitrate;
use super::{heartbeat_interval, SessionDescriptor};
use crate::error::{Result, StreamError};
use crate::hls::VariantProbe;
use crate::http_client::SessionTransport;
use crate::stream::format::{FormatRecord, Protocol};

pub const SITE_ORIGIN: &str = "https://www.nicovideo.jp";

const HLS_SEGMENT_DURATION_MS: u32 = 6000;

/// Turns stream candidates into playable formats by creating a session
/// for each one.
pub struct SessionNegotiator {
    transport: Arc<dyn SessionTransport>,
    probe: Arc<dyn VariantProbe>,
}

impl SessionNegotiator {
    pub fn new(transport: Arc<dyn SessionTransport>, probe: Arc<dyn VariantProbe>) -> Self {
        Self { transport, probe }
    }

    /// Create a session for `candidate` and describe the resulting format.
    ///
    /// Native HLS candidates are additionally probed for variant metadata;
    /// a failed probe downgrades the format to plain `m3u8` instead of
    /// failing.
    #[instrument(skip_all, fields(format_id = %candidate.format_id()))]
    pub async fn negotiate(
        &self,
        manifest: &DeliveryManifest,
        video_id: &str,
        candidate: &StreamCandidate,
    ) -> Result<FormatRecord> {
        let session_api = &manifest.movie.session;
        let endpoint = manifest.endpoint()?;
        let request = build_session_request(manifest, candidate)?;

        let response = self
            .transport
            .post_json(&create_url(&endpoint.url)?, &request)
            .await?;

        let data = response
            .get("data")
            .ok_or_else(|| StreamError::Parse("session response has no data".into()))?;
        let session_id = data
            .pointer("/session/id")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::Parse("session response has no id".into()))?;
        let content_uri = data
            .pointer("/session/content_uri")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::Parse("session response has no content URI".into()))?;
        debug!("Created session {session_id}");

        let descriptor = SessionDescriptor {
            session_id: session_id.to_string(),
            content_uri: content_uri.to_string(),
            protocol: candidate.transport.protocol(),
            heartbeat_url: format!(
                "{}/{}?_format=json&_method=PUT",
                endpoint.url, session_id
            ),
            heartbeat_payload: serde_json::to_string(data)?,
            heartbeat_interval: heartbeat_interval(session_api.heartbeat_lifetime)?,
        };

        let mut format = describe_format(candidate, video_id, descriptor);
        if candidate.transport == Transport::HlsNative {
            self.merge_variant(&mut format).await;
        }
        Ok(format)
    }

    async fn merge_variant(&self, format: &mut FormatRecord) {
        let headers: Vec<(String, String)> = format
            .http_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let pairs: Vec<(&str, &str)> = headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        let variant = match self.probe.probe(&format.url, &pairs).await {
            Ok(variants) => variants.into_iter().next(),
            Err(e) => {
                warn!("Failed to probe {}: {e}", format.format_id);
                None
            }
        };

        let Some(variant) = variant else {
            format.protocol = Protocol::M3u8;
            if let Some(session) = format.heartbeat.as_mut() {
                session.protocol = Protocol::M3u8;
            }
            return;
        };

        let (vcodec, acodec) = variant.split_codecs();
        format.url = variant.uri;
        if variant.bandwidth > 0 {
            #[allow(clippy::cast_precision_loss)]
            let tbr = variant.bandwidth as f64 / 1000.0;
            format.tbr = Some(tbr);
        }
        format.width = variant.width.or(format.width);
        format.height = variant.height.or(format.height);
        format.fps = variant.frame_rate.or(format.fps);
        format.vcodec = vcodec.or(format.vcodec.take());
        format.acodec = acodec.or(format.acodec.take());
    }
}

fn create_url(endpoint: &str) -> Result<String> {
    let mut url =
        Url::parse(endpoint).map_err(|e| StreamError::Parse(format!("{endpoint}: {e}")))?;
    url.query_pairs_mut().append_pair("_format", "json");
    Ok(url.to_string())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Session-creation body for `candidate`.
pub fn build_session_request(
    manifest: &DeliveryManifest,
    candidate: &StreamCandidate,
) -> Result<Value> {
    let session = &manifest.movie.session;
    let endpoint = manifest.endpoint()?;
    let use_ssl = yes_no(endpoint.is_ssl);
    let use_well_known_port = yes_no(endpoint.is_well_known_port);

    let parameters = match &candidate.transport {
        Transport::Http => json!({
            "http_output_download_parameters": {
                "use_ssl": use_ssl,
                "use_well_known_port": use_well_known_port,
            }
        }),
        Transport::Hls { encryption } => {
            let info = manifest.encryption.as_ref().ok_or_else(|| {
                StreamError::Parse("encrypted stream without encryption info".into())
            })?;
            let mut method = Map::new();
            method.insert(
                encryption.clone(),
                json!({
                    "encrypted_key": info.encrypted_key,
                    "key_uri": info.key_uri,
                }),
            );
            json!({
                "hls_parameters": {
                    "segment_duration": HLS_SEGMENT_DURATION_MS,
                    "transfer_preset": "",
                    "use_ssl": use_ssl,
                    "use_well_known_port": use_well_known_port,
                    "encryption": method,
                }
            })
        }
        Transport::HlsNative => json!({
            "hls_parameters": {
                "segment_duration": HLS_SEGMENT_DURATION_MS,
                "transfer_preset": "",
                "use_ssl": use_ssl,
                "use_well_known_port": use_well_known_port,
            }
        }),
    };

    let auth_type = session
        .protocols
        .first()
        .and_then(|p| session.auth_types.get(p))
        .ok_or_else(|| StreamError::Parse("no auth type for the first protocol".into()))?;

    Ok(json!({
        "session": {
            "client_info": {
                "player_id": session.player_id,
            },
            "content_auth": {
                "auth_type": auth_type,
                "content_key_timeout": session.content_key_timeout,
                "service_id": "nicovideo",
                "service_user_id": session.service_user_id,
            },
            "content_id": session.content_id,
            "content_src_id_sets": [{
                "content_src_ids": [{
                    "src_id_to_mux": {
                        "audio_src_ids": [candidate.audio.id],
                        "video_src_ids": [candidate.video.id],
                    }
                }]
            }],
            "content_type": "movie",
            "content_uri": "",
            "keep_method": {
                "heartbeat": {
                    "lifetime": session.heartbeat_lifetime,
                }
            },
            "priority": session.priority,
            "protocol": {
                "name": "http",
                "parameters": {
                    "http_parameters": {
                        "parameters": parameters,
                    }
                }
            },
            "recipe_id": session.recipe_id,
            "session_operation_auth": {
                "session_operation_auth_by_signature": {
                    "signature": session.signature,
                    "token": session.token,
                }
            },
            "timing_constraint": "unlimited",
        }
    }))
}

fn describe_format(
    candidate: &StreamCandidate,
    video_id: &str,
    session: SessionDescriptor,
) -> FormatRecord {
    let video = &candidate.video.metadata;
    let audio = &candidate.audio.metadata;

    #[allow(clippy::cast_precision_loss)]
    let video_bits = match video.bitrate {
        Some(bits) if bits > 0.0 => bits,
        _ => video.label.as_deref().map_or(0, label_bitrate) as f64,
    };
    let resolution = video.resolution.unwrap_or_default();

    let mut http_headers = BTreeMap::new();
    http_headers.insert("Origin".to_string(), SITE_ORIGIN.to_string());
    http_headers.insert(
        "Referer".to_string(),
        format!("{SITE_ORIGIN}/watch/{video_id}"),
    );

    FormatRecord {
        format_id: candidate.format_id(),
        url: session.content_uri.clone(),
        ext: "mp4".to_string(),
        protocol: session.protocol,
        format_note: Some(format!(
            "DMC {} {}",
            video.label.as_deref().unwrap_or(&candidate.video.id),
            candidate.transport.declared_name().to_uppercase()
        )),
        vcodec: Some("h264".to_string()),
        acodec: Some("aac".to_string()),
        abr: audio.bitrate.map(|bits| bits / 1000.0),
        vbr: Some(video_bits / 1000.0),
        width: resolution.width,
        height: resolution.height,
        quality: candidate.video.id.contains("low").then_some(-2),
        heartbeat: Some(session),
        http_headers,
        ..FormatRecord::default()
    }
}
