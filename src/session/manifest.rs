//! Delivery manifest embedded in the watch page, and the candidates derived
//! from it.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StreamError};
use crate::stream::format::Protocol;

/// `media.delivery` of the watch page's API payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryManifest {
    pub movie: MovieDelivery,
    #[serde(default)]
    pub encryption: Option<EncryptionInfo>,
    #[serde(default)]
    pub tracking_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieDelivery {
    pub audios: Vec<QualityDescriptor>,
    pub videos: Vec<QualityDescriptor>,
    pub session: SessionApi,
}

/// One audio or video rendition offered by the manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityDescriptor {
    pub id: String,
    pub is_available: bool,
    #[serde(default)]
    pub metadata: QualityMetadata,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct QualityMetadata {
    /// Bits per second; sometimes reported as 0.
    #[serde(default)]
    pub bitrate: Option<f64>,
    /// Human-readable label such as `"480p | 0.9M"`.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct Resolution {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Parameters for the session-creation API. Values the API only echoes
/// back are kept as raw JSON.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionApi {
    pub recipe_id: String,
    pub player_id: String,
    pub protocols: Vec<String>,
    pub auth_types: HashMap<String, String>,
    pub service_user_id: Value,
    /// JSON document serialized as a string.
    pub token: String,
    pub signature: String,
    pub content_id: String,
    pub heartbeat_lifetime: u64,
    pub content_key_timeout: Value,
    pub priority: Value,
    pub urls: Vec<SessionUrl>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUrl {
    pub url: String,
    pub is_well_known_port: bool,
    pub is_ssl: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionInfo {
    pub encrypted_key: String,
    pub key_uri: String,
}

impl DeliveryManifest {
    /// Pull `media.delivery` out of the watch page's API payload.
    pub fn from_api_data(api_data: &Value) -> Result<Self> {
        let delivery = api_data
            .pointer("/media/delivery")
            .filter(|v| !v.is_null())
            .ok_or_else(|| StreamError::NotFound("no delivery manifest in API data".into()))?;
        Ok(serde_json::from_value(delivery.clone())?)
    }

    /// First negotiation endpoint; every session call goes there.
    pub fn endpoint(&self) -> Result<&SessionUrl> {
        self.movie
            .session
            .urls
            .first()
            .ok_or_else(|| StreamError::Parse("manifest declares no session URL".into()))
    }
}

impl SessionApi {
    /// Encryption method named by the session token, if the stream is
    /// encrypted.
    pub fn hls_encryption(&self) -> Result<Option<String>> {
        let token: Value = serde_json::from_str(&self.token)
            .map_err(|e| StreamError::Parse(format!("session token: {e}")))?;
        Ok(token.get("hls_encryption").map(|v| match v.as_str() {
            Some(s) => s.to_string(),
            None => v.to_string(),
        }))
    }
}

/// How a candidate is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Http,
    /// Encrypted HLS; carries the method name from the session token.
    Hls { encryption: String },
    HlsNative,
}

impl Transport {
    /// Name as declared in the manifest's protocol list.
    pub fn declared_name(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Hls { .. } | Self::HlsNative => "hls",
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http => Protocol::Http,
            Self::Hls { .. } => Protocol::M3u8,
            Self::HlsNative => Protocol::M3u8Native,
        }
    }
}

/// An (audio, video, transport) triple eligible for negotiation.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCandidate {
    pub audio: QualityDescriptor,
    pub video: QualityDescriptor,
    pub transport: Transport,
}

impl StreamCandidate {
    /// `<video>-<audio>-<transport>` with `archive_` prefixes stripped.
    pub fn format_id(&self) -> String {
        let strip = |id: &str| id.strip_prefix("archive_").unwrap_or(id).to_string();
        format!(
            "{}-{}-{}",
            strip(&self.video.id),
            strip(&self.audio.id),
            self.transport.declared_name()
        )
    }
}

/// Every available (audio, video, protocol) combination, audio-major.
///
/// Pairs where either side is unavailable are dropped here, so they never
/// reach the negotiator. Protocols other than `http`/`hls` are skipped.
pub fn resolve_candidates(manifest: &DeliveryManifest) -> Result<Vec<StreamCandidate>> {
    let movie = &manifest.movie;
    let mut candidates = Vec::new();

    for audio in &movie.audios {
        for video in &movie.videos {
            if !audio.is_available || !video.is_available {
                continue;
            }
            for name in &movie.session.protocols {
                let transport = match name.as_str() {
                    "http" => Transport::Http,
                    "hls" => match movie.session.hls_encryption()? {
                        Some(encryption) => Transport::Hls { encryption },
                        None => Transport::HlsNative,
                    },
                    other => {
                        debug!("Skipping unsupported delivery protocol {other}");
                        continue;
                    }
                };
                candidates.push(StreamCandidate {
                    audio: audio.clone(),
                    video: video.clone(),
                    transport,
                });
            }
        }
    }

    Ok(candidates)
}
