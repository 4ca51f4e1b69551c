//! Two-step radio authentication and its cache.

use std::sync::{Mutex, PoisonError};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::HeaderMap;
use tracing::{debug, info, instrument};

use crate::error::{Result, StreamError};
use crate::http_client::HttpClient;

const AUTH1_URL: &str = "https://radiko.jp/v2/api/auth1";
const AUTH2_URL: &str = "https://radiko.jp/v2/api/auth2";

/// Key the partial key is cut from.
const PARTIAL_KEY_BASE: &[u8] = b"bcd151073c03b352e1ef2fd66c32209da9ca0afa";

/// Token and area granted by the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioAuth {
    pub token: String,
    pub area_id: String,
}

/// Caches the handshake result for the lifetime of the extractor.
#[derive(Debug, Default)]
pub struct AuthCache {
    inner: Mutex<Option<RadioAuth>>,
}

impl AuthCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<RadioAuth> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, auth: RadioAuth) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(auth);
    }

    /// Forget the cached token so the next request authenticates again.
    pub fn clear(&self) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Base64 of `length` bytes of the key base starting at `offset`.
pub fn partial_key(offset: usize, length: usize) -> Result<String> {
    let slice = offset
        .checked_add(length)
        .and_then(|end| PARTIAL_KEY_BASE.get(offset..end))
        .ok_or_else(|| {
            StreamError::Parse(format!("partial key {offset}+{length} out of range"))
        })?;
    Ok(STANDARD.encode(slice))
}

/// Token, key offset and key length from the first handshake response.
fn auth1_params(headers: &HeaderMap) -> Result<(String, usize, usize)> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StreamError::Parse(format!("auth1 response without {name}")))
    };
    let number = |name: &str| -> Result<usize> {
        header(name)?
            .trim()
            .parse()
            .map_err(|e| StreamError::Parse(format!("{name}: {e}")))
    };

    Ok((
        header("X-Radiko-AuthToken")?.to_string(),
        number("X-Radiko-KeyOffset")?,
        number("X-Radiko-KeyLength")?,
    ))
}

/// Area id from the second handshake response (`"JP13,tokyo,..."`).
fn area_from_auth2(body: &str) -> Result<String> {
    body.split(',')
        .next()
        .map(str::trim)
        .filter(|area| !area.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StreamError::Parse("auth2 response without area".into()))
}

/// Run both handshake steps.
#[instrument(skip(client))]
pub async fn authenticate(client: &HttpClient) -> Result<RadioAuth> {
    debug!("Authenticating (1)");
    let auth1 = client
        .get(
            AUTH1_URL,
            &[
                ("x-radiko-app", "pc_html5"),
                ("x-radiko-app-version", "0.0.1"),
                ("x-radiko-device", "pc"),
                ("x-radiko-user", "dummy_user"),
            ],
        )
        .await?;
    let (token, offset, length) = auth1_params(auth1.headers())?;
    let key = partial_key(offset, length)?;

    debug!("Authenticating (2)");
    let body = client
        .get_text(
            AUTH2_URL,
            &[
                ("x-radiko-device", "pc"),
                ("x-radiko-user", "dummy_user"),
                ("x-radiko-authtoken", token.as_str()),
                ("x-radiko-partialkey", key.as_str()),
            ],
        )
        .await?;
    let area_id = area_from_auth2(&body)?;
    info!("Authenticated for area {area_id}");

    Ok(RadioAuth { token, area_id })
}

/// Cached credentials, authenticating on a miss.
pub async fn authorize(cache: &AuthCache, client: &HttpClient) -> Result<RadioAuth> {
    if let Some(auth) = cache.get() {
        return Ok(auth);
    }
    let auth = authenticate(client).await?;
    cache.set(auth.clone());
    Ok(auth)
}
