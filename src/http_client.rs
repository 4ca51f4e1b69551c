//! Shared HTTP client
//!
//! Features:
//! - Connection pooling with keep-alive
//! - TLS via rustls, Brotli/Gzip compression
//! - One cookie jar shared by page fetches, session API calls and the live
//!   control channel handshake
//!
//! [`SessionTransport`] is the seam the session negotiator and heartbeat
//! scheduler talk through; [`HttpClient`] is its production implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::config::Config;
use crate::error::{Result, StreamError};

/// Timeout for API and page requests. Media downloads are not bounded.
const API_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP verbs the session negotiator and heartbeat scheduler need.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// POST a JSON body and decode the JSON response.
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value>;

    /// Send a heartbeat payload to a negotiated session.
    async fn keep_alive(&self, url: &str, payload: &str) -> Result<()>;
}

/// HTTP client used by every extractor.
pub struct HttpClient {
    client: Client,
    jar: Arc<Jar>,
    user_agent: String,
}

impl HttpClient {
    pub fn new(config: &Config) -> Result<Self> {
        let jar = Arc::new(Jar::default());

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            // Keep connections alive for reuse
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .tcp_nodelay(true)
            .use_rustls_tls()
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            client,
            jar,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Add `name=value; name2=value2` cookies for the site serving `url`.
    ///
    /// Cookies are scoped to the registrable domain so that sibling hosts
    /// (e.g. the live site of the same platform) receive them too.
    pub fn add_cookies(&self, header: &str, url: &str) -> Result<()> {
        let url = Url::parse(url).map_err(|e| StreamError::Parse(format!("{url}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| StreamError::Parse(format!("no host in {url}")))?;
        let domain = cookie_domain(host);

        for pair in header.split(';').map(str::trim).filter(|p| p.contains('=')) {
            self.jar
                .add_cookie_str(&format!("{pair}; Domain={domain}; Path=/"), &url);
        }
        Ok(())
    }

    /// `Cookie` header value the jar would send to `url`.
    pub fn cookie_header(&self, url: &str) -> Option<String> {
        let url = Url::parse(url).ok()?;
        self.jar
            .cookies(&url)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// GET `url` whatever the status; error pages are returned as responses.
    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn send_get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response> {
        debug!("GET");
        let req = with_headers(self.client.get(url).timeout(API_TIMEOUT), headers);
        Ok(req.send().await?)
    }

    /// GET `url` and fail on a non-success status.
    pub async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response> {
        ensure_success(self.send_get(url, headers).await?)
    }

    pub async fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String> {
        Ok(self.get(url, headers).await?.text().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<T> {
        Ok(self.get(url, headers).await?.json().await?)
    }

    /// GET without a request timeout, for media bodies.
    pub async fn get_stream(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response> {
        let req = with_headers(self.client.get(url), headers);
        ensure_success(req.send().await?)
    }
}

#[async_trait]
impl SessionTransport for HttpClient {
    #[instrument(skip(self, body), fields(url = %url))]
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value> {
        let resp = self
            .client
            .post(url)
            .timeout(API_TIMEOUT)
            .json(body)
            .send()
            .await?;
        Ok(ensure_success(resp)?.json().await?)
    }

    async fn keep_alive(&self, url: &str, payload: &str) -> Result<()> {
        // The session URL carries `_method=PUT`; the API takes the body as a POST.
        let resp = self
            .client
            .post(url)
            .timeout(API_TIMEOUT)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;
        ensure_success(resp)?;
        Ok(())
    }
}

fn with_headers(mut req: RequestBuilder, headers: &[(&str, &str)]) -> RequestBuilder {
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    req
}

fn ensure_success(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(StreamError::Http {
            status: status.as_u16(),
            url: resp.url().to_string(),
        })
    }
}

/// Last two labels of `host` (`www.nicovideo.jp` → `nicovideo.jp`).
fn cookie_domain(host: &str) -> &str {
    let mut dots = host.rmatch_indices('.');
    match (dots.next(), dots.next()) {
        (Some(_), Some((idx, _))) => &host[idx + 1..],
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_domain() {
        assert_eq!(cookie_domain("www.nicovideo.jp"), "nicovideo.jp");
        assert_eq!(cookie_domain("live2.nicovideo.jp"), "nicovideo.jp");
        assert_eq!(cookie_domain("radiko.jp"), "radiko.jp");
        assert_eq!(cookie_domain("localhost"), "localhost");
    }

    #[test]
    fn test_cookies_shared_across_subdomains() {
        let client = HttpClient::new(&Config::default()).unwrap();
        client
            .add_cookies(
                "user_session=abc; nicosid=123",
                "https://www.nicovideo.jp/watch/sm9",
            )
            .unwrap();

        let header = client
            .cookie_header("https://live2.nicovideo.jp/watch/lv1")
            .unwrap();
        assert!(header.contains("user_session=abc"));
        assert!(header.contains("nicosid=123"));
        assert!(client.cookie_header("https://example.com/").is_none());
    }

    #[test]
    fn test_add_cookies_rejects_bad_url() {
        let client = HttpClient::new(&Config::default()).unwrap();
        assert!(client.add_cookies("a=b", "not a url").is_err());
    }
}
