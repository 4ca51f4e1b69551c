pub mod download;
pub mod info;
pub mod live_url;

use std::sync::Arc;

use anyhow::{Context as _, Result};

use streamgate::config::Config;
use streamgate::radio::AuthCache;
use streamgate::stream::{self, MediaExtractor, MediaInfo};
use streamgate::HttpClient;

/// Site the configured cookies are scoped to. The live site shares the
/// registrable domain.
const COOKIE_SITE: &str = "https://www.nicovideo.jp/";

/// State shared by every subcommand.
pub struct Context {
    pub config: Config,
    pub client: Arc<HttpClient>,
    extractors: Vec<Box<dyn MediaExtractor>>,
}

impl Context {
    pub fn new(config: Config) -> Result<Self> {
        let client = Arc::new(HttpClient::new(&config).context("failed to build HTTP client")?);
        if let Some(cookies) = &config.cookies {
            client.add_cookies(cookies, COOKIE_SITE)?;
        }
        let extractors = stream::extractors(client.clone(), &config, Arc::new(AuthCache::new()));
        Ok(Self {
            config,
            client,
            extractors,
        })
    }

    pub fn extractors(&self) -> &[Box<dyn MediaExtractor>] {
        &self.extractors
    }

    /// Run the matching extractor on `url`.
    pub async fn extract(&self, url: &str) -> Result<MediaInfo> {
        let extractor = stream::find_extractor(&self.extractors, url)?;
        eprintln!("🎬 Extractor: {}", extractor.name());
        extractor
            .extract(url)
            .await
            .with_context(|| format!("{} extraction failed for {url}", extractor.name()))
    }
}
