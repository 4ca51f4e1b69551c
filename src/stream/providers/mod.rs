//! Platform extractors

pub mod niconico;
pub mod niconico_live;
pub mod niconico_playlist;
pub mod radiko;

use std::sync::Arc;

pub use niconico::NiconicoExtractor;
pub use niconico_live::NiconicoLiveExtractor;
pub use niconico_playlist::NiconicoPlaylistExtractor;
pub use radiko::RadikoExtractor;

use crate::config::Config;
use crate::error::{Result, StreamError};
use crate::http_client::HttpClient;
use crate::radio::AuthCache;
use crate::stream::provider::MediaExtractor;

/// Every extractor, sharing one client and one radio auth cache.
pub fn extractors(
    client: Arc<HttpClient>,
    config: &Config,
    auth_cache: Arc<AuthCache>,
) -> Vec<Box<dyn MediaExtractor>> {
    vec![
        Box::new(NiconicoExtractor::new(
            client.clone(),
            config.extractor_retries,
        )),
        Box::new(NiconicoLiveExtractor::new(client.clone())),
        Box::new(NiconicoPlaylistExtractor::new(client.clone())),
        Box::new(RadikoExtractor::new(client, auth_cache)),
    ]
}

/// The first extractor matching `url`.
pub fn find_extractor<'a>(
    extractors: &'a [Box<dyn MediaExtractor>],
    url: &str,
) -> Result<&'a dyn MediaExtractor> {
    extractors
        .iter()
        .find(|e| e.matches(url))
        .map(|e| &**e)
        .ok_or_else(|| StreamError::NotFound(format!("No extractor for {url}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Vec<Box<dyn MediaExtractor>> {
        let client = Arc::new(HttpClient::new(&Config::default()).unwrap());
        extractors(client, &Config::default(), Arc::new(AuthCache::new()))
    }

    #[test]
    fn test_find_extractor() {
        let registry = registry();
        let name = |url: &str| find_extractor(&registry, url).map(|e| e.name());

        assert_eq!(name("https://www.nicovideo.jp/watch/sm9").unwrap(), "niconico");
        assert_eq!(name("nico:lv1234").unwrap(), "niconico:live");
        assert_eq!(name("https://live.nicovideo.jp/watch/lv1234").unwrap(), "niconico:live");
        assert_eq!(name("https://radiko.jp/#!/ts/QRR/20210425101300").unwrap(), "radiko");
        assert_eq!(name("https://www.nicovideo.jp/mylist/27411728").unwrap(), "niconico:playlist");
        assert_eq!(name("https://nico.ms/series/203559").unwrap(), "niconico:playlist");
        assert_eq!(name("https://www.nicovideo.jp/user/805442").unwrap(), "niconico:playlist");
    }

    #[test]
    fn test_unmatched_url() {
        let registry = registry();
        let Err(err) = find_extractor(&registry, "https://example.com/video") else {
            panic!("expected no extractor");
        };
        assert_eq!(err.to_string(), "not found: No extractor for https://example.com/video");
    }
}
