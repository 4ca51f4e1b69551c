//! Niconico video lists: mylists, user upload lists and series
//!
//! Mylists and user uploads come from the paged `nvapi` JSON endpoints.
//! Series are only available as an HTML page listing watch links.
//! Every list resolves to [`PlaylistEntry`]s pointing at watch URLs; the
//! videos themselves are extracted one by one when downloaded.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::niconico::{id_at, str_at, API_HEADERS};
use crate::error::{Result, StreamError};
use crate::http_client::HttpClient;
use crate::session::negotiator::SITE_ORIGIN;
use crate::stream::provider::{MediaExtractor, MediaInfo, PlaylistEntry};

const API_ORIGIN: &str = "https://nvapi.nicovideo.jp";

/// Items requested per API page.
pub const PAGE_SIZE: u64 = 100;

static MYLIST_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^https?://(?:(?:www\.|sp\.)?nicovideo\.jp|nico\.ms)/(?:user/\d+/)?(?:my/)?mylist/(?P<id>\d+)",
    )
    .expect("valid regex")
});
static USER_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:(?:www\.|sp\.)?nicovideo\.jp|nico\.ms)/user/(?P<id>\d+)")
        .expect("valid regex")
});
static SERIES_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:(?:www\.|sp\.)?nicovideo\.jp|nico\.ms)/series/(?P<id>\d+)")
        .expect("valid regex")
});

static USER_DATA: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("#js-initial-userpage-data[data-initial-data]").expect("valid selector")
});
static WATCH_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href^="/watch/"][data-href]"#).expect("valid selector")
});
static PAGE_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid selector"));
static SHARE_BUTTON: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.TwitterShareButton[data-text]").expect("valid selector")
});

/// `「<series>（全N件）」...` page titles.
static SERIES_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^「(.+)（全").expect("valid regex"));
static SHARE_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?s)(.+?)\s+https:").expect("valid regex"));
static VIDEO_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+$").expect("valid regex"));

/// Which kind of list a URL points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoList {
    Mylist(String),
    User(String),
    Series(String),
}

impl VideoList {
    /// Mylists nested under a user page win over the user list itself.
    pub fn from_url(url: &str) -> Option<Self> {
        let id = |re: &Regex| re.captures(url).map(|caps| caps["id"].to_string());
        id(&MYLIST_URL)
            .map(Self::Mylist)
            .or_else(|| id(&SERIES_URL).map(Self::Series))
            .or_else(|| id(&USER_URL).map(Self::User))
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Mylist(id) | Self::User(id) | Self::Series(id) => id,
        }
    }
}

/// Entries and list metadata collected from one or more pages.
#[derive(Debug, Default)]
pub struct ListPage {
    pub title: Option<String>,
    pub description: Option<String>,
    pub uploader: Option<String>,
    pub uploader_id: Option<String>,
    /// Total number of items the list reports, across all pages.
    pub total: u64,
    pub entries: Vec<PlaylistEntry>,
}

/// Number of API pages needed for `total` items.
pub fn page_count(total: u64) -> u64 {
    total.div_ceil(PAGE_SIZE)
}

/// A list item, or `None` when it carries no video id (deleted videos).
pub fn list_entry(video: &Value) -> Option<PlaylistEntry> {
    let id = str_at(video, "/id")?;
    Some(PlaylistEntry {
        url: format!("{SITE_ORIGIN}/watch/{id}"),
        title: str_at(video, "/title"),
        description: str_at(video, "/shortDescription"),
        duration: video.get("duration").and_then(Value::as_u64),
        view_count: video.pointer("/count/view").and_then(Value::as_u64),
        comment_count: video.pointer("/count/comment").and_then(Value::as_u64),
        uploader: str_at(video, "/owner/name"),
        uploader_id: id_at(video, "/owner/id"),
        id,
    })
}

fn items<'a>(list: &'a Value, what: &str) -> Result<&'a Vec<Value>> {
    list.get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| StreamError::Parse(format!("{what} response without items")))
}

/// `data.mylist` of a `/v2/mylists/<id>` response. Videos are nested under
/// each item's `video` key.
pub fn mylist_page(body: &Value) -> Result<ListPage> {
    let mylist = body
        .pointer("/data/mylist")
        .ok_or_else(|| StreamError::Parse("mylist response without data.mylist".into()))?;
    let entries = items(mylist, "mylist")?
        .iter()
        .filter_map(|item| item.get("video").and_then(list_entry))
        .collect();

    Ok(ListPage {
        title: str_at(mylist, "/name"),
        description: str_at(mylist, "/description"),
        uploader: str_at(mylist, "/owner/name"),
        uploader_id: id_at(mylist, "/owner/id"),
        total: mylist
            .get("totalItemCount")
            .and_then(Value::as_u64)
            .unwrap_or_default(),
        entries,
    })
}

/// `data` of a `/v1/users/<id>/videos` response. Items are the videos.
pub fn user_videos_page(body: &Value) -> Result<ListPage> {
    let data = body
        .get("data")
        .ok_or_else(|| StreamError::Parse("user videos response without data".into()))?;
    let entries = items(data, "user videos")?
        .iter()
        .filter_map(list_entry)
        .collect();

    Ok(ListPage {
        uploader: str_at(data, "/owner/name"),
        uploader_id: id_at(data, "/owner/id"),
        total: data
            .get("totalCount")
            .and_then(Value::as_u64)
            .unwrap_or_default(),
        entries,
        ..ListPage::default()
    })
}

/// Nickname and description from a user page's initial data.
pub fn user_profile(html: &str) -> (Option<String>, Option<String>) {
    let document = Html::parse_document(html);
    let user = document
        .select(&USER_DATA)
        .next()
        .and_then(|el| el.value().attr("data-initial-data"))
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .and_then(|data| data.pointer("/userDetails/userDetails/user").cloned())
        .unwrap_or(Value::Null);
    (
        str_at(&user, "/nickname"),
        str_at(&user, "/strippedDescription"),
    )
}

/// Title and watch links of a series page, in page order.
pub fn series_page(html: &str) -> ListPage {
    let document = Html::parse_document(html);

    let title = document
        .select(&PAGE_TITLE)
        .next()
        .map(|el| el.text().collect::<String>())
        .and_then(|text| {
            SERIES_TITLE
                .captures(text.trim())
                .map(|caps| caps[1].to_string())
        })
        .or_else(|| {
            document
                .select(&SHARE_BUTTON)
                .next()
                .and_then(|el| el.value().attr("data-text"))
                .and_then(|text| SHARE_TEXT.captures(text).map(|caps| caps[1].to_string()))
        });

    let mut seen = HashSet::new();
    let entries: Vec<PlaylistEntry> = document
        .select(&WATCH_LINK)
        .filter(|el| el.value().attr("href") == el.value().attr("data-href"))
        .filter_map(|el| el.value().attr("href")?.strip_prefix("/watch/"))
        .filter(|id| VIDEO_ID.is_match(id) && seen.insert(id.to_string()))
        .map(|id| PlaylistEntry {
            id: id.to_string(),
            url: format!("{SITE_ORIGIN}/watch/{id}"),
            ..PlaylistEntry::default()
        })
        .collect();

    ListPage {
        title,
        total: entries.len() as u64,
        entries,
        ..ListPage::default()
    }
}

/// Extractor for mylist, user and series URLs.
pub struct NiconicoPlaylistExtractor {
    client: Arc<HttpClient>,
    api_origin: String,
    site_origin: String,
}

impl NiconicoPlaylistExtractor {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self::with_origins(client, API_ORIGIN, SITE_ORIGIN)
    }

    /// Talk to other API and site hosts than the public ones.
    pub fn with_origins(
        client: Arc<HttpClient>,
        api_origin: impl Into<String>,
        site_origin: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_origin: api_origin.into(),
            site_origin: site_origin.into(),
        }
    }

    async fn fetch_page(
        &self,
        path: &str,
        page: u64,
        parse: fn(&Value) -> Result<ListPage>,
    ) -> Result<ListPage> {
        let url = format!(
            "{}{path}?page={page}&pageSize={PAGE_SIZE}",
            self.api_origin
        );
        debug!("Downloading page {page} of {path}");
        let body: Value = self.client.get_json(&url, &API_HEADERS).await?;
        parse(&body)
    }

    /// Every page of a paged list, merged into the first.
    async fn paged(&self, path: &str, parse: fn(&Value) -> Result<ListPage>) -> Result<ListPage> {
        let mut list = self.fetch_page(path, 1, parse).await?;
        for page in 2..=page_count(list.total) {
            let next = self.fetch_page(path, page, parse).await?;
            if next.entries.is_empty() {
                break;
            }
            list.entries.extend(next.entries);
        }
        Ok(list)
    }

    async fn list(&self, list: &VideoList) -> Result<ListPage> {
        match list {
            VideoList::Mylist(id) => self.paged(&format!("/v2/mylists/{id}"), mylist_page).await,
            VideoList::User(id) => {
                let html = self
                    .client
                    .get_text(&format!("{}/user/{id}", self.site_origin), &[])
                    .await?;
                let (nickname, description) = user_profile(&html);
                let mut page = self
                    .paged(&format!("/v1/users/{id}/videos"), user_videos_page)
                    .await?;
                page.title = nickname;
                page.description = description;
                Ok(page)
            }
            VideoList::Series(id) => {
                let html = self
                    .client
                    .get_text(&format!("{}/series/{id}", self.site_origin), &[])
                    .await?;
                Ok(series_page(&html))
            }
        }
    }
}

#[async_trait]
impl MediaExtractor for NiconicoPlaylistExtractor {
    fn name(&self) -> &'static str {
        "niconico:playlist"
    }

    fn matches(&self, url: &str) -> bool {
        VideoList::from_url(url).is_some()
    }

    #[instrument(skip(self))]
    async fn extract(&self, url: &str) -> Result<MediaInfo> {
        let list = VideoList::from_url(url)
            .ok_or_else(|| StreamError::NotFound(format!("not a niconico list URL: {url}")))?;
        let page = self.list(&list).await?;
        info!("List {} has {} videos", list.id(), page.entries.len());

        Ok(MediaInfo {
            id: list.id().to_string(),
            title: page.title.unwrap_or_else(|| list.id().to_string()),
            description: page.description,
            uploader: page.uploader,
            uploader_id: page.uploader_id,
            webpage_url: url.to_string(),
            entries: Some(page.entries),
            ..MediaInfo::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn video(id: &str, title: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "shortDescription": "short",
            "duration": 95,
            "count": {"view": 1200, "comment": 34, "mylist": 5},
            "owner": {"id": "805442", "name": "nock"}
        })
    }

    fn mylist_body(total: u64, ids: &[&str]) -> Value {
        let items: Vec<Value> = ids
            .iter()
            .map(|id| json!({"itemId": 1, "video": video(id, &format!("Episode {id}"))}))
            .collect();
        json!({
            "meta": {"status": 200},
            "data": {"mylist": {
                "id": 27411728,
                "name": "Late night radio",
                "description": "Every episode",
                "owner": {"id": 805442, "name": "nock"},
                "totalItemCount": total,
                "items": items
            }}
        })
    }

    #[test]
    fn test_list_urls() {
        let list = VideoList::from_url;
        assert_eq!(
            list("http://www.nicovideo.jp/mylist/27411728"),
            Some(VideoList::Mylist("27411728".into()))
        );
        assert_eq!(
            list("https://www.nicovideo.jp/user/805442/mylist/27411728"),
            Some(VideoList::Mylist("27411728".into()))
        );
        assert_eq!(
            list("https://sp.nicovideo.jp/my/mylist/1"),
            Some(VideoList::Mylist("1".into()))
        );
        assert_eq!(
            list("https://www.nicovideo.jp/user/1050860/video"),
            Some(VideoList::User("1050860".into()))
        );
        assert_eq!(
            list("https://nico.ms/user/805442/"),
            Some(VideoList::User("805442".into()))
        );
        assert_eq!(
            list("https://www.nicovideo.jp/series/12312/"),
            Some(VideoList::Series("12312".into()))
        );
        assert_eq!(
            list("https://nico.ms/series/203559"),
            Some(VideoList::Series("203559".into()))
        );
        assert_eq!(list("https://www.nicovideo.jp/watch/sm9"), None);
        assert_eq!(list("https://live.nicovideo.jp/watch/lv1"), None);
    }

    #[test]
    fn test_page_count() {
        assert_eq!(page_count(0), 0);
        assert_eq!(page_count(1), 1);
        assert_eq!(page_count(100), 1);
        assert_eq!(page_count(225), 3);
    }

    #[test]
    fn test_mylist_page() {
        let mut body = mylist_body(3, &["sm9", "so38016254"]);
        body["data"]["mylist"]["items"]
            .as_array_mut()
            .unwrap()
            .push(json!({"itemId": 3, "video": {"id": "", "title": "deleted"}}));

        let page = mylist_page(&body).unwrap();
        assert_eq!(page.title.as_deref(), Some("Late night radio"));
        assert_eq!(page.description.as_deref(), Some("Every episode"));
        assert_eq!(page.uploader.as_deref(), Some("nock"));
        assert_eq!(page.uploader_id.as_deref(), Some("805442"));
        assert_eq!(page.total, 3);
        assert_eq!(page.entries.len(), 2);

        let first = &page.entries[0];
        assert_eq!(first.id, "sm9");
        assert_eq!(first.url, "https://www.nicovideo.jp/watch/sm9");
        assert_eq!(first.title.as_deref(), Some("Episode sm9"));
        assert_eq!(first.description.as_deref(), Some("short"));
        assert_eq!(first.duration, Some(95));
        assert_eq!(first.view_count, Some(1200));
        assert_eq!(first.comment_count, Some(34));
        assert_eq!(first.uploader_id.as_deref(), Some("805442"));
    }

    #[test]
    fn test_malformed_mylist() {
        let err = mylist_page(&json!({"meta": {"status": 404}})).unwrap_err();
        assert!(matches!(err, StreamError::Parse(_)));
    }

    #[test]
    fn test_user_videos_page() {
        let body = json!({
            "data": {
                "totalCount": 2,
                "items": [video("sm1", "First"), video("sm2", "Second")]
            }
        });
        let page = user_videos_page(&body).unwrap();
        assert_eq!(page.total, 2);
        let ids: Vec<_> = page.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["sm1", "sm2"]);
        assert_eq!(page.entries[1].title.as_deref(), Some("Second"));
        assert!(page.title.is_none());
    }

    #[test]
    fn test_user_profile() {
        let html = r#"<html><body>
<div id="js-initial-userpage-data" data-environment="{}" data-initial-data="{&quot;userDetails&quot;:{&quot;userDetails&quot;:{&quot;user&quot;:{&quot;id&quot;:17988631,&quot;nickname&quot;:&quot;USAGE&quot;,&quot;strippedDescription&quot;:&quot;Tea &amp; games&quot;}}}}"></div>
</body></html>"#;
        let (nickname, description) = user_profile(html);
        assert_eq!(nickname.as_deref(), Some("USAGE"));
        assert_eq!(description.as_deref(), Some("Tea & games"));

        assert_eq!(user_profile("<html></html>"), (None, None));
    }

    #[test]
    fn test_series_page() {
        let html = r#"<html><head><title>「Card reviews（全97件）」ゲーム シリーズ - ニコニコ動画</title></head>
<body>
<a href="/watch/sm100" data-href="/watch/sm100"><img></a>
<a href="/watch/sm100" data-href="/watch/sm100">Part 1</a>
<a href="/watch/so200" data-href="/watch/so200">Part 2</a>
<a href="/watch/sm300" data-href="/watch/sm999">Sponsored</a>
<a href="/watch/sm400">Related</a>
</body></html>"#;
        let page = series_page(html);
        assert_eq!(page.title.as_deref(), Some("Card reviews"));
        let ids: Vec<_> = page.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["sm100", "so200"]);
        assert_eq!(page.entries[1].url, "https://www.nicovideo.jp/watch/so200");
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_series_title_from_share_button() {
        let html = r#"<html><head><title>ニコニコ動画</title></head><body>
<div class="TwitterShareButton" data-text="Battle cards &amp; more https://nico.ms/series/12312"></div>
</body></html>"#;
        assert_eq!(series_page(html).title.as_deref(), Some("Battle cards & more"));
    }

    /// Answer requests by path and query until every route was served once.
    /// Returns the request heads in arrival order.
    async fn serve(routes: Vec<(String, String)>) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let mut heads = Vec::new();
            for _ in 0..routes.len() {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap();
                let head = String::from_utf8_lossy(&buf[..n]).into_owned();
                let target = head.split_whitespace().nth(1).unwrap_or_default().to_string();
                let reply = match routes.iter().find(|(path, _)| *path == target) {
                    Some((_, body)) => format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    ),
                    None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        .to_string(),
                };
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
                heads.push(head);
            }
            heads
        });
        (origin, task)
    }

    #[tokio::test]
    async fn test_mylist_fetches_every_page() {
        let first: Vec<String> = (0..100).map(|i| format!("sm{i}")).collect();
        let first: Vec<&str> = first.iter().map(String::as_str).collect();
        let (origin, server) = serve(vec![
            (
                "/v2/mylists/27411728?page=1&pageSize=100".into(),
                mylist_body(102, &first).to_string(),
            ),
            (
                "/v2/mylists/27411728?page=2&pageSize=100".into(),
                mylist_body(102, &["sm100", "sm101"]).to_string(),
            ),
        ])
        .await;
        let client = Arc::new(HttpClient::new(&Config::default()).unwrap());
        let extractor = NiconicoPlaylistExtractor::with_origins(client, origin.clone(), origin);

        let info = extractor
            .extract("https://www.nicovideo.jp/user/805442/mylist/27411728")
            .await
            .unwrap();

        assert_eq!(info.id, "27411728");
        assert_eq!(info.title, "Late night radio");
        assert_eq!(info.uploader.as_deref(), Some("nock"));
        assert!(info.formats.is_empty());
        let entries = info.entries.unwrap();
        assert_eq!(entries.len(), 102);
        assert_eq!(entries[101].url, "https://www.nicovideo.jp/watch/sm101");

        let heads = server.await.unwrap();
        assert!(heads[0].to_lowercase().contains("x-frontend-id: 6"));
        assert!(heads[1].starts_with("GET /v2/mylists/27411728?page=2&pageSize=100 "));
    }

    #[tokio::test]
    async fn test_user_list_takes_profile_title() {
        let profile = r#"<div id="js-initial-userpage-data" data-initial-data="{&quot;userDetails&quot;:{&quot;userDetails&quot;:{&quot;user&quot;:{&quot;nickname&quot;:&quot;Flower&quot;}}}}"></div>"#;
        let videos = json!({"data": {"totalCount": 1, "items": [video("sm5", "Only one")]}});
        let (origin, server) = serve(vec![
            ("/user/1050860".into(), profile.to_string()),
            (
                "/v1/users/1050860/videos?page=1&pageSize=100".into(),
                videos.to_string(),
            ),
        ])
        .await;
        let client = Arc::new(HttpClient::new(&Config::default()).unwrap());
        let extractor = NiconicoPlaylistExtractor::with_origins(client, origin.clone(), origin);

        let info = extractor
            .extract("https://www.nicovideo.jp/user/1050860/video")
            .await
            .unwrap();

        assert_eq!(info.title, "Flower");
        assert_eq!(info.entries.as_ref().map(Vec::len), Some(1));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_list_is_http_error() {
        let (origin, _server) = serve(vec![("/unused".into(), String::new())]).await;
        let client = Arc::new(HttpClient::new(&Config::default()).unwrap());
        let extractor = NiconicoPlaylistExtractor::with_origins(client, origin.clone(), origin);

        let err = extractor
            .extract("https://www.nicovideo.jp/mylist/1")
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Http { status: 404, .. }));
    }

    #[test]
    fn test_matches() {
        let client = Arc::new(HttpClient::new(&Config::default()).unwrap());
        let extractor = NiconicoPlaylistExtractor::new(client);
        assert!(extractor.matches("https://www.nicovideo.jp/series/110226"));
        assert!(!extractor.matches("https://www.nicovideo.jp/watch/sm9"));
    }
}
