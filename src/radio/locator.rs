//! Find the program airing at a given moment and build its time-shifted
//! playlist URLs.

use chrono::NaiveDateTime;
use url::Url;

use super::schedule::{ProgramWindow, StreamEndpoint};
use crate::error::{Result, StreamError};

/// Listener-session id the web player sends with time-shifted requests.
const LSID: &str = "77d0678df93a1034659c14d6fc89f018";

/// A playlist to request for the located program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRequest {
    pub url: String,
    pub timefree: bool,
}

/// The first window, in schedule order, airing at `target`.
pub fn locate(windows: &[ProgramWindow], target: NaiveDateTime) -> Result<&ProgramWindow> {
    windows
        .iter()
        .find(|w| w.contains(target))
        .ok_or_else(|| {
            StreamError::NotFound(format!("cannot identify radio program airing at {target}"))
        })
}

/// Seconds from the start of `window` to `target`.
pub fn time_to_skip(window: &ProgramWindow, target: NaiveDateTime) -> i64 {
    (target - window.start).num_seconds()
}

/// Add the time-shift parameters to a `playlist_create_url`. Parameters
/// already present on the URL are replaced.
pub fn playlist_url(
    create_url: &str,
    station: &str,
    window: &ProgramWindow,
    seek: &str,
) -> Result<String> {
    let mut url =
        Url::parse(create_url).map_err(|e| StreamError::Parse(format!("{create_url}: {e}")))?;
    let ft = window.ft();
    let to = window.to();
    let params = [
        ("station_id", station),
        ("start_at", ft.as_str()),
        ("ft", ft.as_str()),
        ("end_at", to.as_str()),
        ("to", to.as_str()),
        ("seek", seek),
        ("l", "15"),
        ("lsid", LSID),
        ("type", "b"),
    ];

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(p, _)| p == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .extend_pairs(params);
    Ok(url.to_string())
}

/// Playlist URLs for every stream endpoint, without duplicates, in
/// endpoint order.
pub fn playlist_requests(
    endpoints: &[StreamEndpoint],
    station: &str,
    window: &ProgramWindow,
    seek: &str,
) -> Result<Vec<PlaylistRequest>> {
    let mut requests: Vec<PlaylistRequest> = Vec::new();
    for endpoint in endpoints {
        let url = playlist_url(&endpoint.playlist_create_url, station, window, seek)?;
        if requests.iter().any(|r| r.url == url) {
            continue;
        }
        requests.push(PlaylistRequest {
            url,
            timefree: endpoint.timefree,
        });
    }
    Ok(requests)
}
