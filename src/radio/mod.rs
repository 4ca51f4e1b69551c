//! Time-shifted radio
//!
//! A past broadcast is addressed by station and a timestamp inside the
//! program. [`schedule`] parses the station's weekly program list,
//! [`locator`] picks the program airing at the timestamp and builds the
//! time-shifted playlist URLs, and [`auth`] performs the token handshake
//! those playlists require.

pub mod auth;
pub mod locator;
pub mod schedule;

pub use auth::{AuthCache, RadioAuth};
pub use locator::{locate, playlist_requests, time_to_skip, PlaylistRequest};
pub use schedule::{parse_schedule, parse_stream_endpoints, parse_timestamp, ProgramWindow};

pub fn schedule_url(station: &str) -> String {
    format!("https://radiko.jp/v3/program/station/weekly/{station}.xml")
}

pub fn stream_list_url(station: &str) -> String {
    format!("https://radiko.jp/v3/station/stream/pc_html5/{station}.xml")
}
