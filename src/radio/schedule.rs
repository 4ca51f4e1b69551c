//! Station schedule and stream-list XML.

use chrono::NaiveDateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use scraper::Html;

use crate::error::{Result, StreamError};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// One scheduled program. Airs during `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub title: String,
    pub description: Option<String>,
    pub info: Option<String>,
}

impl ProgramWindow {
    pub fn contains(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }

    /// `ft` query value: start in `YYYYMMDDhhmmss` form.
    pub fn ft(&self) -> String {
        self.start.format(TIMESTAMP_FORMAT).to_string()
    }

    /// `to` query value: end in `YYYYMMDDhhmmss` form.
    pub fn to(&self) -> String {
        self.end.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// A `playlist_create_url` entry of the station's stream list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub playlist_create_url: String,
    /// Time-shifted playback; seeking is done with `-ss`.
    pub timefree: bool,
}

/// Parse a `YYYYMMDDhhmmss` timestamp.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| StreamError::Parse(format!("bad timestamp {s:?}: {e}")))
}

/// Text content of an HTML fragment with whitespace collapsed.
pub fn clean_html(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: Vec<&str> = fragment.root_element().text().collect();
    text.join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| StreamError::Parse(e.to_string()))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| StreamError::Parse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn required_attribute(e: &BytesStart<'_>, name: &str) -> Result<String> {
    attribute(e, name)?.ok_or_else(|| {
        StreamError::Parse(format!(
            "<{}> without {name}",
            String::from_utf8_lossy(e.name().as_ref())
        ))
    })
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ProgField {
    Title,
    Desc,
    Info,
}

struct PendingProgram {
    start: NaiveDateTime,
    end: NaiveDateTime,
    title: String,
    desc: String,
    info: String,
}

impl PendingProgram {
    fn field(&mut self, field: ProgField) -> &mut String {
        match field {
            ProgField::Title => &mut self.title,
            ProgField::Desc => &mut self.desc,
            ProgField::Info => &mut self.info,
        }
    }

    fn finish(self) -> ProgramWindow {
        let cleaned = |s: &str| {
            let s = clean_html(s);
            (!s.is_empty()).then_some(s)
        };
        ProgramWindow {
            start: self.start,
            end: self.end,
            title: self.title.trim().to_string(),
            description: cleaned(&self.desc),
            info: cleaned(&self.info),
        }
    }
}

/// Parse the weekly schedule, keeping document order.
pub fn parse_schedule(xml: &str) -> Result<Vec<ProgramWindow>> {
    let mut reader = Reader::from_str(xml);
    let mut windows = Vec::new();
    let mut current: Option<PendingProgram> = None;
    let mut field: Option<ProgField> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"prog" => {
                    current = Some(PendingProgram {
                        start: parse_timestamp(&required_attribute(&e, "ft")?)?,
                        end: parse_timestamp(&required_attribute(&e, "to")?)?,
                        title: String::new(),
                        desc: String::new(),
                        info: String::new(),
                    });
                }
                b"title" if current.is_some() => field = Some(ProgField::Title),
                b"desc" if current.is_some() => field = Some(ProgField::Desc),
                b"info" if current.is_some() => field = Some(ProgField::Info),
                _ => {}
            },
            Event::Text(e) => {
                if let (Some(prog), Some(f)) = (current.as_mut(), field) {
                    let text = e
                        .unescape()
                        .map_err(|e| StreamError::Parse(e.to_string()))?;
                    prog.field(f).push_str(&text);
                }
            }
            Event::CData(e) => {
                if let (Some(prog), Some(f)) = (current.as_mut(), field) {
                    prog.field(f).push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"prog" => {
                    if let Some(prog) = current.take() {
                        windows.push(prog.finish());
                    }
                    field = None;
                }
                b"title" | b"desc" | b"info" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(windows)
}

/// Parse the station's stream list (`url` elements).
pub fn parse_stream_endpoints(xml: &str) -> Result<Vec<StreamEndpoint>> {
    let mut reader = Reader::from_str(xml);
    let mut endpoints = Vec::new();
    let mut timefree: Option<bool> = None;
    let mut in_create_url = false;
    let mut create_url = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"url" => {
                    timefree = Some(attribute(&e, "timefree")?.as_deref() == Some("1"));
                    create_url.clear();
                }
                b"playlist_create_url" if timefree.is_some() => in_create_url = true,
                _ => {}
            },
            Event::Text(e) if in_create_url => {
                let text = e
                    .unescape()
                    .map_err(|e| StreamError::Parse(e.to_string()))?;
                create_url.push_str(&text);
            }
            Event::End(e) => match e.name().as_ref() {
                b"playlist_create_url" => in_create_url = false,
                b"url" => {
                    if let Some(timefree) = timefree.take() {
                        let url = create_url.trim();
                        if !url.is_empty() {
                            endpoints.push(StreamEndpoint {
                                playlist_create_url: url.to_string(),
                                timefree,
                            });
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(endpoints)
}
