use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

use crate::util::{unescape_html, unescape_xml_lenient};

/// RFC 1123 with a numeric zone, e.g. `Mon, 02 Jan 2006 15:04:05 -0700`.
/// The weekday prefix is stripped before parsing, so only the rest is matched.
const RFC1123Z_BODY: &str = "%d %b %Y %H:%M:%S %z";
/// RFC 1123 without the zone token, e.g. `Mon, 02 Jan 2006 15:04:05 MST`.
const RFC1123_BODY: &str = "%d %b %Y %H:%M:%S";

/// Errors that fail the parse of a whole document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The XML itself is malformed
    #[error("Malformed XML: {0}")]
    Xml(String),
    /// Not RSS, and feed-rs did not recognize it either
    #[error("Unrecognized feed format: {0}")]
    Unrecognized(String),
    /// No root element at all
    #[error("Document is empty or not XML")]
    Empty,
}

/// One normalized feed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    pub title: String,
    pub link: String,
    pub description: Option<String>,
    /// Unix milliseconds; `None` when the date was missing or unparsable
    pub published_at: Option<i64>,
}

/// Result of parsing a feed: entries in document order plus items dropped for lacking a link
#[derive(Debug, Default)]
pub struct ParseResult {
    pub entries: Vec<ParsedEntry>,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct RawItem {
    title: String,
    link: String,
    description: String,
    pub_date: String,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Title,
    Link,
    Description,
    PubDate,
}

impl Field {
    fn from_tag(tag: &BytesStart<'_>) -> Option<Self> {
        match tag.name().as_ref() {
            b"title" => Some(Field::Title),
            b"link" => Some(Field::Link),
            b"description" => Some(Field::Description),
            b"pubDate" => Some(Field::PubDate),
            _ => None,
        }
    }
}

impl RawItem {
    fn buffer(&mut self, field: Field) -> &mut String {
        match field {
            Field::Title => &mut self.title,
            Field::Link => &mut self.link,
            Field::Description => &mut self.description,
            Field::PubDate => &mut self.pub_date,
        }
    }

    /// Items without a link have no dedup key and are dropped.
    fn into_entry(self) -> Option<ParsedEntry> {
        let link = self.link.trim();
        if link.is_empty() {
            return None;
        }

        let title = unescape_html(self.title.trim()).into_owned();
        let description = unescape_html(self.description.trim()).into_owned();

        Some(ParsedEntry {
            title: if title.is_empty() {
                "Untitled".to_string()
            } else {
                title
            },
            link: link.to_string(),
            description: (!description.is_empty()).then_some(description),
            published_at: parse_pub_date(&self.pub_date).map(|dt| dt.timestamp_millis()),
        })
    }
}

/// Parses raw feed bytes into normalized entries.
///
/// RSS 2.0 is read directly so the raw `pubDate` text is available for the
/// two-format date fallback. Any other root element (Atom `<feed>`, RDF) is
/// handed to `feed-rs`.
///
/// # Errors
///
/// Returns [`ParseError`] when the document is malformed or not a feed.
/// Bad dates and odd escaping inside individual items never fail the parse.
pub fn parse_feed(bytes: &[u8]) -> Result<ParseResult, ParseError> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut result = ParseResult::default();
    let mut seen_root = false;
    let mut item: Option<RawItem> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if !seen_root {
                    seen_root = true;
                    if e.name().as_ref() != b"rss" {
                        return parse_with_feed_rs(bytes);
                    }
                } else if e.name().as_ref() == b"item" {
                    item = Some(RawItem::default());
                    field = None;
                } else if item.is_some() && field.is_none() {
                    field = Field::from_tag(&e);
                }
            }
            Ok(Event::Empty(e)) if !seen_root => {
                seen_root = true;
                if e.name().as_ref() != b"rss" {
                    return parse_with_feed_rs(bytes);
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(current), Some(f)) = (item.as_mut(), field) {
                    // Unknown HTML entities outside CDATA make strict XML unescape
                    // fail; decode the XML references one by one instead and leave
                    // the rest for unescape_html.
                    let text = match e.unescape() {
                        Ok(t) => t.into_owned(),
                        Err(_) => unescape_xml_lenient(&String::from_utf8_lossy(&e)).into_owned(),
                    };
                    current.buffer(f).push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                if let (Some(current), Some(f)) = (item.as_mut(), field) {
                    current.buffer(f).push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"item" => {
                    if let Some(done) = item.take() {
                        match done.into_entry() {
                            Some(entry) => result.entries.push(entry),
                            None => result.skipped += 1,
                        }
                    }
                    field = None;
                }
                b"title" | b"link" | b"description" | b"pubDate" => field = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ParseError::Xml(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !seen_root {
        return Err(ParseError::Empty);
    }

    Ok(result)
}

/// Fallback for Atom and RDF documents. Dates come pre-parsed from feed-rs.
fn parse_with_feed_rs(bytes: &[u8]) -> Result<ParseResult, ParseError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| ParseError::Unrecognized(e.to_string()))?;

    let mut result = ParseResult::default();
    for entry in feed.entries {
        let Some(link) = entry.links.first().map(|l| l.href.trim().to_string()) else {
            result.skipped += 1;
            continue;
        };
        if link.is_empty() {
            result.skipped += 1;
            continue;
        }

        let title = entry
            .title
            .map(|t| unescape_html(t.content.trim()).into_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());
        let description = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|d| unescape_html(d.trim()).into_owned())
            .filter(|d| !d.is_empty());
        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.timestamp_millis());

        result.entries.push(ParsedEntry {
            title,
            link,
            description,
            published_at,
        });
    }

    Ok(result)
}

/// Parses an item's publish date.
///
/// Tries RFC 1123 with a numeric offset first, then RFC 1123 with a zone
/// abbreviation. The weekday is ignored (feeds often get it wrong). Returns
/// `None` when neither format matches.
///
/// ```
/// use gator::feed::parse_pub_date;
///
/// let primary = parse_pub_date("Tue, 10 Jun 2003 04:00:00 -0500").unwrap();
/// let fallback = parse_pub_date("Tue, 10 Jun 2003 09:00:00 GMT").unwrap();
/// assert_eq!(primary, fallback);
/// assert!(parse_pub_date("yesterday").is_none());
/// ```
pub fn parse_pub_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let body = raw.split_once(',').map_or(raw, |(_, rest)| rest.trim());

    if let Ok(dt) = DateTime::parse_from_str(body, RFC1123Z_BODY) {
        return Some(dt.with_timezone(&Utc));
    }

    let (stamp, zone) = body.rsplit_once(' ')?;
    let offset = zone_offset(zone)?;
    let naive = NaiveDateTime::parse_from_str(stamp.trim(), RFC1123_BODY).ok()?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Offset for an RFC 1123 zone abbreviation.
///
/// Abbreviations outside the RFC 822 set are read as UTC; a token that is not
/// alphabetic at all is not a zone.
fn zone_offset(zone: &str) -> Option<FixedOffset> {
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let hours = match zone.to_ascii_uppercase().as_str() {
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    };
    FixedOffset::east_opt(hours * 3600)
}
