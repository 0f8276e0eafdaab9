//! DAV XML bodies and multistatus parsing
//!
//! Namespaces in play: `DAV:` (d), `urn:ietf:params:xml:ns:caldav` (cal)
//! and `http://apple.com/ns/ical/` (ical) for the calendar color.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

use crate::error::{CalDavError, CalDavResult};

/// PROPFIND body listing event etags (Depth: 1)
pub static PROPFIND_ETAG_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop><d:getetag/></d:prop>
</d:propfind>
"#;

/// PROPFIND body probing calendar color and timezone (Depth: 0)
pub static PROPFIND_CALENDAR_PROPS_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:ical="http://apple.com/ns/ical/" xmlns:cal="urn:ietf:params:xml:ns:caldav">
  <d:prop><ical:calendar-color/><cal:calendar-timezone/></d:prop>
</d:propfind>
"#;

fn write_error(err: impl std::fmt::Display) -> CalDavError {
    CalDavError::Xml(format!("XML write error: {err}"))
}

/// REPORT body for an RFC 6578 sync-collection round
pub fn sync_collection_body(sync_token: Option<&str>) -> CalDavResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(write_error)?;

    let mut root = BytesStart::new("d:sync-collection");
    root.push_attribute(("xmlns:d", "DAV:"));
    root.push_attribute(("xmlns:cal", "urn:ietf:params:xml:ns:caldav"));
    writer.write_event(Event::Start(root)).map_err(write_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("d:sync-level")))
        .map_err(write_error)?;
    writer
        .write_event(Event::Text(BytesText::new("1")))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("d:sync-level")))
        .map_err(write_error)?;

    if let Some(token) = sync_token {
        writer
            .write_event(Event::Start(BytesStart::new("d:sync-token")))
            .map_err(write_error)?;
        writer
            .write_event(Event::Text(BytesText::new(token)))
            .map_err(write_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("d:sync-token")))
            .map_err(write_error)?;
    }

    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .map_err(write_error)?;
    writer
        .write_event(Event::Empty(BytesStart::new("d:getetag")))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .map_err(write_error)?;

    writer
        .write_event(Event::End(BytesEnd::new("d:sync-collection")))
        .map_err(write_error)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|err| CalDavError::Xml(format!("UTF-8 error: {err}")))
}

/// PROPPATCH body enforcing the Apple calendar color
pub fn proppatch_color_body(apple_color: &str) -> CalDavResult<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(write_error)?;

    let mut root = BytesStart::new("d:propertyupdate");
    root.push_attribute(("xmlns:d", "DAV:"));
    root.push_attribute(("xmlns:ical", "http://apple.com/ns/ical/"));
    writer.write_event(Event::Start(root)).map_err(write_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("d:set")))
        .map_err(write_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("d:prop")))
        .map_err(write_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("ical:calendar-color")))
        .map_err(write_error)?;
    writer
        .write_event(Event::Text(BytesText::new(apple_color)))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("ical:calendar-color")))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("d:prop")))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("d:set")))
        .map_err(write_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("d:propertyupdate")))
        .map_err(write_error)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|err| CalDavError::Xml(format!("UTF-8 error: {err}")))
}

/// One `<d:response>` worth of multistatus data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResponse {
    pub href: String,
    pub etag: Option<String>,
    pub status: Option<String>,
}

impl DavResponse {
    /// Tombstone responses carry a 404 status instead of properties
    pub fn is_deleted(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|status| status.contains(" 404") || status.contains("Not Found"))
    }
}

/// Parsed `<d:multistatus>` document
#[derive(Debug, Clone, Default)]
pub struct MultiStatus {
    pub responses: Vec<DavResponse>,
    /// Top-level sync token (REPORT responses only)
    pub sync_token: Option<String>,
}

/// Parse a multistatus body from PROPFIND or REPORT
pub fn parse_multistatus(xml_body: &str) -> CalDavResult<MultiStatus> {
    let mut reader = Reader::from_str(xml_body);

    let mut result = MultiStatus::default();
    let mut current: Option<DavResponse> = None;
    let mut in_href = false;
    let mut in_etag = false;
    let mut in_status = false;
    let mut in_sync_token = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local_name = e.local_name();
                let name = std::str::from_utf8(local_name.as_ref()).unwrap_or("");
                match name {
                    "response" => current = Some(DavResponse::default()),
                    "href" => in_href = true,
                    "getetag" => in_etag = true,
                    "status" => in_status = true,
                    // The new token lives at the multistatus level
                    "sync-token" if current.is_none() => in_sync_token = true,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = std::str::from_utf8(e.as_ref()).unwrap_or("").trim();
                if text.is_empty() {
                    continue;
                }
                if in_sync_token {
                    result.sync_token = Some(text.to_string());
                } else if let Some(response) = current.as_mut() {
                    if in_href {
                        response.href = text.to_string();
                    } else if in_etag {
                        response.etag = Some(text.to_string());
                    } else if in_status {
                        response.status = Some(text.to_string());
                    }
                }
            }
            Ok(Event::End(e)) => {
                let local_name = e.local_name();
                let name = std::str::from_utf8(local_name.as_ref()).unwrap_or("");
                match name {
                    "response" => {
                        if let Some(response) = current.take() {
                            if !response.href.is_empty() {
                                result.responses.push(response);
                            }
                        }
                    }
                    "href" => in_href = false,
                    "getetag" => in_etag = false,
                    "status" => in_status = false,
                    "sync-token" => in_sync_token = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(Event::DocType(_)) => {
                return Err(CalDavError::Xml("DTD not allowed".to_string()));
            }
            Err(err) => {
                return Err(CalDavError::Xml(format!("XML parse error: {err}")));
            }
            _ => {}
        }
    }

    Ok(result)
}

/// Extract calendar color and timezone name from a properties PROPFIND
pub fn parse_calendar_props(xml_body: &str) -> (Option<String>, Option<String>) {
    let mut reader = Reader::from_str(xml_body);
    let mut color = None;
    let mut timezone_payload: Option<String> = None;
    let mut in_color = false;
    let mut in_timezone = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let local_name = e.local_name();
                match std::str::from_utf8(local_name.as_ref()).unwrap_or("") {
                    "calendar-color" => in_color = true,
                    "calendar-timezone" => in_timezone = true,
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let text = std::str::from_utf8(e.as_ref()).unwrap_or("").trim();
                if text.is_empty() {
                    continue;
                }
                if in_color {
                    color = Some(text.to_string());
                } else if in_timezone {
                    timezone_payload = Some(text.to_string());
                }
            }
            Ok(Event::End(e)) => {
                let local_name = e.local_name();
                match std::str::from_utf8(local_name.as_ref()).unwrap_or("") {
                    "calendar-color" => in_color = false,
                    "calendar-timezone" => in_timezone = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    let timezone = timezone_payload.as_deref().and_then(parse_calendar_timezone);
    (color, timezone)
}

/// Pull the TZID (or X-WR-TIMEZONE) out of a VTIMEZONE payload
pub fn parse_calendar_timezone(payload: &str) -> Option<String> {
    for line in payload.lines() {
        let line = line.trim();
        for prefix in ["TZID", "X-WR-TIMEZONE"] {
            if let Some(rest) = line.strip_prefix(prefix) {
                // Allow parameterized forms like TZID;X=Y:Zone
                if let Some((_, value)) = rest.split_once(':') {
                    let value = value.trim();
                    if !value.is_empty() {
                        return Some(value.to_string());
                    }
                }
            }
        }
    }
    None
}
