//! CalDAV client operations
//!
//! Everything is addressed by href: the calendar collection for listing
//! and delta rounds, individual `<id>.ics` resources for writes. The
//! delta path downgrades to a full PROPFIND listing whenever the server
//! rejects or exhausts the sync token.

use reqwest::StatusCode;
use url::Url;

use crate::config::CalDavConfig;
use crate::error::{CalDavError, CalDavResult};
use crate::http::{dav_method, HttpClient};
use crate::xml;

/// Event resource metadata from a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRef {
    pub href: String,
    pub etag: Option<String>,
    /// Page id recovered from the resource name, when it is one of ours
    pub notion_id: Option<String>,
}

/// Event resource with its iCalendar payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    pub href: String,
    pub etag: Option<String>,
    pub ics: String,
}

/// Result of one delta listing round
#[derive(Debug, Clone, Default)]
pub struct EventDelta {
    /// New RFC 6578 token; `None` when the full-listing fallback ran
    pub next_token: Option<String>,
    pub changed: Vec<RemoteEvent>,
    pub deleted_hrefs: Vec<String>,
}

/// Outcome of a sync-collection REPORT
#[derive(Debug, Clone)]
pub enum DeltaOutcome {
    Fresh {
        next_token: Option<String>,
        changed: Vec<EventRef>,
        deleted: Vec<String>,
    },
    /// Server rejected the token (404/412); caller should do a full listing
    Stale,
}

/// Page id encoded in an event resource name (`<id>.ics`)
pub fn notion_id_from_href(href: &str) -> Option<String> {
    let last = href.trim_end_matches('/').rsplit('/').next()?;
    last.strip_suffix(".ics")
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
}

/// Normalize a calendar color to `#RRGGBB`
pub fn normalize_calendar_color(color: &str) -> Option<String> {
    let candidate = color.trim();
    if candidate.is_empty() {
        return None;
    }
    let hex_part = candidate.strip_prefix('#').unwrap_or(candidate);
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match hex_part.len() {
        6 => Some(format!("#{}", hex_part.to_uppercase())),
        // Apple appends an alpha byte; drop it
        8 => Some(format!("#{}", hex_part[..6].to_uppercase())),
        _ => None,
    }
}

/// Apple's property form of a calendar color (`#RRGGBBFF`)
fn apple_calendar_color(color: &str) -> Option<String> {
    normalize_calendar_color(color).map(|normalized| format!("{normalized}FF"))
}

fn collection_target(calendar_href: &str) -> String {
    if calendar_href.ends_with('/') {
        calendar_href.to_string()
    } else {
        format!("{calendar_href}/")
    }
}

fn resolve_href(base: &str, href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    match Url::parse(base).and_then(|base| base.join(href)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Client for one CalDAV account
#[derive(Debug, Clone)]
pub struct CalDavClient {
    http: HttpClient,
}

impl CalDavClient {
    pub fn new(config: CalDavConfig) -> CalDavResult<Self> {
        Ok(Self { http: HttpClient::new(config)? })
    }

    /// Write an event resource, returning the server's ETag when present.
    ///
    /// A 409/412 triggers one retry against the freshly fetched etag.
    pub async fn put_event(
        &self,
        event_url: &str,
        ics: &str,
        etag: Option<&str>,
    ) -> CalDavResult<Option<String>> {
        let resp = self.send_put(event_url, ics, etag).await?;
        if !matches!(
            resp.status(),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED
        ) {
            return if resp.status().is_success() {
                Ok(HttpClient::response_etag(&resp))
            } else {
                Err(HttpClient::error_for_status(resp).await)
            };
        }

        tracing::debug!("PUT conflict on {event_url}; refetching etag and retrying once");
        let fresh = self.current_etag(event_url).await.unwrap_or_default();
        let retry = self.send_put(event_url, ics, fresh.as_deref()).await?;
        if retry.status().is_success() {
            Ok(HttpClient::response_etag(&retry))
        } else if matches!(
            retry.status(),
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED
        ) {
            Err(CalDavError::Conflict(event_url.to_string()))
        } else {
            Err(HttpClient::error_for_status(retry).await)
        }
    }

    async fn send_put(
        &self,
        event_url: &str,
        ics: &str,
        etag: Option<&str>,
    ) -> CalDavResult<reqwest::Response> {
        let mut request = self
            .http
            .request(reqwest::Method::PUT, event_url)
            .header("Content-Type", "text/calendar; charset=\"utf-8\"")
            .body(ics.to_string());
        if let Some(etag) = etag {
            request = request.header("If-Match", etag);
        }
        Ok(request.send().await?)
    }

    /// Delete an event resource; an already-missing resource is success
    pub async fn delete_event(&self, event_url: &str) -> CalDavResult<()> {
        let resp = self
            .http
            .request(reqwest::Method::DELETE, event_url)
            .send()
            .await?;
        if resp.status().is_success() || resp.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(HttpClient::error_for_status(resp).await)
        }
    }

    /// Current etag of a single resource via a Depth 0 PROPFIND
    async fn current_etag(&self, event_url: &str) -> CalDavResult<Option<String>> {
        let resp = self
            .http
            .request(dav_method("PROPFIND"), event_url)
            .header("Depth", "0")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(xml::PROPFIND_ETAG_BODY)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let body = resp.text().await?;
        let parsed = xml::parse_multistatus(&body)?;
        Ok(parsed.responses.into_iter().find_map(|response| response.etag))
    }

    /// Full event listing via PROPFIND Depth 1
    pub async fn list_events(&self, calendar_href: &str) -> CalDavResult<Vec<EventRef>> {
        let target = collection_target(calendar_href);
        let resp = self
            .http
            .request(dav_method("PROPFIND"), &target)
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(xml::PROPFIND_ETAG_BODY)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(HttpClient::error_for_status(resp).await);
        }
        let body = resp.text().await?;
        let parsed = xml::parse_multistatus(&body)?;
        Ok(parsed
            .responses
            .into_iter()
            .filter(|response| response.href.to_lowercase().ends_with(".ics"))
            .map(|response| EventRef {
                notion_id: notion_id_from_href(&response.href),
                href: resolve_href(&target, &response.href),
                etag: response.etag,
            })
            .collect())
    }

    /// One RFC 6578 sync-collection round
    pub async fn report_sync_collection(
        &self,
        calendar_href: &str,
        sync_token: Option<&str>,
    ) -> CalDavResult<DeltaOutcome> {
        let target = collection_target(calendar_href);
        let body = xml::sync_collection_body(sync_token)?;
        let resp = self
            .http
            .request(dav_method("REPORT"), &target)
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body)
            .send()
            .await?;
        if matches!(
            resp.status(),
            StatusCode::NOT_FOUND | StatusCode::PRECONDITION_FAILED
        ) {
            return Ok(DeltaOutcome::Stale);
        }
        if !resp.status().is_success() {
            return Err(HttpClient::error_for_status(resp).await);
        }

        let body = resp.text().await?;
        let parsed = xml::parse_multistatus(&body)?;
        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for response in parsed.responses {
            let href = resolve_href(&target, &response.href);
            if response.is_deleted() {
                deleted.push(href);
            } else {
                changed.push(EventRef {
                    notion_id: notion_id_from_href(&href),
                    href,
                    etag: response.etag,
                });
            }
        }
        Ok(DeltaOutcome::Fresh { next_token: parsed.sync_token, changed, deleted })
    }

    /// Fetch one event resource body
    pub async fn fetch_ics(&self, href: &str) -> CalDavResult<String> {
        let resp = self.http.request(reqwest::Method::GET, href).send().await?;
        if !resp.status().is_success() {
            return Err(HttpClient::error_for_status(resp).await);
        }
        Ok(resp.text().await?)
    }

    async fn fetch_ics_bulk(&self, refs: Vec<EventRef>) -> Vec<RemoteEvent> {
        let mut events = Vec::with_capacity(refs.len());
        for event_ref in refs {
            match self.fetch_ics(&event_ref.href).await {
                Ok(ics) => events.push(RemoteEvent {
                    href: event_ref.href,
                    etag: event_ref.etag,
                    ics,
                }),
                Err(err) => {
                    tracing::warn!("skipping {}: {err}", event_ref.href);
                }
            }
        }
        events
    }

    /// Delta listing with full-listing fallback.
    ///
    /// With a token, tries the REPORT first; a stale token or an empty
    /// response downgrades to PROPFIND, which also serves the initial
    /// sync. Changed resources come back with their payloads.
    pub async fn list_events_delta(
        &self,
        calendar_href: &str,
        sync_token: Option<&str>,
    ) -> CalDavResult<EventDelta> {
        if let Some(token) = sync_token {
            match self.report_sync_collection(calendar_href, Some(token)).await? {
                DeltaOutcome::Fresh { next_token, changed, deleted }
                    if next_token.is_some() || !changed.is_empty() || !deleted.is_empty() =>
                {
                    let changed = self.fetch_ics_bulk(changed).await;
                    return Ok(EventDelta { next_token, changed, deleted_hrefs: deleted });
                }
                DeltaOutcome::Fresh { .. } => {
                    tracing::info!("sync-collection returned nothing; listing in full");
                }
                DeltaOutcome::Stale => {
                    tracing::info!("sync token rejected; listing in full");
                }
            }
        }
        let refs = self.list_events(calendar_href).await?;
        let changed = self.fetch_ics_bulk(refs).await;
        Ok(EventDelta { next_token: None, changed, deleted_hrefs: Vec::new() })
    }

    /// Depth 0 PROPFIND used as a connectivity probe
    pub async fn ping(&self, calendar_href: &str) -> CalDavResult<()> {
        let resp = self
            .http
            .request(dav_method("PROPFIND"), &collection_target(calendar_href))
            .header("Depth", "0")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(xml::PROPFIND_ETAG_BODY)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(HttpClient::error_for_status(resp).await)
        }
    }

    /// Probe the collection for its display color and timezone
    pub async fn fetch_calendar_properties(
        &self,
        calendar_href: &str,
    ) -> CalDavResult<(Option<String>, Option<String>)> {
        let resp = self
            .http
            .request(dav_method("PROPFIND"), &collection_target(calendar_href))
            .header("Depth", "0")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(xml::PROPFIND_CALENDAR_PROPS_BODY)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok((None, None));
        }
        let body = resp.text().await?;
        let (raw_color, timezone) = xml::parse_calendar_props(&body);
        let color = raw_color.as_deref().and_then(normalize_calendar_color);
        Ok((color, timezone))
    }

    /// PROPPATCH the collection color; returns the normalized value applied
    pub async fn apply_calendar_color(
        &self,
        calendar_href: &str,
        color: &str,
    ) -> CalDavResult<Option<String>> {
        let Some(apple_color) = apple_calendar_color(color) else {
            return Ok(None);
        };
        let body = xml::proppatch_color_body(&apple_color)?;
        let resp = self
            .http
            .request(dav_method("PROPPATCH"), &collection_target(calendar_href))
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(HttpClient::error_for_status(resp).await);
        }
        Ok(normalize_calendar_color(color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notion_id_from_href() {
        assert_eq!(
            notion_id_from_href("https://cal/home/abc-123.ics").as_deref(),
            Some("abc-123")
        );
        assert_eq!(notion_id_from_href("/cal/home/abc.ics").as_deref(), Some("abc"));
        assert_eq!(notion_id_from_href("/cal/home/"), None);
        assert_eq!(notion_id_from_href("/cal/home/.ics"), None);
    }

    #[test]
    fn test_normalize_calendar_color() {
        assert_eq!(normalize_calendar_color("#ff7f00").as_deref(), Some("#FF7F00"));
        assert_eq!(normalize_calendar_color("ff7f00").as_deref(), Some("#FF7F00"));
        assert_eq!(normalize_calendar_color("#FF7F00FF").as_deref(), Some("#FF7F00"));
        assert_eq!(normalize_calendar_color("#f70"), None);
        assert_eq!(normalize_calendar_color("  "), None);
        assert_eq!(normalize_calendar_color("not-a-color"), None);
    }

    #[test]
    fn test_resolve_href() {
        assert_eq!(
            resolve_href("https://cal.example.com/home/", "/home/x.ics"),
            "https://cal.example.com/home/x.ics"
        );
        assert_eq!(
            resolve_href("https://cal.example.com/home/", "https://other/x.ics"),
            "https://other/x.ics"
        );
    }
}
