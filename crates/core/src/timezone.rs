//! Timezone handling utilities
//!
//! Provides functions for parsing IANA timezones and resolving the zone
//! used to anchor date-only (floating) values.

use chrono_tz::Tz;

use crate::error::{SyncError, SyncResult};

/// Parse an IANA timezone string (e.g., "Asia/Singapore", "Europe/London")
pub fn parse_timezone(tz_str: &str) -> SyncResult<Tz> {
    tz_str
        .parse::<Tz>()
        .map_err(|_| SyncError::InvalidTimezone(tz_str.to_string()))
}

/// Validate that a timezone string is valid
pub fn validate_timezone(tz_str: &str) -> SyncResult<()> {
    parse_timezone(tz_str)?;
    Ok(())
}

/// Resolve the timezone used for date-only values.
///
/// Preference order: the explicit `date_only_timezone` override, then the
/// calendar's own timezone, then UTC. Unparseable names fall through to
/// the next candidate.
pub fn resolve_date_only_tz(
    date_only_timezone: Option<&str>,
    calendar_timezone: Option<&str>,
) -> Tz {
    for candidate in [date_only_timezone, calendar_timezone].into_iter().flatten() {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Ok(tz) = parse_timezone(trimmed) {
            return tz;
        }
        tracing::warn!("ignoring unknown timezone {trimmed:?}");
    }
    Tz::UTC
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timezone_valid() {
        let tz = parse_timezone("America/New_York");
        assert!(tz.is_ok());
        assert_eq!(tz.unwrap().name(), "America/New_York");
    }

    #[test]
    fn test_parse_timezone_invalid() {
        let tz = parse_timezone("Invalid/Timezone");
        match tz {
            Err(SyncError::InvalidTimezone(s)) => assert_eq!(s, "Invalid/Timezone"),
            _ => panic!("Expected InvalidTimezone error"),
        }
    }

    #[test]
    fn test_resolve_prefers_override() {
        let tz = resolve_date_only_tz(Some("Asia/Shanghai"), Some("Europe/London"));
        assert_eq!(tz.name(), "Asia/Shanghai");
    }

    #[test]
    fn test_resolve_falls_back_to_calendar_then_utc() {
        let tz = resolve_date_only_tz(None, Some("Europe/London"));
        assert_eq!(tz.name(), "Europe/London");

        let tz = resolve_date_only_tz(Some("Nowhere/Nothing"), None);
        assert_eq!(tz.name(), "UTC");

        let tz = resolve_date_only_tz(Some("  "), None);
        assert_eq!(tz.name(), "UTC");
    }
}
