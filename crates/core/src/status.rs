//! Canonical task statuses, alias normalization and the emoji codec
//!
//! Notion databases use free-form status names; the calendar summary
//! carries a one-glyph prefix instead. Both directions go through the
//! tables here.

use std::fmt;

/// Canonical status as it appears in event summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Overdue,
    Cancelled,
}

/// (canonical name, accepted aliases, summary emoji)
const STATUS_TABLE: &[(TaskStatus, &str, &[&str], &str)] = &[
    (TaskStatus::Todo, "Todo", &["To Do", "Not started"], "○ "),
    (TaskStatus::InProgress, "In progress", &["Pinned"], "⊖ "),
    (TaskStatus::Completed, "Completed", &["Done"], "✓⃝ "),
    (TaskStatus::Overdue, "Overdue", &[], "⊜ "),
    (TaskStatus::Cancelled, "Cancelled", &["Discarded"], "⊗ "),
];

impl TaskStatus {
    /// Canonical display name
    pub fn as_str(self) -> &'static str {
        STATUS_TABLE
            .iter()
            .find(|(status, ..)| *status == self)
            .map(|(_, name, ..)| *name)
            .unwrap_or("Todo")
    }

    /// Summary prefix (with its trailing separator space)
    pub fn emoji(self) -> &'static str {
        STATUS_TABLE
            .iter()
            .find(|(status, ..)| *status == self)
            .map(|(.., emoji)| *emoji)
            .unwrap_or("")
    }

    /// Match a canonical name or any of its aliases, case-insensitively
    pub fn from_name(name: &str) -> Option<Self> {
        let needle = name.trim().to_lowercase();
        STATUS_TABLE.iter().find_map(|(status, canonical, aliases, _)| {
            if canonical.to_lowercase() == needle
                || aliases.iter().any(|alias| alias.to_lowercase() == needle)
            {
                Some(*status)
            } else {
                None
            }
        })
    }

    /// Match a summary prefix glyph
    pub fn from_emoji(token: &str) -> Option<Self> {
        let needle = token.trim();
        if needle.is_empty() {
            return None;
        }
        STATUS_TABLE.iter().find_map(|(status, .., emoji)| {
            if emoji.trim() == needle { Some(*status) } else { None }
        })
    }

    /// The two states that can never become Overdue
    pub fn is_final(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonicalize a raw status name; unknown names pass through trimmed.
///
/// Unknown statuses are not an error: they still hash and round-trip,
/// they just have no emoji and match no Notion option on write.
pub fn normalize_status_name(status: &str) -> String {
    match TaskStatus::from_name(status) {
        Some(canonical) => canonical.as_str().to_string(),
        None => status.trim().to_string(),
    }
}

/// Emoji for a raw status name, empty when the status is unknown
pub fn status_to_emoji(status: &str) -> &'static str {
    TaskStatus::from_name(status).map(TaskStatus::emoji).unwrap_or("")
}

/// Strip a leading status emoji from a summary, returning the status and
/// the remaining title
pub fn split_summary_status(summary: &str) -> (Option<TaskStatus>, String) {
    let trimmed = summary.trim_start();
    for (status, .., emoji) in STATUS_TABLE {
        let glyph = emoji.trim();
        if let Some(rest) = trimmed.strip_prefix(glyph) {
            return (Some(*status), rest.trim_start().to_string());
        }
    }
    (None, trimmed.to_string())
}

/// Strip any leading emoji or status-word prefix a prior round trip could
/// have prepended to a title
pub fn clean_summary_title(title: &str) -> String {
    let (_, mut working) = split_summary_status(title);
    let lowered = working.to_lowercase();
    let mut prefixes: Vec<&str> = STATUS_TABLE
        .iter()
        .flat_map(|(_, canonical, aliases, _)| {
            std::iter::once(*canonical).chain(aliases.iter().copied())
        })
        .collect();
    // Longest first so "In progress" wins over a hypothetical "In"
    prefixes.sort_by_key(|prefix| std::cmp::Reverse(prefix.len()));
    for prefix in prefixes {
        if lowered.starts_with(&prefix.to_lowercase()) {
            let mut remainder = &working[prefix.len()..];
            while let Some(first) = remainder.chars().next() {
                if matches!(first, ' ' | '-' | '–' | '—' | ':' | '|') {
                    remainder = &remainder[first.len_utf8()..];
                } else {
                    break;
                }
            }
            working = remainder.to_string();
            break;
        }
    }
    working
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_known_aliases() {
        assert_eq!(normalize_status_name("Done"), "Completed");
        assert_eq!(normalize_status_name("not started"), "Todo");
        assert_eq!(normalize_status_name("PINNED"), "In progress");
        assert_eq!(normalize_status_name("Discarded"), "Cancelled");
        assert_eq!(normalize_status_name("overdue"), "Overdue");
    }

    #[test]
    fn test_normalize_unknown_passes_through() {
        assert_eq!(normalize_status_name("  Waiting on review "), "Waiting on review");
    }

    #[test]
    fn test_emoji_round_trip() {
        for status in [
            TaskStatus::Todo,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Overdue,
            TaskStatus::Cancelled,
        ] {
            assert_eq!(TaskStatus::from_emoji(status.emoji()), Some(status));
        }
    }

    #[test]
    fn test_status_to_emoji_unknown_is_empty() {
        assert_eq!(status_to_emoji("Someday"), "");
    }

    #[test]
    fn test_split_summary_status() {
        let (status, title) = split_summary_status("○ Buy milk");
        assert_eq!(status, Some(TaskStatus::Todo));
        assert_eq!(title, "Buy milk");

        let (status, title) = split_summary_status("Plain title");
        assert_eq!(status, None);
        assert_eq!(title, "Plain title");
    }

    #[test]
    fn test_clean_summary_title_strips_status_words() {
        assert_eq!(clean_summary_title("Todo: Buy milk"), "Buy milk");
        assert_eq!(clean_summary_title("In progress - Write report"), "Write report");
        assert_eq!(clean_summary_title("⊖ Done | Ship it"), "Ship it");
        assert_eq!(clean_summary_title("Plain title"), "Plain title");
    }
}
