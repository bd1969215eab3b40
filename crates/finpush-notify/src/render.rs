//! Rendering of message sections into channel markup.

use finpush_common::types::{NotificationMessage, Section};

/// Maximum length for response/request body snippets kept in attempt records.
pub const MAX_BODY_SNIPPET: usize = 4000;

/// Render sections as markdown for chat-card channels.
///
/// An empty section list renders as an empty string; the message is still
/// sent so that delivery gaps stay visible.
pub fn render_markdown(message: &NotificationMessage) -> String {
    let mut parts = Vec::new();
    for section in &message.sections {
        match section {
            Section::Text { content } => parts.push(content.clone()),
            Section::Table { rows } => {
                let lines: Vec<String> = rows
                    .iter()
                    .map(|(key, value)| format!("**{key}**: {value}"))
                    .collect();
                parts.push(lines.join("\n"));
            }
            Section::Links { links } => {
                let lines: Vec<String> = links
                    .iter()
                    .map(|link| format!("[{}]({})", link.label, link.url))
                    .collect();
                parts.push(lines.join("\n"));
            }
        }
    }
    parts.join("\n\n")
}

/// Render sections as plain text for email bodies and text-only APIs.
pub fn render_plain(message: &NotificationMessage) -> String {
    let mut parts = Vec::new();
    for section in &message.sections {
        match section {
            Section::Text { content } => parts.push(content.clone()),
            Section::Table { rows } => {
                let lines: Vec<String> = rows
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect();
                parts.push(lines.join("\n"));
            }
            Section::Links { links } => {
                let lines: Vec<String> = links
                    .iter()
                    .map(|link| format!("{}: {}", link.label, link.url))
                    .collect();
                parts.push(lines.join("\n"));
            }
        }
    }
    parts.join("\n\n")
}

/// Truncate to at most `max_bytes` bytes, snapping back to a char boundary so
/// multi-byte content never splits, and appending a visible marker.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [truncated]", &s[..end])
}

/// Truncate to at most `max_chars` characters, reserving room for the marker.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    const MARKER: &str = "\n... [truncated]";
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(MARKER.chars().count());
    let truncated: String = s.chars().take(keep).collect();
    format!("{truncated}{MARKER}")
}
