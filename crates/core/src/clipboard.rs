use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClipboardError {
    #[error("no clipboard tool available on this system")]
    Unavailable,
    #[error("clipboard command `{command}` failed: {message}")]
    Command { command: String, message: String },
}

/// One-shot clipboard read, always performed off the UI thread.
#[async_trait]
pub trait ClipboardReader: std::fmt::Debug + Send + Sync {
    async fn read_text(&self) -> Result<String, ClipboardError>;
}

/// Trims clipboard text and drops one pair of brackets or quotes that wraps
/// all of it, as copied from a JSON array, a quoted string or similar.
#[must_use]
pub fn clean_clipboard_text(text: &str) -> &str {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return trimmed;
    };
    let inner = chars.as_str();
    let wraps = match (first, last) {
        ('[', ']') | ('(', ')') | ('{', '}') => closes_at_end(inner, first, last),
        ('"', '"') | ('\'', '\'') | ('`', '`') => !inner.contains(first),
        _ => false,
    };
    if wraps {
        inner.trim()
    } else {
        trimmed
    }
}

/// True when no closing bracket in `inner` matches the opening one, so the
/// outer pair belongs together.
fn closes_at_end(inner: &str, open: char, close: char) -> bool {
    let mut depth = 0_usize;
    for ch in inner.chars() {
        if ch == open {
            depth += 1;
        } else if ch == close {
            match depth.checked_sub(1) {
                Some(next) => depth = next,
                None => return false,
            }
        }
    }
    depth == 0
}
