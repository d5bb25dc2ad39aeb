//! Chat transports.

mod telegram;

use async_trait::async_trait;

use crate::error::Result;
use crate::user::{ChatId, UserId};

pub use telegram::TelegramTransport;

/// A text message received from a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user: UserId,
    pub chat: ChatId,
    pub text: String,
}

/// Trait for outbound delivery.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one text message. Callers keep `text` within the transport's size limit.
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()>;
}

/// Split `text` into segments of at most `max_chars` characters.
///
/// Segments end on a newline or space near the limit when one exists, and
/// never split a character. Whitespace at a break is dropped.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.chars().count() <= max_chars {
            chunks.push(remaining.to_string());
            break;
        }

        // Byte offset just past the max_chars-th character
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map(|(idx, _)| idx)
            .unwrap_or(remaining.len());
        let window = &remaining[..limit];

        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&pos| pos > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_message_short() {
        assert_eq!(split_message("Hello, World!", 4096), vec!["Hello, World!"]);
    }

    #[test]
    fn test_split_message_hard_break() {
        let msg = "x".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn test_split_message_prefers_whitespace() {
        let chunks = split_message("alpha beta gamma", 12);
        assert_eq!(chunks, vec!["alpha beta", "gamma"]);

        let chunks = split_message("one\ntwo three", 9);
        assert_eq!(chunks, vec!["one", "two three"]);
    }

    #[test]
    fn test_split_message_counts_characters() {
        let msg = "ж".repeat(10);
        let chunks = split_message(&msg, 4);
        assert_eq!(chunks, vec!["жжжж", "жжжж", "жж"]);
    }
}
