//! Text-generation backends.

mod openrouter;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::session::Turn;

pub use openrouter::OpenRouterBackend;

/// A chat message as sent to a chat-completions API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.content.clone(),
        }
    }
}

/// Build the message list for a request: the system instruction followed
/// by the conversation context.
pub fn build_messages(system_prompt: &str, context: &[Turn]) -> Vec<ChatMessage> {
    std::iter::once(ChatMessage::system(system_prompt))
        .chain(context.iter().map(ChatMessage::from))
        .collect()
}

/// Trait for generation backends.
///
/// Implementations make one attempt per call; the caller decides what a
/// failure means for the conversation.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Produce a reply for the given messages.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_messages_prefixes_system_prompt() {
        let context = vec![Turn::user("hi"), Turn::assistant("hello"), Turn::user("bye")];

        let messages = build_messages("be brief", &context);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], ChatMessage::system("be brief"));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].content, "bye");
    }
}
