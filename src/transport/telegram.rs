//! Telegram Bot API transport.
//!
//! Long-polls `getUpdates` for inbound text and sends replies with
//! `sendMessage`.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{InboundMessage, Transport};
use crate::config::TelegramConfig;
use crate::error::{RelayError, Result};
use crate::user::{ChatId, UserId};

/// Wait before polling again after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Commands advertised in the Telegram client menu.
const BOT_COMMANDS: &[(&str, &str)] = &[
    ("start", "Show the welcome message"),
    ("reset", "Clear your conversation history"),
    ("help", "Show usage and limits"),
];

/// Telegram transport.
pub struct TelegramTransport {
    client: Client,
    token: String,
    api_base: String,
    poll_timeout_secs: u64,
}

/// Envelope of every Bot API response.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    id: i64,
    #[serde(default)]
    is_bot: bool,
}

#[derive(Debug, Serialize)]
struct BotCommand<'a> {
    command: &'a str,
    description: &'a str,
}

impl TelegramTransport {
    /// Create a transport from configuration.
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .ok_or_else(|| RelayError::Config("Telegram token is not set".to_string()))?;

        // The long poll holds the request open for poll_timeout_secs
        let client = Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            client,
            token,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.client.post(self.api_url(method)).json(body).send().await?;
        let status = response.status();

        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            RelayError::Transport(format!("{} returned unreadable body ({}): {}", method, status, e))
        })?;

        if !envelope.ok {
            return Err(RelayError::Transport(format!(
                "{} failed ({}): {}",
                method,
                status,
                envelope.description.unwrap_or_default()
            )));
        }

        envelope
            .result
            .ok_or_else(|| RelayError::Transport(format!("{} returned no result", method)))
    }

    /// Advertise the bot's commands to Telegram clients.
    pub async fn register_commands(&self) -> Result<()> {
        let commands: Vec<BotCommand<'_>> = BOT_COMMANDS
            .iter()
            .map(|&(command, description)| BotCommand {
                command,
                description,
            })
            .collect();

        let _: bool = self
            .call("setMyCommands", &serde_json::json!({ "commands": commands }))
            .await?;

        info!(count = commands.len(), "Registered bot commands");
        Ok(())
    }

    /// Fetch one batch of updates starting at `offset`.
    ///
    /// Returns the inbound text messages and the offset to poll with next.
    pub async fn fetch_updates(&self, offset: i64) -> Result<(Vec<InboundMessage>, i64)> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });

        let updates: Vec<Update> = self.call("getUpdates", &body).await?;

        let mut next_offset = offset;
        let mut messages = Vec::with_capacity(updates.len());
        for update in updates {
            next_offset = next_offset.max(update.update_id + 1);
            if let Some(message) = update.message.and_then(into_inbound) {
                messages.push(message);
            }
        }

        Ok((messages, next_offset))
    }

    /// Poll for updates until the receiving side of `tx` is dropped.
    pub async fn run(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let mut offset = 0;

        info!("Telegram transport polling for messages");

        loop {
            let (messages, next_offset) = match self.fetch_updates(offset).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "Telegram poll failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                }
            };
            offset = next_offset;

            for message in messages {
                debug!(user = %message.user, chat = %message.chat, "Message received");
                if tx.send(message).await.is_err() {
                    info!("Dispatcher closed, stopping Telegram polling");
                    return Ok(());
                }
            }
        }
    }
}

fn into_inbound(message: Message) -> Option<InboundMessage> {
    let from = message.from?;
    if from.is_bot {
        return None;
    }
    let text = message.text?;

    Some(InboundMessage {
        user: UserId(from.id),
        chat: ChatId(message.chat.id),
        text,
    })
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<()> {
        let body = serde_json::json!({
            "chat_id": chat.0,
            "text": text,
        });

        let _: serde_json::Value = self.call("sendMessage", &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_transport(api_base: &str) -> TelegramTransport {
        let config = TelegramConfig {
            token: Some("123:abc".to_string()),
            api_base: api_base.to_string(),
            poll_timeout_secs: 0,
            ..TelegramConfig::default()
        };
        TelegramTransport::new(&config).unwrap()
    }

    #[test]
    fn test_transport_requires_token() {
        assert!(matches!(
            TelegramTransport::new(&TelegramConfig::default()),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_api_url() {
        let transport = test_transport("https://api.telegram.org/");
        assert_eq!(
            transport.api_url("getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );
    }

    #[tokio::test]
    async fn test_fetch_updates_keeps_text_from_users() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/getUpdates"))
            .and(body_partial_json(serde_json::json!({ "offset": 7 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": [
                    {"update_id": 7, "message": {"chat": {"id": 55}, "from": {"id": 5, "is_bot": false}, "text": "hi"}},
                    {"update_id": 8, "message": {"chat": {"id": 55}, "from": {"id": 5, "is_bot": false}}},
                    {"update_id": 9, "message": {"chat": {"id": 66}, "from": {"id": 6, "is_bot": true}, "text": "beep"}},
                    {"update_id": 10}
                ]
            })))
            .mount(&server)
            .await;

        let transport = test_transport(&server.uri());
        let (messages, next_offset) = transport.fetch_updates(7).await.unwrap();

        assert_eq!(next_offset, 11);
        assert_eq!(
            messages,
            vec![InboundMessage {
                user: UserId(5),
                chat: ChatId(55),
                text: "hi".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_send_text_posts_plain_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({ "chat_id": 55, "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": {"message_id": 1}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = test_transport(&server.uri());
        transport.send_text(ChatId(55), "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_api_error_surfaces_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let transport = test_transport(&server.uri());
        let err = transport.send_text(ChatId(1), "x").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_ok_response_without_result_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })),
            )
            .mount(&server)
            .await;

        let transport = test_transport(&server.uri());
        let err = transport.fetch_updates(0).await.unwrap_err();
        assert!(err.to_string().contains("getUpdates returned no result"));
    }

    #[tokio::test]
    async fn test_register_commands() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/setMyCommands"))
            .and(body_partial_json(serde_json::json!({
                "commands": [{"command": "start"}, {"command": "reset"}, {"command": "help"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "result": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport = test_transport(&server.uri());
        transport.register_commands().await.unwrap();
    }
}
