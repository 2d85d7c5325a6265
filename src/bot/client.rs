use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::reply::{Keyboard, Outbound};
use super::views::{MessageHandle, SessionViews};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram rejected {method}: {description}")]
    Rejected {
        method: &'static str,
        description: String,
    },
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Returns the id of the sent message.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, NotifyError>;

    async fn edit_message(
        &self,
        handle: MessageHandle,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), NotifyError>;

    async fn answer_callback(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), NotifyError>;
}

/// Bot API client over HTTPS.
pub struct TelegramClient {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Self {
        TelegramClient {
            http: reqwest::Client::new(),
            endpoint: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: serde_json::Value,
    ) -> Result<Option<T>, NotifyError> {
        let response: ApiResponse<T> = self
            .http
            .post(format!("{}/{}", self.endpoint, method))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        if !response.ok {
            return Err(NotifyError::Rejected {
                method,
                description: response.description.unwrap_or_default(),
            });
        }
        Ok(response.result)
    }
}

fn with_keyboard(mut body: serde_json::Value, keyboard: Option<&Keyboard>) -> serde_json::Value {
    if let Some(keyboard) = keyboard.filter(|k| !k.is_empty()) {
        body["reply_markup"] = json!(keyboard);
    }
    body
}

#[async_trait]
impl ChatClient for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, NotifyError> {
        let body = with_keyboard(json!({ "chat_id": chat_id, "text": text }), keyboard);
        let sent: Option<SentMessage> = self.call("sendMessage", body).await?;
        sent.map(|m| m.message_id)
            .ok_or_else(|| NotifyError::Rejected {
                method: "sendMessage",
                description: "response without message".to_string(),
            })
    }

    async fn edit_message(
        &self,
        handle: MessageHandle,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), NotifyError> {
        let body = with_keyboard(
            json!({
                "chat_id": handle.chat_id,
                "message_id": handle.message_id,
                "text": text,
            }),
            keyboard,
        );
        match self.call::<serde_json::Value>("editMessageText", body).await {
            Err(NotifyError::Rejected { description, .. })
                if description.contains("message is not modified") =>
            {
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    async fn answer_callback(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), NotifyError> {
        let mut body = json!({
            "callback_query_id": callback_query_id,
            "show_alert": show_alert,
        });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call::<serde_json::Value>("answerCallbackQuery", body)
            .await
            .map(|_| ())
    }
}

/// Performs every call in order. Failures are logged and skipped so one
/// unreachable chat never blocks the rest.
pub async fn deliver_all(client: &dyn ChatClient, views: &SessionViews, outbound: Vec<Outbound>) {
    for call in outbound {
        match call {
            Outbound::Send {
                chat_id,
                screen,
                track,
            } => {
                let keyboard = Some(&screen.keyboard);
                match client.send_message(chat_id, &screen.text, keyboard).await {
                    Ok(message_id) => {
                        if let Some((owner, kind)) = track {
                            let handle = MessageHandle {
                                chat_id,
                                message_id,
                            };
                            views.record(owner, kind, handle).await;
                        }
                    }
                    Err(e) => log::warn!("Failed to send message to {}: {}", chat_id, e),
                }
            }
            Outbound::Edit { handle, screen } => {
                if let Err(e) = client
                    .edit_message(handle, &screen.text, Some(&screen.keyboard))
                    .await
                {
                    log::warn!("Failed to edit message {:?}: {}", handle, e);
                }
            }
            Outbound::Answer {
                callback_query_id,
                text,
                show_alert,
            } => {
                if let Err(e) = client
                    .answer_callback(&callback_query_id, text.as_deref(), show_alert)
                    .await
                {
                    log::warn!("Failed to answer callback {}: {}", callback_query_id, e);
                }
            }
        }
    }
}
