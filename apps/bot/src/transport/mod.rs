//! Chat platform boundary. The core only calls out through [`ChatTransport`];
//! every outbound send is best-effort from the workflows' point of view.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// One inbound update from the platform's long-poll endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub from: Option<Sender>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
    /// "private", "group" or "supergroup".
    #[serde(rename = "type")]
    pub kind: String,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.kind == "private"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

impl Sender {
    /// Best display name the platform gives us for unregistered users.
    pub fn display_name(&self) -> String {
        self.username
            .clone()
            .or_else(|| self.first_name.clone())
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub from: Sender,
    pub data: Option<String>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends a text message; returns the platform message id.
    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<i64>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()>;

    async fn pin_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()>;

    async fn unpin_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()>;

    /// Long-polls for updates past `offset`.
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> anyhow::Result<Vec<Update>>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// Bot-token HTTP implementation of the platform API.
pub struct HttpChatTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpChatTransport {
    pub fn new(api_base: &str, bot_token: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(75))
                .build()
                .expect("Failed to build HTTP client"),
            base: format!("{}/bot{}", api_base.trim_end_matches('/'), bot_token),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> anyhow::Result<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.base, method))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("chat API {method} returned {status}: {text}");
        }

        let envelope: ApiEnvelope<T> = response.json().await?;
        if !envelope.ok {
            anyhow::bail!(
                "chat API {method} failed: {}",
                envelope.description.unwrap_or_else(|| "unknown error".to_string())
            );
        }
        envelope
            .result
            .ok_or_else(|| anyhow::anyhow!("chat API {method} returned no result"))
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send_message(&self, chat_id: i64, text: &str) -> anyhow::Result<i64> {
        let sent: SentMessage = self
            .call("sendMessage", json!({ "chat_id": chat_id, "text": text }))
            .await?;
        Ok(sent.message_id)
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()> {
        self.call::<bool>(
            "deleteMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn pin_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()> {
        self.call::<bool>(
            "pinChatMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn unpin_message(&self, chat_id: i64, message_id: i64) -> anyhow::Result<()> {
        self.call::<bool>(
            "unpinChatMessage",
            json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await?;
        Ok(())
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> anyhow::Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({ "offset": offset, "timeout": timeout_secs }),
        )
        .await
    }
}

/// Best-effort DM sender. A failed notification is logged and dropped; the
/// ledger mutation it follows has already committed and stays committed.
#[derive(Clone)]
pub struct Notifier {
    transport: Arc<dyn ChatTransport>,
}

impl Notifier {
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self { transport }
    }

    /// Direct messages use the user id as the chat id.
    pub async fn notify(&self, user_id: i64, text: &str) {
        if let Err(e) = self.transport.send_message(user_id, text).await {
            warn!("notification to {user_id} dropped: {e}");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;

    #[tokio::test]
    async fn test_notifier_swallows_send_failures() {
        let transport = Arc::new(RecordingTransport {
            fail_sends: true,
            ..Default::default()
        });
        let notifier = Notifier::new(transport.clone());

        // Must not panic or propagate.
        notifier.notify(42, "you earned a badge").await;
        assert!(transport.sent.lock().expect("lock").is_empty());
    }

    #[test]
    fn test_update_deserialization() {
        let raw = r#"{
            "update_id": 7,
            "message": {
                "message_id": 1,
                "chat": { "id": -100, "type": "supergroup" },
                "from": { "id": 5, "username": "alice" },
                "text": "/points"
            }
        }"#;
        let update: Update = serde_json::from_str(raw).expect("parse");
        assert_eq!(update.update_id, 7);
        let message = update.message.expect("message");
        assert!(!message.chat.is_private());
        assert_eq!(message.from.expect("from").display_name(), "alice");
    }
}
