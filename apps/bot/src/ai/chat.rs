//! Chat and summary flows plus the rolling group-message capture that feeds
//! the summary prompt.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};

use super::{clip_reply, LlmClient, LlmError};

const CHAT_SYSTEM: &str = "You are the assistant for a gig-work community of buzzers and \
influencers. Answer in a friendly, concise, practical tone. When asked about the community, \
explain that members earn points through jobs, referrals and promotions.";

const SUMMARY_SYSTEM: &str = "You summarize group-chat conversations. Focus on the main \
topics, key points and any decisions taken. Keep it short. If nothing significant happened, \
give a one-line general recap.";

/// Messages fed into one summary request.
const SUMMARY_WINDOW: i64 = 30;
/// Stored message bodies are clamped to this many chars on ingest.
const MAX_BODY_CHARS: usize = 500;

/// Answers a single user question. The reply is clipped to the display cap.
pub async fn answer(llm: &LlmClient, question: &str) -> Result<String, LlmError> {
    let reply = llm.generate(question, CHAT_SYSTEM).await?;
    Ok(clip_reply(&reply))
}

#[derive(Debug, Clone, FromRow)]
pub struct GroupMessage {
    pub username: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Captures one group message for later summarization. Bodies are clamped;
/// command messages are the caller's job to filter out.
pub async fn save_group_message(
    pool: &SqlitePool,
    chat_id: i64,
    user_id: i64,
    username: &str,
    body: &str,
    now: DateTime<Utc>,
) -> sqlx::Result<()> {
    let clamped: String = body.chars().take(MAX_BODY_CHARS).collect();
    sqlx::query(
        "INSERT INTO group_messages (chat_id, user_id, username, body, sent_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(username)
    .bind(clamped)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// The newest `limit` messages for a chat, oldest first so the transcript
/// reads chronologically.
pub async fn recent_group_messages(
    pool: &SqlitePool,
    chat_id: i64,
    limit: i64,
) -> sqlx::Result<Vec<GroupMessage>> {
    let mut rows: Vec<GroupMessage> = sqlx::query_as(
        "SELECT username, body, sent_at FROM group_messages \
         WHERE chat_id = ? ORDER BY id DESC LIMIT ?",
    )
    .bind(chat_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.reverse();
    Ok(rows)
}

#[derive(Debug)]
pub struct Summary {
    pub text: String,
    pub message_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    /// Nothing captured yet for this chat.
    #[error("no messages to summarize")]
    NothingToSummarize,

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// Summarizes the recent conversation of one group chat.
pub async fn summarize(
    pool: &SqlitePool,
    llm: &LlmClient,
    chat_id: i64,
) -> Result<Summary, SummaryError> {
    let messages = recent_group_messages(pool, chat_id, SUMMARY_WINDOW).await?;
    if messages.is_empty() {
        return Err(SummaryError::NothingToSummarize);
    }

    let transcript = render_transcript(&messages);
    let prompt = format!("Summarize this group conversation:\n\n{transcript}");
    let text = llm.generate(&prompt, SUMMARY_SYSTEM).await?;

    Ok(Summary {
        text: clip_reply(&text),
        message_count: messages.len(),
    })
}

fn render_transcript(messages: &[GroupMessage]) -> String {
    let mut transcript = String::new();
    for message in messages {
        transcript.push_str(&message.username);
        transcript.push_str(": ");
        transcript.push_str(&message.body);
        transcript.push('\n');
    }
    transcript
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_capture_clamps_and_orders_chronologically() {
        let pool = test_pool().await;
        let long_body = "y".repeat(800);
        save_group_message(&pool, 10, 1, "alice", "hello", Utc::now()).await.expect("first");
        save_group_message(&pool, 10, 2, "bob", &long_body, Utc::now()).await.expect("second");
        save_group_message(&pool, 77, 3, "carol", "other chat", Utc::now()).await.expect("third");

        let messages = recent_group_messages(&pool, 10, 30).await.expect("recent");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].username, "alice");
        assert_eq!(messages[1].body.chars().count(), 500);
    }

    #[tokio::test]
    async fn test_recent_window_keeps_newest() {
        let pool = test_pool().await;
        for i in 0..40 {
            save_group_message(&pool, 10, 1, "alice", &format!("msg{i}"), Utc::now())
                .await
                .expect("save");
        }

        let messages = recent_group_messages(&pool, 10, SUMMARY_WINDOW).await.expect("recent");
        assert_eq!(messages.len(), 30);
        assert_eq!(messages[0].body, "msg10");
        assert_eq!(messages[29].body, "msg39");
    }

    #[test]
    fn test_render_transcript() {
        let messages = vec![
            GroupMessage {
                username: "alice".to_string(),
                body: "hi".to_string(),
                sent_at: Utc::now(),
            },
            GroupMessage {
                username: "bob".to_string(),
                body: "hello".to_string(),
                sent_at: Utc::now(),
            },
        ];
        assert_eq!(render_transcript(&messages), "alice: hi\nbob: hello\n");
    }
}
