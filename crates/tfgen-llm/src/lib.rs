//! tfgen-llm: chat-completion seam.
//!
//! The pipeline treats the LLM strictly as an extractor behind this trait;
//! all downstream logic operates on the normalized form, so a wrong
//! completion only ever costs a follow-up turn.

pub mod openai;

pub use openai::{OpenAiClient, OpenAiConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One turn of a chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Http(String),

    #[error("llm request timed out")]
    Timeout,

    #[error("llm returned an empty response")]
    Empty,
}

/// Unified chat interface for the stages. The provider itself is an
/// external collaborator.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat(&self, messages: &[ChatTurn]) -> Result<String, LlmError>;

    /// Model identifier for logging.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Pull the outermost JSON object out of a completion that may be wrapped
/// in prose or a markdown fence.
pub fn extract_json(text: &str) -> Option<serde_json::Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Deterministic client replaying a script of canned replies. Used by the
/// stage tests; records every request it sees.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<ChatTurn>>>,
}

impl ScriptedClient {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests observed so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<ChatTurn>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn chat(&self, messages: &[ChatTurn]) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::Empty)
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let reply = "Sure thing:\n```json\n{\"resources\": []}\n```\nDone.";
        let value = extract_json(reply).unwrap();
        assert!(value.get("resources").unwrap().as_array().unwrap().is_empty());
    }

    #[test]
    fn test_extract_json_rejects_garbage() {
        assert!(extract_json("no json here").is_none());
        assert!(extract_json("} backwards {").is_none());
    }

    #[tokio::test]
    async fn test_scripted_client_replays_in_order() {
        let client = ScriptedClient::new(["one", "two"]);
        assert_eq!(client.chat(&[ChatTurn::user("a")]).await.unwrap(), "one");
        assert_eq!(client.chat(&[ChatTurn::user("b")]).await.unwrap(), "two");
        assert!(matches!(
            client.chat(&[ChatTurn::user("c")]).await,
            Err(LlmError::Empty)
        ));
        assert_eq!(client.requests().len(), 3);
    }
}
