//! JSON payloads exchanged with the answering service.

use serde::{Deserialize, Serialize};

/// Who authored a message. Serialized as the JSON `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Human,
    #[serde(alias = "ai", alias = "assistant")]
    Bot,
}

/// One entry of the chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub speaker: Speaker,
    pub content: String,
}

impl Message {
    pub fn human(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Human,
            content: content.into(),
        }
    }

    pub fn bot(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Bot,
            content: content.into(),
        }
    }
}

/// Client → server: `POST /ask` body.
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
}

/// Server → client: `POST /ask` success body.
#[derive(Debug, Clone, Deserialize)]
pub struct AskResponse {
    pub chat_history: Vec<Message>,
}

/// Server → client: body of any non-2xx response. `error` may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub error: Option<String>,
}

/// Server → client: `POST /clear_history` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ClearHistoryResponse {
    pub message: String,
}

/// One decoded event of the `/chat` event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Progress text shown while the answer is prepared.
    Status(String),
    /// A fragment of the answer.
    Token(String),
    /// Bare-string payload: the service declined the question.
    Notice(String),
    /// `event: end-of-stream`.
    End,
}

#[derive(Debug, Clone, Deserialize)]
struct TypedEvent {
    #[serde(rename = "type")]
    typ: String,
    #[serde(default)]
    content: String,
}

impl StreamEvent {
    /// Decode one SSE frame (`event` name and joined `data` lines).
    pub fn from_frame(event: Option<&str>, data: &str) -> Result<Self, String> {
        if event == Some("end-of-stream") {
            return Ok(StreamEvent::End);
        }
        let value: serde_json::Value = serde_json::from_str(data).map_err(|e| e.to_string())?;
        if let Some(text) = value.as_str() {
            return Ok(StreamEvent::Notice(text.to_string()));
        }
        let typed: TypedEvent = serde_json::from_value(value).map_err(|e| e.to_string())?;
        match typed.typ.as_str() {
            "status" => Ok(StreamEvent::Status(typed.content)),
            "token" => Ok(StreamEvent::Token(typed.content)),
            other => Err(format!("unknown type: {}", other)),
        }
    }
}

/// Answer assembled from a finished event stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamReply {
    pub answer: String,
    pub statuses: Vec<String>,
    pub notice: Option<String>,
    pub completed: bool,
}

impl StreamReply {
    pub fn from_events(events: &[StreamEvent]) -> Self {
        let mut reply = StreamReply::default();
        for event in events {
            match event {
                StreamEvent::Status(s) => reply.statuses.push(s.clone()),
                StreamEvent::Token(t) => reply.answer.push_str(t),
                StreamEvent::Notice(n) => reply.notice = Some(n.clone()),
                StreamEvent::End => reply.completed = true,
            }
        }
        reply
    }
}
