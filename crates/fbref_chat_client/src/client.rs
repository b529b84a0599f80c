//! HTTP client for the answering service: `POST /ask`, `POST /clear_history`,
//! and the `GET /chat` event stream. Cookies set by the service are kept for
//! the lifetime of the client so every call belongs to the same server session.

use futures_util::StreamExt;
use reqwest::{Response, Url};
use std::time::Duration;

use crate::config::Config;
use crate::messages::{
    AskRequest, AskResponse, ClearHistoryResponse, ErrorPayload, Message, StreamEvent,
};
use crate::sse::{SseDecoder, SseFrame};

/// Shown when the service rejects a request without saying why.
pub const DEFAULT_SERVICE_ERROR: &str = "Something went wrong.";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid base url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service returned {status}: {}", .message.as_deref().filter(|m| !m.is_empty()).unwrap_or(DEFAULT_SERVICE_ERROR))]
    Service { status: u16, message: Option<String> },
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("event stream error: {0}")]
    Protocol(String),
}

/// Client bound to one answering service.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base: Url,
}

impl Client {
    /// Build a client for `base_url` (e.g. `http://127.0.0.1:5000`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl {
                url: base_url.to_string(),
                reason: "not a base url".into(),
            });
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(config.base_url(), config.timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base.join(path).map_err(|e| ClientError::InvalidUrl {
            url: format!("{}{}", self.base, path),
            reason: e.to_string(),
        })
    }

    /// Post a question; returns the service's full chat history.
    pub async fn ask(&self, question: &str) -> Result<Vec<Message>, ClientError> {
        let url = self.endpoint("ask")?;
        tracing::debug!(%url, "posting question");
        let response = self
            .http
            .post(url)
            .json(&AskRequest { question })
            .send()
            .await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        let payload: AskResponse = serde_json::from_slice(&body)?;
        tracing::debug!(messages = payload.chat_history.len(), "received chat history");
        Ok(payload.chat_history)
    }

    /// Ask the service to drop its stored history. Returns the service's confirmation text.
    pub async fn clear_history(&self) -> Result<String, ClientError> {
        let url = self.endpoint("clear_history")?;
        let response = self.http.post(url).send().await?;
        let response = check_status(response).await?;
        let body = response.bytes().await?;
        let payload: ClearHistoryResponse = serde_json::from_slice(&body)?;
        Ok(payload.message)
    }

    /// Stream an answer, collecting events until end-of-stream or a notice.
    pub async fn chat_stream(&self, question: &str) -> Result<Vec<StreamEvent>, ClientError> {
        self.chat_stream_each(question, |_| {}).await
    }

    /// Like [`Client::chat_stream`], calling `on_event` as each event arrives.
    pub async fn chat_stream_each<F>(
        &self,
        question: &str,
        mut on_event: F,
    ) -> Result<Vec<StreamEvent>, ClientError>
    where
        F: FnMut(&StreamEvent),
    {
        let url = self.endpoint("chat")?;
        let response = self
            .http
            .get(url)
            .query(&[("message", question)])
            .send()
            .await?;
        let response = check_status(response).await?;

        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        let mut done = false;

        while !done {
            let Some(chunk) = body.next().await else {
                break;
            };
            decoder.push(&chunk?);
            while let Some(frame) = decoder.next_frame() {
                if accept_frame(&frame, &mut events, &mut on_event)? {
                    done = true;
                    break;
                }
            }
        }
        if !done {
            if let Some(frame) = decoder.finish() {
                accept_frame(&frame, &mut events, &mut on_event)?;
            }
        }
        Ok(events)
    }
}

/// Decode a frame into `events`; true when the stream is over.
fn accept_frame<F>(
    frame: &SseFrame,
    events: &mut Vec<StreamEvent>,
    on_event: &mut F,
) -> Result<bool, ClientError>
where
    F: FnMut(&StreamEvent),
{
    let event =
        StreamEvent::from_frame(frame.event.as_deref(), &frame.data).map_err(ClientError::Protocol)?;
    on_event(&event);
    let last = matches!(event, StreamEvent::End | StreamEvent::Notice(_));
    events.push(event);
    Ok(last)
}

/// Turn a non-2xx response into `ClientError::Service`. A body that is not
/// JSON is a decode failure, not a service message. An empty `error` counts
/// as no message.
async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await?;
    let payload: ErrorPayload = serde_json::from_slice(&body)?;
    tracing::warn!(status = status.as_u16(), error = ?payload.error, "service rejected request");
    Err(ClientError::Service {
        status: status.as_u16(),
        message: payload.error.filter(|m| !m.is_empty()),
    })
}
