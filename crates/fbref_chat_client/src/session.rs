//! Chat session controller: draft, history and sync state for one conversation.
//!
//! A submission is two phases. [`ChatSession::begin`] appends the question
//! optimistically and marks the session busy; [`ChatSession::settle`] applies
//! the service's answer (or the failure) and always clears busy. The async
//! [`ChatSession::submit`] runs both around [`Client::ask`].

use crate::client::{Client, ClientError, DEFAULT_SERVICE_ERROR};
use crate::messages::{Message, StreamEvent, StreamReply};

/// Where local history stands relative to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// History is the service's last answer (or empty).
    Synced,
    /// A submission is in flight.
    Pending { ticket: u64 },
    /// The last round trip failed; the optimistic message was kept.
    Desynced,
}

/// User-facing notification for a failed submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Message reported by the service.
    Service(String),
    /// Transport or decode failure; details are in the log.
    ServerError,
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::Service(msg) => write!(f, "{}", msg),
            Notice::ServerError => write!(f, "Server error. Check logs."),
        }
    }
}

impl From<&ClientError> for Notice {
    fn from(err: &ClientError) -> Self {
        match err {
            ClientError::Service { message, .. } => Notice::Service(
                message
                    .clone()
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| DEFAULT_SERVICE_ERROR.to_string()),
            ),
            _ => Notice::ServerError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Blank question; nothing was sent.
    Ignored,
    /// History now matches the service.
    Committed,
    /// Round trip failed; show the notice.
    Failed(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Confirmation text from the service.
    Cleared(String),
    Failed(Notice),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("question is empty")]
    EmptyQuestion,
    #[error("a submission is already in flight")]
    Busy,
    #[error("submission does not belong to the pending request")]
    StaleSubmission,
}

/// Token for an in-flight submission, returned by [`ChatSession::begin`].
#[derive(Debug)]
#[must_use = "a pending submission keeps the session busy until settled"]
pub struct Pending {
    ticket: u64,
    question: String,
}

impl Pending {
    pub fn question(&self) -> &str {
        &self.question
    }
}

#[derive(Debug)]
pub struct ChatSession {
    draft: String,
    history: Vec<Message>,
    state: SyncState,
    next_ticket: u64,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            draft: String::new(),
            history: Vec::new(),
            state: SyncState::Synced,
            next_ticket: 1,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.state, SyncState::Pending { .. })
    }

    /// Phase one: validate, append the question, mark busy.
    pub fn begin(&mut self, question: &str) -> Result<Pending, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        if question.trim().is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.history.push(Message::human(question));
        self.state = SyncState::Pending { ticket };
        tracing::debug!(ticket, "submission started");
        Ok(Pending {
            ticket,
            question: question.to_string(),
        })
    }

    /// Phase two for `/ask`: replace history on success, keep it on failure.
    pub fn settle(
        &mut self,
        pending: Pending,
        result: Result<Vec<Message>, ClientError>,
    ) -> Result<SubmitOutcome, SessionError> {
        self.check_ticket(&pending)?;
        match result {
            Ok(history) => {
                self.history = history;
                self.commit();
                Ok(SubmitOutcome::Committed)
            }
            Err(err) => Ok(self.fail(&err)),
        }
    }

    /// Phase two for the event stream: a completed answer is appended as a bot message.
    pub fn settle_stream(
        &mut self,
        pending: Pending,
        result: Result<Vec<StreamEvent>, ClientError>,
    ) -> Result<SubmitOutcome, SessionError> {
        self.check_ticket(&pending)?;
        let events = match result {
            Ok(events) => events,
            Err(err) => return Ok(self.fail(&err)),
        };
        let reply = StreamReply::from_events(&events);
        if let Some(notice) = reply.notice {
            self.state = SyncState::Desynced;
            return Ok(SubmitOutcome::Failed(Notice::Service(notice)));
        }
        if !reply.completed {
            let err = ClientError::Protocol("stream closed before end-of-stream".into());
            return Ok(self.fail(&err));
        }
        self.history.push(Message::bot(reply.answer));
        self.commit();
        Ok(SubmitOutcome::Committed)
    }

    /// Drop an in-flight submission (its future was cancelled). Returns false when idle.
    pub fn cancel_pending(&mut self) -> bool {
        if !self.is_busy() {
            return false;
        }
        tracing::debug!("pending submission cancelled");
        self.state = SyncState::Desynced;
        true
    }

    /// Submit `question` through `POST /ask`.
    pub async fn submit(
        &mut self,
        client: &Client,
        question: &str,
    ) -> Result<SubmitOutcome, SessionError> {
        let pending = match self.begin(question) {
            Ok(p) => p,
            Err(SessionError::EmptyQuestion) => return Ok(SubmitOutcome::Ignored),
            Err(e) => return Err(e),
        };
        let result = client.ask(pending.question()).await;
        self.settle(pending, result)
    }

    /// Submit the current draft.
    pub async fn submit_draft(&mut self, client: &Client) -> Result<SubmitOutcome, SessionError> {
        let question = self.draft.clone();
        self.submit(client, &question).await
    }

    /// Submit `question` through the `/chat` event stream, forwarding events as they arrive.
    pub async fn submit_streaming<F>(
        &mut self,
        client: &Client,
        question: &str,
        on_event: F,
    ) -> Result<SubmitOutcome, SessionError>
    where
        F: FnMut(&StreamEvent),
    {
        let pending = match self.begin(question) {
            Ok(p) => p,
            Err(SessionError::EmptyQuestion) => return Ok(SubmitOutcome::Ignored),
            Err(e) => return Err(e),
        };
        let result = client.chat_stream_each(pending.question(), on_event).await;
        self.settle_stream(pending, result)
    }

    /// Clear history on the service, then locally. Local state is untouched on failure.
    pub async fn clear(&mut self, client: &Client) -> Result<ClearOutcome, SessionError> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        match client.clear_history().await {
            Ok(message) => {
                self.history.clear();
                self.draft.clear();
                self.state = SyncState::Synced;
                Ok(ClearOutcome::Cleared(message))
            }
            Err(err) => {
                tracing::error!(error = %err, "clearing history failed");
                Ok(ClearOutcome::Failed(Notice::from(&err)))
            }
        }
    }

    fn check_ticket(&self, pending: &Pending) -> Result<(), SessionError> {
        match self.state {
            SyncState::Pending { ticket } if ticket == pending.ticket => Ok(()),
            _ => Err(SessionError::StaleSubmission),
        }
    }

    fn commit(&mut self) {
        self.draft.clear();
        self.state = SyncState::Synced;
    }

    fn fail(&mut self, err: &ClientError) -> SubmitOutcome {
        match err {
            ClientError::Service { .. } => {}
            _ => tracing::error!(error = %err, "error sending question"),
        }
        self.state = SyncState::Desynced;
        SubmitOutcome::Failed(Notice::from(err))
    }
}
