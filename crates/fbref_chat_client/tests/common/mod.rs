//! In-process stand-in for the answering service, built on axum. No mocks:
//! tests talk HTTP to a real listener on a free port.
//!
//! Behaviour by question text:
//! - `bad`     → 400 `{"error":"bad question"}`
//! - `silent`  → 500 `{}`
//! - `blank`   → 400 `{"error":""}`
//! - `broken`  → 200 with a body that is not JSON
//! - `html500` → 500 with a body that is not JSON
//! - otherwise → 200, history grows by the question and `Answer to: <q>`
//!
//! On `/chat`, `decline` gets a bare-string event and `truncated` a stream
//! that stops before `end-of-stream`.
#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const CLEARED_MESSAGE: &str = "All chat history cleared successfully";
pub const EMPTY_QUESTION_REPLY: &str = "I am sorry, I did not receive a question. Please try again.";
pub const DECLINED_REPLY: &str = "I cannot answer that.";

#[derive(Clone, Default)]
pub struct ServiceState {
    histories: Arc<Mutex<HashMap<String, Vec<Value>>>>,
    next_session: Arc<AtomicU64>,
    /// Number of requests received on any route.
    pub requests: Arc<AtomicUsize>,
    /// Session cookie presented with each request, in arrival order.
    pub cookies_seen: Arc<Mutex<Vec<Option<String>>>>,
}

impl ServiceState {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn cookies(&self) -> Vec<Option<String>> {
        self.cookies_seen.lock().unwrap().clone()
    }

    /// Resolve the caller's session, minting one (and a Set-Cookie value) when absent.
    fn session(&self, headers: &HeaderMap) -> (String, Option<String>) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let existing = headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| {
                raw.split(';')
                    .map(str::trim)
                    .find_map(|pair| pair.strip_prefix("session="))
                    .map(str::to_string)
            });
        self.cookies_seen.lock().unwrap().push(existing.clone());
        match existing {
            Some(id) => (id, None),
            None => {
                let id = format!("s{}", self.next_session.fetch_add(1, Ordering::SeqCst));
                let cookie = format!("session={}; Path=/", id);
                (id, Some(cookie))
            }
        }
    }
}

fn with_cookie(mut response: Response, cookie: Option<String>) -> Response {
    if let Some(cookie) = cookie {
        response
            .headers_mut()
            .insert(header::SET_COOKIE, HeaderValue::from_str(&cookie).unwrap());
    }
    response
}

async fn ask(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let (session, cookie) = state.session(&headers);
    let question = body["question"].as_str().unwrap_or_default().to_string();

    let response = match question.as_str() {
        "bad" => (StatusCode::BAD_REQUEST, Json(json!({"error": "bad question"}))).into_response(),
        "silent" => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({}))).into_response(),
        "blank" => (StatusCode::BAD_REQUEST, Json(json!({"error": ""}))).into_response(),
        "broken" => (StatusCode::OK, "<html>oops</html>").into_response(),
        "html500" => (StatusCode::INTERNAL_SERVER_ERROR, "<html>Internal Server Error</html>")
            .into_response(),
        _ => {
            let mut histories = state.histories.lock().unwrap();
            let history = histories.entry(session).or_default();
            history.push(json!({"type": "human", "content": question}));
            history.push(json!({"type": "bot", "content": format!("Answer to: {}", question)}));
            Json(json!({"chat_history": history.clone()})).into_response()
        }
    };
    with_cookie(response, cookie)
}

async fn clear_history(State(state): State<ServiceState>, headers: HeaderMap) -> Response {
    let (_, cookie) = state.session(&headers);
    state.histories.lock().unwrap().clear();
    with_cookie(Json(json!({"message": CLEARED_MESSAGE})).into_response(), cookie)
}

async fn chat(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (_, cookie) = state.session(&headers);
    let question = params.get("message").cloned().unwrap_or_default();

    let mut body = String::new();
    if question.is_empty() {
        body.push_str(&format!("data: {}\n\n", json!(EMPTY_QUESTION_REPLY)));
    } else if question == "decline" {
        body.push_str(&format!("data: {}\n\n", json!(DECLINED_REPLY)));
    } else if question == "truncated" {
        body.push_str(&format!("data: {}\n\n", json!({"type": "token", "content": "half"})));
    } else {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"type": "status", "content": "Analyzing data..."})
        ));
        let answer = format!("Answer to: {}", question);
        for word in answer.split_inclusive(' ') {
            body.push_str(&format!("data: {}\n\n", json!({"type": "token", "content": word})));
        }
        body.push_str("event: end-of-stream\ndata: close\n\n");
    }
    let response = ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
    with_cookie(response, cookie)
}

pub fn router(state: ServiceState) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/clear_history", post(clear_history))
        .route("/chat", get(chat))
        .with_state(state)
}

/// Start the service on the current tokio runtime. Returns its base URL.
pub async fn spawn_service() -> (String, ServiceState) {
    let state = ServiceState::default();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

/// Start the service on its own thread, for tests that drive the binary.
pub fn spawn_service_thread() -> (String, ServiceState) {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let state = ServiceState::default();
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tx.send((format!("http://{}", addr), state.clone())).unwrap();
            axum::serve(listener, router(state)).await.unwrap();
        });
    });
    rx.recv().unwrap()
}

/// A port with nothing listening on it.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
