//! Chat client for the FBref Q&A service: config, HTTP exchange, session state
//! and terminal rendering. Used by the `fbref-chat` binary.

pub mod client;
pub mod config;
pub mod logging;
pub mod messages;
pub mod render;
pub mod session;
pub mod sse;

pub use client::{Client, ClientError};
pub use config::{default_config_path, Config, ConfigError, LogSection, ServerSection};
pub use messages::{Message, Speaker, StreamEvent};
pub use session::{
    ChatSession, ClearOutcome, Notice, Pending, SessionError, SubmitOutcome, SyncState,
};
