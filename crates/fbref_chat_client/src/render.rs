//! Plain-text rendering of a chat session for the terminal.

use std::fmt::Write as _;

use crate::messages::{Message, Speaker};
use crate::session::{ChatSession, Notice};

pub fn speaker_label(speaker: Speaker) -> &'static str {
    match speaker {
        Speaker::Human => "You",
        Speaker::Bot => "Bot",
    }
}

pub fn render_message(message: &Message) -> String {
    format!("{}: {}", speaker_label(message.speaker), message.content)
}

/// One line per message, in history order.
pub fn render_history(session: &ChatSession) -> String {
    let mut out = String::new();
    for message in session.history() {
        let _ = writeln!(out, "{}", render_message(message));
    }
    out
}

/// Label of the submit affordance.
pub fn submit_label(session: &ChatSession) -> &'static str {
    if session.is_busy() {
        "Asking..."
    } else {
        "Ask"
    }
}

pub fn render_notice(notice: &Notice) -> String {
    format!("Alert: {}", notice)
}
