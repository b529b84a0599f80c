//! fbref-chat: terminal chat client for the FBref Q&A service.
//! Asks one question from the command line, or runs a line-per-question loop
//! over stdin (interactive when stdin is a terminal).

use anyhow::Context;
use clap::Parser;
use fbref_chat_client::render::{render_history, render_message, render_notice, submit_label};
use fbref_chat_client::{
    config, logging, ChatSession, ClearOutcome, Client, Speaker, StreamEvent, SubmitOutcome,
};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;

#[derive(Debug, Parser)]
#[command(name = "fbref-chat", version, about = "Chat with the FBref Q&A service")]
struct Cli {
    /// Config file (default: ~/.fbref-chat/config.yaml).
    #[arg(long, env = "FBREF_CHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Override `server.base_url`.
    #[arg(long)]
    base_url: Option<String>,

    /// Use the streaming `/chat` endpoint instead of `/ask`.
    #[arg(long)]
    stream: bool,

    /// Clear the conversation on the service and exit.
    #[arg(long)]
    clear: bool,

    /// Question to ask. Without it, questions are read from stdin.
    question: Option<String>,
}

fn resolve_config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    if let Some(path) = &cli.config {
        return Ok(path.clone());
    }
    config::default_config_path()
        .context("unable to determine config path (set --config or FBREF_CHAT_CONFIG)")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = resolve_config_path(&cli)?;
    let mut cfg = config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    if let Some(url) = &cli.base_url {
        cfg.server.base_url = Some(url.clone());
    }
    logging::init(cfg.log.level.as_deref());
    tracing::debug!(config = %config_path.display(), base_url = cfg.base_url(), "starting");

    let client = Client::from_config(&cfg).context("invalid server configuration")?;
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;
    let mut session = ChatSession::new();

    if cli.clear {
        let cleared = clear(&rt, &mut session, &client);
        return Ok(if cleared {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    if let Some(question) = &cli.question {
        session.set_draft(question.as_str());
        let outcome = turn(&rt, &mut session, &client, cli.stream)?;
        return Ok(match outcome {
            SubmitOutcome::Committed => {
                if !cli.stream {
                    print!("{}", render_history(&session));
                }
                ExitCode::SUCCESS
            }
            SubmitOutcome::Ignored => {
                eprintln!("Error: no question provided");
                ExitCode::FAILURE
            }
            SubmitOutcome::Failed(notice) => {
                eprintln!("{}", render_notice(&notice));
                ExitCode::FAILURE
            }
        });
    }

    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    repl(&rt, &mut session, &client, stdin.lock(), interactive, cli.stream)
}

/// Submit the draft once. Streamed tokens are printed as they arrive.
fn turn(
    rt: &Runtime,
    session: &mut ChatSession,
    client: &Client,
    stream: bool,
) -> anyhow::Result<SubmitOutcome> {
    let outcome = if stream {
        let question = session.draft().to_string();
        let outcome = rt.block_on(session.submit_streaming(client, &question, print_event))?;
        if outcome == SubmitOutcome::Committed {
            println!();
        }
        outcome
    } else {
        rt.block_on(session.submit_draft(client))?
    };
    Ok(outcome)
}

fn print_event(event: &StreamEvent) {
    match event {
        StreamEvent::Status(status) => eprintln!("{}", status),
        StreamEvent::Token(token) => {
            let mut out = io::stdout().lock();
            let _ = write!(out, "{}", token);
            let _ = out.flush();
        }
        StreamEvent::Notice(_) | StreamEvent::End => {}
    }
}

fn repl(
    rt: &Runtime,
    session: &mut ChatSession,
    client: &Client,
    input: impl BufRead,
    interactive: bool,
    stream: bool,
) -> anyhow::Result<ExitCode> {
    let mut asked = false;
    let mut lines = input.lines();
    loop {
        if interactive {
            print!("{} > ", submit_label(session));
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.context("failed to read stdin")?;
        match line.trim() {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                if !clear(rt, session, client) && !interactive {
                    return Ok(ExitCode::FAILURE);
                }
                continue;
            }
            _ => {}
        }

        session.set_draft(line.trim());
        asked = true;
        match turn(rt, session, client, stream)? {
            SubmitOutcome::Committed => {
                if !stream {
                    print_reply(session);
                }
            }
            SubmitOutcome::Ignored => {}
            SubmitOutcome::Failed(notice) => {
                eprintln!("{}", render_notice(&notice));
                if !interactive {
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    if !asked && !interactive {
        eprintln!("Error: no question provided on stdin");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Print what the service added after the latest question.
fn print_reply(session: &ChatSession) {
    let history = session.history();
    let start = history
        .iter()
        .rposition(|m| m.speaker == Speaker::Human)
        .map_or(0, |i| i + 1);
    for message in &history[start..] {
        println!("{}", render_message(message));
    }
}

/// Clear the conversation; false when the service refused or was unreachable.
fn clear(rt: &Runtime, session: &mut ChatSession, client: &Client) -> bool {
    match rt.block_on(session.clear(client)) {
        Ok(ClearOutcome::Cleared(message)) => {
            println!("{}", message);
            true
        }
        Ok(ClearOutcome::Failed(notice)) => {
            eprintln!("{}", render_notice(&notice));
            false
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    }
}
