//! streamchat - terminal client for a streaming chat backend
//!
//! Connects to a chat server over REST (session metadata, history) and
//! WebSocket (live token streaming), assembling responses chunk by chunk.

mod api;
mod chat;
mod config;
mod connection;
mod orchestrator;
mod protocol;
#[cfg(test)]
mod testing;

use std::io::Write as _;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{ChatApi, HttpChatApi};
use chat::SessionController;
use config::Config;
use connection::{ConnectionConfig, ConnectionManager};
use orchestrator::Orchestrator;
use protocol::InboundEvent;

const PROMPT_SUGGESTIONS: &[&str] = &[
    "What can you help me with?",
    "Explain a concept in simple terms",
    "Help me brainstorm ideas",
    "Summarize a topic for me",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging. Chat output owns stdout, so logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamchat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    tracing::info!(api = %config.api_base, ws = %config.ws_base, user = %config.user_id, "starting");

    let api = HttpChatApi::new(&config.api_base)?;
    let connection = ConnectionManager::new(ConnectionConfig {
        ws_base: config.ws_base.clone(),
        connect_timeout: config.connect_timeout,
        outbound_queue_limit: config.outbound_queue_limit,
    });
    let controller = SessionController::new(connection);
    let mut orchestrator = Orchestrator::new(api, controller, config.user_id.clone());

    orchestrator.bootstrap().await?;
    println!("streamchat ready. Type a message, or /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_line(&mut orchestrator, &line).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            event = orchestrator.next_event() => {
                if let Some(event) = event {
                    render_event(&event);
                    orchestrator.handle_event(event);
                }
            }
        }
    }

    Ok(())
}

/// Handles one line of input. Returns false to quit.
async fn handle_line<A: ChatApi>(orchestrator: &mut Orchestrator<A>, line: &str) -> bool {
    let line = line.trim();
    match line {
        "/quit" | "/exit" => return false,
        "" => {}
        "/help" => print_help(),
        "/suggest" => {
            for suggestion in PROMPT_SUGGESTIONS {
                println!("  {suggestion}");
            }
        }
        "/sessions" => {
            if let Err(e) = orchestrator.refresh_sessions().await {
                println!("(failed to load sessions: {e})");
                return true;
            }
            for session in orchestrator.sessions() {
                let marker = if orchestrator.is_session_selected(session.id) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{marker} [{}] {}  (updated {})",
                    session.id,
                    session.title,
                    session.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        "/new" => match orchestrator.new_session().await {
            Ok(()) => println!("(started a new chat)"),
            Err(e) => println!("(failed to create session: {e})"),
        },
        "/clear" => {
            orchestrator.clear_all();
            println!("(cleared)");
        }
        _ => {
            // "/open" with a missing or malformed id is a usage error, not
            // a chat message.
            let open_arg = line
                .strip_prefix("/open")
                .filter(|rest| rest.is_empty() || rest.starts_with(' '));
            if let Some(arg) = open_arg {
                match arg.trim().parse() {
                    Ok(id) => match orchestrator.open_session(id).await {
                        Ok(()) => print_transcript(orchestrator),
                        Err(e) => println!("(failed to open session: {e})"),
                    },
                    Err(_) => println!("(usage: /open <session-id>)"),
                }
            } else if let Err(e) = orchestrator.send_input(line).await {
                println!("(not sent: {e})");
            }
        }
    }
    true
}

fn print_help() {
    println!("  /sessions        list sessions (* = selected)");
    println!("  /open <id>       open a session and load its history");
    println!("  /new             start a new conversation");
    println!("  /clear           clear all local chat state");
    println!("  /suggest         show prompt suggestions");
    println!("  /quit            exit");
}

fn print_transcript<A: ChatApi>(orchestrator: &Orchestrator<A>) {
    for message in orchestrator.controller().transcript() {
        let who = match message.sender {
            chat::Sender::User => "you",
            chat::Sender::Assistant => "assistant",
        };
        println!("{who}: {}", message.text);
    }
}

fn render_event(event: &InboundEvent) {
    match event {
        InboundEvent::Chunk { text } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        InboundEvent::Complete => println!(),
        InboundEvent::Error { text } => println!("[error] {text}"),
        InboundEvent::Connected => tracing::info!("connected"),
        InboundEvent::Disconnected => tracing::info!("disconnected"),
    }
}
