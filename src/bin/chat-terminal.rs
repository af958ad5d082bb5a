//! Interactive terminal chat client.
//!
//! Logs in through the browser, lists friends, and keeps the open chat up to
//! date while you type.
//!
//! # Usage
//!
//! ```bash
//! # Use the settings in ~/.config/chat-terminal/settings.yaml
//! chat-terminal
//!
//! # Talk to a different server and poll twice a second
//! chat-terminal --server-url http://localhost:8000 --refresh-interval-ms 500
//!
//! # Disable colors
//! chat-terminal --no-color
//! ```
//!
//! # Commands
//!
//! - `/login` - Log in
//! - `/friends` - Show friends and friend requests
//! - `/chat <n>` - Open the chat with friend number n
//! - `/help` - Show all commands
//! - `/quit` - Exit the application
//!
//! Diagnostics go to `chat-terminal.log` in the configuration directory;
//! set `RUST_LOG` to change the level.

use std::fs::{self, OpenOptions};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;

use chat_terminal::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, Phase, PlainTextRenderer, Renderer,
    help_text, parse_command,
};
use chat_terminal::{ChatClient, register_biometrics};

fn init_logging(config: &ChatConfig) -> std::io::Result<()> {
    fs::create_dir_all(&config.config_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.log_path())?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_terminal=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

fn status_line(session: &ChatSession<ChatClient>) -> String {
    let user = session
        .session()
        .map(|s| format!("logged in as {}", s.user_id))
        .unwrap_or_else(|| "logged out".to_string());
    let poll = session.poll_state();
    let view = match session.phase() {
        Phase::LoggedOut | Phase::NoConversation => "no chat open".to_string(),
        Phase::Active { suspended } => format!(
            "chat {}{}",
            session
                .conversation()
                .map(|c| c.to_string())
                .unwrap_or_default(),
            if suspended { " (paused)" } else { "" }
        ),
    };
    format!(
        "{user}; {view}; polling {} (generation {})",
        if poll.running { "on" } else { "off" },
        poll.generation
    )
}

/// Main entry point for the chat-terminal application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("chat-terminal [OPTIONS]");
    let config = ChatConfig::load(&args);
    if let Err(err) = init_logging(&config) {
        eprintln!("could not open log file: {err}");
    }
    register_biometrics(biometrics::Collector::new());

    let mut rl = DefaultEditor::new()?;
    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    match rl.create_external_printer() {
        Ok(printer) => renderer = renderer.with_printer(Box::new(printer)),
        Err(err) => tracing::debug!(error = %err, "no external printer; using stdout"),
    }
    let renderer: Arc<dyn Renderer> = Arc::new(renderer);

    // Flag for cancelling a pending login
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let client = Arc::new(ChatClient::new(&config.server_url)?);
    let mut session = ChatSession::new(client, Arc::clone(&renderer), &config)
        .with_interrupt(Arc::clone(&interrupted));

    println!("Chat Terminal ({})", config.server_url);
    println!("Type /help for commands, /quit to exit\n");
    if !session.restore().await {
        renderer.notify("Not logged in. Type /login to start.");
    }

    let mut unsent = String::new();
    loop {
        interrupted.store(false, Ordering::Relaxed);

        let readline = if unsent.is_empty() {
            rl.readline("> ")
        } else {
            rl.readline_with_initial("> ", (unsent.as_str(), ""))
        };
        unsent.clear();

        match readline {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.trim());

                let Some(cmd) = parse_command(&line) else {
                    if !session.send_message(&line).await {
                        unsent = line;
                    }
                    continue;
                };
                match cmd {
                    ChatCommand::Quit => {
                        println!("Goodbye!");
                        break;
                    }
                    ChatCommand::Help => {
                        for line in help_text().lines() {
                            println!("    {}", line);
                        }
                    }
                    ChatCommand::Login => {
                        session.login().await;
                    }
                    ChatCommand::Logout => session.logout().await,
                    ChatCommand::Friends => session.open_friends().await,
                    ChatCommand::Close => session.close_friends(),
                    ChatCommand::Chat(row) => {
                        session.select_friend(row).await;
                    }
                    ChatCommand::Add(email) => {
                        session.send_friend_request(&email).await;
                    }
                    ChatCommand::Accept(row) => {
                        session.accept_friend_request(row).await;
                    }
                    ChatCommand::Reject(row) => {
                        session.reject_friend_request(row).await;
                    }
                    ChatCommand::Delete(row) => {
                        session.delete_friend(row).await;
                    }
                    ChatCommand::Status => renderer.notify(&status_line(&session)),
                    ChatCommand::Invalid(message) => renderer.notify(&message),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
