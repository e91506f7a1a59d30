//! `LmsChat` demo: a line-oriented front end for the classroom messaging core.
//!
//! Signs a roster user in, opens their chat page and reads commands from
//! stdin. Replies and file uploads are simulated and printed as they land.
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/lmschat/config.toml`).
//!
//! ```bash
//! # Sign in as the demo student
//! cargo run --bin lmschat -- --user-id student-1
//!
//! # Reproducible presence and replies, narrow layout
//! LMSCHAT_SEED=7 cargo run --bin lmschat -- --width 375
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use lmschat::chat::history::{InMemoryMessageLog, seed_messages};
use lmschat::chat::{ChatEvent, ChatSession, SendOutcome, SkipReason};
use lmschat::config::{CliArgs, ClientConfig};
use lmschat::directory::{StaticRoster, UserRepository};
use lmschat::files::{FileCategory, FileHandle, format_date, format_file_size, format_time};
use lmschat::session::{self, FileSessionStore, InMemorySessionStore, SessionStore};
use lmschat_proto::message::{Message, MessageBody, Timestamp};
use lmschat_proto::upload::UploadId;
use lmschat_proto::user::{User, UserId};

/// Signed in when neither the CLI nor a stored session names a user.
const DEFAULT_USER: &str = "student-1";

const HELP: &str = "\
commands:
  /list                 show conversations
  /search <term>        filter conversations by name
  /open <id>            open a conversation
  /back                 return to the list (narrow layout)
  /resize <px>          change the viewport width
  /attach <path>...     upload files to the open conversation
  /cancel <upload-id>   cancel an upload
  /uploads              show uploads in flight
  /profile              toggle the contact panel
  /files                files shared in the open conversation
  /logout               forget the signed-in user and quit
  /quit                 quit
anything else is sent as a message";

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file so stdout stays readable.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!("lmschat starting");
    let result = run(&config).await;
    tracing::info!("lmschat exiting");

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("lmschat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let roster = match &config.roster_path {
        Some(path) => StaticRoster::load(path)?,
        None => StaticRoster::demo(),
    };

    let store: Box<dyn SessionStore> = match FileSessionStore::default_path() {
        Some(path) => Box::new(FileSessionStore::new(path)),
        None => Box::new(InMemorySessionStore::new()),
    };
    let user = sign_in(store.as_ref(), &roster, config.user_id.as_deref())?;

    let rng = config
        .seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
    let log = Arc::new(InMemoryMessageLog::with_messages(seed_messages(
        Timestamp::now(),
    )));
    let (mut chat, events) =
        ChatSession::new(user.clone(), &roster, log, &config.session, rng);

    let names: HashMap<UserId, String> = roster
        .users()
        .into_iter()
        .map(|u| (u.id, u.name))
        .collect();
    let printer = tokio::spawn(print_events(events, names.clone(), user.id.clone()));

    println!("Signed in as {} ({})", user.name, user.role);
    print_conversations(&chat, "");
    println!("Type /help for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Quit => break,
            Command::Logout => {
                session::logout(store.as_ref())?;
                println!("Signed out.");
                break;
            }
            command => {
                if let Err(e) = execute(&mut chat, &names, command).await {
                    println!("! {e}");
                }
            }
        }
    }

    chat.close();
    drop(chat);
    let _ = printer.await;
    Ok(())
}

/// Pick the user to sign in as and record it in the session store.
///
/// An explicit id wins over the stored session; a stored user that is no
/// longer in the roster falls back to the default.
fn sign_in(
    store: &dyn SessionStore,
    roster: &StaticRoster,
    explicit: Option<&str>,
) -> Result<User, Box<dyn std::error::Error>> {
    if let Some(id) = explicit {
        let user = roster
            .find(&UserId::new(id))
            .ok_or_else(|| format!("no user {id} in roster"))?;
        session::sign_in(store, &user)?;
        return Ok(user);
    }

    match session::current_user(store) {
        Ok(Some(stored)) if roster.find(&stored.id).is_some() => return Ok(stored),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable session"),
    }

    let user = roster
        .find(&UserId::new(DEFAULT_USER))
        .or_else(|| roster.users().into_iter().next())
        .ok_or("roster is empty")?;
    session::sign_in(store, &user)?;
    Ok(user)
}

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    List,
    Search(String),
    Open(String),
    Back,
    Resize(Option<u32>),
    Attach(Vec<PathBuf>),
    Cancel(Option<UploadId>),
    Uploads,
    Profile,
    Files,
    Logout,
    Quit,
    Unknown(String),
    Send(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let Some(rest) = line.strip_prefix('/') else {
            return Self::Send(line.to_string());
        };
        let (name, arg) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(n, a)| (n, a.trim()));
        match name {
            "help" => Self::Help,
            "list" => Self::List,
            "search" => Self::Search(arg.to_string()),
            "open" => Self::Open(arg.to_string()),
            "back" => Self::Back,
            "resize" => Self::Resize(arg.parse().ok()),
            "attach" => Self::Attach(arg.split_whitespace().map(PathBuf::from).collect()),
            "cancel" => Self::Cancel(arg.parse().ok()),
            "uploads" => Self::Uploads,
            "profile" => Self::Profile,
            "files" => Self::Files,
            "logout" => Self::Logout,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_string()),
        }
    }
}

async fn execute(
    chat: &mut ChatSession<InMemoryMessageLog>,
    names: &HashMap<UserId, String>,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Help => println!("{HELP}"),
        Command::List => print_conversations(chat, ""),
        Command::Search(term) => print_conversations(chat, &term),
        Command::Open(id) => {
            chat.select_conversation(&UserId::new(id)).await?;
            print_thread(chat, names).await?;
            print_layout(chat);
        }
        Command::Back => {
            if chat.back() {
                print_conversations(chat, "");
            } else {
                println!("(both panes are already visible)");
            }
        }
        Command::Resize(Some(width)) => {
            chat.resize(width).await?;
            print_layout(chat);
        }
        Command::Resize(None) => println!("usage: /resize <px>"),
        Command::Attach(paths) if paths.is_empty() => println!("usage: /attach <path>..."),
        Command::Attach(paths) => {
            let mut files = Vec::with_capacity(paths.len());
            for path in &paths {
                match FileHandle::from_path(path).await {
                    Ok(file) => files.push(file),
                    Err(e) => println!("! {e}"),
                }
            }
            if chat.attach_files(files)?.is_empty() {
                println!("(open a conversation first)");
            }
        }
        Command::Cancel(Some(id)) => {
            if !chat.cancel_upload(id) {
                println!("(no such upload in flight)");
            }
        }
        Command::Cancel(None) => println!("usage: /cancel <upload-id>"),
        Command::Uploads => {
            let uploads = chat.uploads();
            if uploads.is_empty() {
                println!("(no uploads in flight)");
            }
            for upload in uploads {
                println!(
                    "  {} {} ({}) {}%",
                    upload.id,
                    upload.file.name,
                    format_file_size(upload.file.size),
                    upload.progress
                );
            }
        }
        Command::Profile => {
            chat.toggle_profile();
            print_profile(chat).await?;
        }
        Command::Files => {
            let files = chat.shared_files().await?;
            if files.is_empty() {
                println!("No files shared yet");
            }
            for file in files {
                println!("  {} ({})", file.name, format_file_size(file.size));
            }
        }
        Command::Unknown(name) => println!("unknown command /{name}, try /help"),
        Command::Send(text) => match chat.send_text(&text).await? {
            SendOutcome::Sent { .. } | SendOutcome::Skipped(SkipReason::EmptyMessage) => {}
            SendOutcome::Skipped(SkipReason::NoActiveConversation) => {
                println!("(open a conversation first)");
            }
        },
        Command::Logout | Command::Quit => {}
    }
    Ok(())
}

fn print_conversations(chat: &ChatSession<InMemoryMessageLog>, term: &str) {
    for c in chat.search(term) {
        let presence = if c.online { "online" } else { "offline" };
        println!(
            "  [{}] {} ({}, {presence}) {}",
            c.id, c.name, c.role, c.last_message
        );
    }
}

async fn print_thread(
    chat: &ChatSession<InMemoryMessageLog>,
    names: &HashMap<UserId, String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(peer) = chat.active_conversation() else {
        return Ok(());
    };
    println!("── {} ──", peer.name);
    let messages = chat.active_messages().await?;
    match messages.first() {
        Some(first) => println!("Conversation started • {}", format_date(first.timestamp)),
        None => println!("No messages yet. Say hello!"),
    }
    for message in &messages {
        println!("{}", render(message, names));
    }
    Ok(())
}

async fn print_profile(
    chat: &ChatSession<InMemoryMessageLog>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !chat.view().profile_visible() {
        println!("(contact panel hidden)");
        return Ok(());
    }
    let Some(peer) = chat.active_conversation() else {
        return Ok(());
    };
    println!("{} <{}> ({})", peer.name, peer.email, peer.role);
    println!("{}", peer.about());
    println!("Shared files: {}", chat.shared_files().await?.len());
    Ok(())
}

fn print_layout(chat: &ChatSession<InMemoryMessageLog>) {
    let panes = chat.view().panes();
    tracing::debug!(?panes, "layout");
    println!(
        "(layout: list={} thread={} profile={})",
        panes.list, panes.thread, panes.profile
    );
}

fn render(message: &Message, names: &HashMap<UserId, String>) -> String {
    let who = names
        .get(&message.sender_id)
        .map_or_else(|| message.sender_id.to_string(), Clone::clone);
    let time = format_time(message.timestamp);
    match &message.body {
        MessageBody::Text(text) => format!("[{time}] {who}: {text}"),
        MessageBody::File(file) | MessageBody::Image(file) => format!(
            "[{time}] {who} sent {} {} ({})",
            FileCategory::for_media_type(&file.media_type).label(),
            file.name,
            format_file_size(file.size)
        ),
    }
}

/// Print asynchronous activity until the session is dropped.
async fn print_events(
    mut events: mpsc::Receiver<ChatEvent>,
    names: HashMap<UserId, String>,
    me: UserId,
) {
    while let Some(event) = events.recv().await {
        match event {
            // Own text messages are already on screen as typed.
            ChatEvent::MessageAppended { message }
                if message.sender_id == me && message.body.text().is_some() => {}
            ChatEvent::MessageAppended { message } => println!("{}", render(&message, &names)),
            ChatEvent::UploadStarted { upload } => {
                println!("↑ {} started ({})", upload.file.name, upload.id);
            }
            ChatEvent::UploadCancelled { id } => println!("↑ {id} cancelled"),
            ChatEvent::UploadFailed { id, reason } => println!("! upload {id} failed: {reason}"),
            ChatEvent::ReplyScheduled { .. }
            | ChatEvent::UploadProgress { .. }
            | ChatEvent::UploadCompleted { .. } => {}
        }
    }
    let _ = io::Write::flush(&mut io::stdout());
}
