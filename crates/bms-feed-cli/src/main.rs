use anyhow::{Context, Result};
use bms_core::feed_contracts::{ConnectionState, EventId, Payload};
use bms_core::{FeedKind, Scope};
use bms_feed::{
    spawn_feed, BroadcastPrimitive, FeedCollaborators, FeedConfig, FeedEntry, FeedHandle,
    FeedView, HttpFeedBackend, LoadState, UnavailableBroadcast, UnixDatagramBus,
    UnixPushConfig, UnixPushTransport, DEFAULT_DEPARTMENTS,
};
use chrono::Local;
use clap::Parser;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bms-feed")]
#[command(about = "Live department chat and notifications for the building backend", long_about = None)]
struct Args {
    /// Department chat to open first
    #[arg(short, long, default_value = "Admin")]
    department: String,
    /// Author name attached to sent messages (defaults to $USER)
    #[arg(short, long)]
    user: Option<String>,
    /// Backend base URL (overrides BMS_API_BASE)
    #[arg(long)]
    api_base: Option<String>,
    /// Push hub socket (overrides BMS_PUSH_SOCKET)
    #[arg(long)]
    socket: Option<PathBuf>,
    /// Directory shared with other bms-feed instances on this host (overrides BMS_RELAY_DIR)
    #[arg(long)]
    relay_dir: Option<PathBuf>,
    /// Do not share events with other bms-feed instances on this host
    #[arg(long)]
    no_relay: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Empty,
    Message(String),
    Scope(String),
    Notify { kind: String, message: String },
    Retry,
    Quit,
    Help,
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));
    match name {
        "scope" | "dept" if !rest.is_empty() => Input::Scope(rest.to_string()),
        "notify" => match rest.split_once(char::is_whitespace) {
            Some((kind, message)) if !message.trim().is_empty() => Input::Notify {
                kind: kind.to_string(),
                message: message.trim().to_string(),
            },
            _ => Input::Help,
        },
        "retry" => Input::Retry,
        "quit" | "exit" => Input::Quit,
        _ => Input::Help,
    }
}

fn load_config(args: &Args) -> Result<FeedConfig> {
    let mut config = FeedConfig::from_env().context("invalid BMS_* environment")?;
    if let Some(base) = &args.api_base {
        config.api_base = base.trim_end_matches('/').to_string();
    }
    if let Some(socket) = &args.socket {
        config.push_socket_path = socket.clone();
    }
    if let Some(dir) = &args.relay_dir {
        config.relay_dir = dir.clone();
    }
    if args.no_relay {
        config.relay_enabled = false;
    }
    Ok(config)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let enabled = std::env::var("BMS_LOG_STDOUT")
        .ok()
        .and_then(|value| bms_feed::parse_bool_flag(&value))
        .unwrap_or(false);
    if enabled {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::sink)
            .try_init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    let config = load_config(&args)?;
    let user = args
        .user
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "vecino".to_string());
    if !DEFAULT_DEPARTMENTS.contains(&args.department.as_str()) {
        warn!(event = "unknown_department", department = %args.department);
    }

    let backend = HttpFeedBackend::new(&config.api_base, config.api_token.clone())
        .with_context(|| format!("invalid api base {}", config.api_base))?;
    let mut push = UnixPushConfig::new(&config.push_socket_path);
    push.auth_token = config.api_token.clone();
    let broadcast: Arc<dyn BroadcastPrimitive> = if config.relay_enabled {
        Arc::new(UnixDatagramBus::new(&config.relay_dir))
    } else {
        Arc::new(UnavailableBroadcast)
    };
    let collaborators = FeedCollaborators {
        backend: Arc::new(backend),
        transport: Arc::new(UnixPushTransport::new(push)),
        broadcast,
    };
    info!(
        event = "cli_start",
        api_base = %config.api_base,
        socket = %config.push_socket_path.display(),
        relay_dir = %config.relay_dir.display(),
        user = %user
    );

    let (chat, chat_task) = spawn_feed(FeedKind::Chat, config.clone(), collaborators.clone());
    let (notifications, notification_task) =
        spawn_feed(FeedKind::Notifications, config, collaborators);
    chat.set_scope(Scope::department(args.department.clone()))
        .await
        .context("chat feed stopped")?;
    notifications
        .set_scope(Scope::Notifications)
        .await
        .context("notification feed stopped")?;

    tokio::spawn(render(chat.clone()));
    tokio::spawn(render(notifications.clone()));
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_input(&line) {
            Input::Empty => {}
            Input::Message(text) => {
                if let Err(err) = chat.submit(Payload::chat(user.clone(), text)).await {
                    println!("! {err}");
                }
            }
            Input::Scope(name) => chat.set_scope(Scope::department(name)).await?,
            Input::Notify { kind, message } => {
                let payload = Payload::notification(kind.as_str(), message);
                if let Err(err) = notifications.submit(payload).await {
                    println!("! {err}");
                }
            }
            Input::Retry => {
                chat.retry_push().await?;
                notifications.retry_push().await?;
            }
            Input::Help => print_help(),
            Input::Quit => break,
        }
    }

    let _ = chat.dispose().await;
    let _ = notifications.dispose().await;
    let _ = chat_task.await;
    let _ = notification_task.await;
    Ok(())
}

fn print_help() {
    println!("type a message to send it to the open department");
    println!(
        "  /scope <department>       switch department ({})",
        DEFAULT_DEPARTMENTS.join(", ")
    );
    println!("  /notify <kind> <message>  publish a notification");
    println!("  /retry                    reconnect push after it gave up");
    println!("  /quit");
}

/// Prints what changed between consecutive views of one feed.
async fn render(mut feed: FeedHandle) {
    let mut printer = ViewPrinter::default();
    loop {
        for line in printer.diff(&feed.view()) {
            println!("{line}");
        }
        if !feed.changed().await {
            return;
        }
    }
}

#[derive(Default)]
struct ViewPrinter {
    scope: Option<Scope>,
    connection: Option<ConnectionState>,
    load: Option<LoadState>,
    entries: HashMap<EventId, (bool, bool)>,
    alerts: usize,
    session_reported: bool,
}

impl ViewPrinter {
    fn diff(&mut self, view: &FeedView) -> Vec<String> {
        let tag = view.kind.as_str();
        let mut lines = Vec::new();
        if view.scope != self.scope {
            self.scope = view.scope.clone();
            self.entries.clear();
            self.alerts = 0;
            if let Some(scope) = &view.scope {
                lines.push(format!("[{tag}] == {scope} =="));
            }
        }
        if self.connection != Some(view.connection) {
            self.connection = Some(view.connection);
            lines.push(format!("[{tag}] push {}", view.connection));
        }
        if self.load.as_ref() != Some(&view.load) {
            self.load = Some(view.load.clone());
            if let LoadState::Failed(reason) = &view.load {
                lines.push(format!("[{tag}] could not load: {reason}"));
            }
        }
        for entry in &view.entries {
            let state = (entry.confirmed, entry.failed);
            match self.entries.insert(entry.id.clone(), state) {
                Some(previous) if previous == state => {}
                Some(_) if entry.failed => {
                    lines.push(format!("[{tag}] ! not sent: {}", entry.payload.body()))
                }
                Some(_) => {}
                None => lines.push(format!("[{tag}] {}", render_entry(entry))),
            }
        }
        // Confirmation swaps a provisional id for the server one; keep only live ids.
        self.entries
            .retain(|id, _| view.entries.iter().any(|entry| &entry.id == id));
        for alert in view.alerts.iter().skip(self.alerts) {
            lines.push(format!("[{tag}] ! {}", alert.message));
        }
        self.alerts = view.alerts.len();
        if view.session_invalidated && !self.session_reported {
            self.session_reported = true;
            lines.push(format!("[{tag}] ! session expired, log in again"));
        }
        if view.kind == FeedKind::Notifications && !lines.is_empty() {
            lines.push(format!("[{tag}] unread: {}", view.unread()));
        }
        lines
    }
}

fn render_entry(entry: &FeedEntry) -> String {
    let at = entry.created_at.with_timezone(&Local).format("%H:%M");
    let marker = if entry.confirmed { ' ' } else { '~' };
    match &entry.payload {
        Payload::Chat { author, text } => format!("{at}{marker}{author}: {text}"),
        Payload::Notification { kind, message } => {
            format!("{at}{marker}[{}] {message}", kind.label())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn entry(id: EventId, confirmed: bool) -> FeedEntry {
        FeedEntry {
            id,
            payload: Payload::chat("ana", "hola"),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("ts"),
            confirmed,
            failed: false,
        }
    }

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(parse_input("   "), Input::Empty);
        assert_eq!(parse_input("hola"), Input::Message("hola".to_string()));
        assert_eq!(
            parse_input("/scope Tesorería"),
            Input::Scope("Tesorería".to_string())
        );
        assert_eq!(
            parse_input("/notify multa ruido en el 3B"),
            Input::Notify {
                kind: "multa".to_string(),
                message: "ruido en el 3B".to_string()
            }
        );
        assert_eq!(parse_input("/notify multa"), Input::Help);
        assert_eq!(parse_input("/scope"), Input::Help);
        assert_eq!(parse_input("/retry"), Input::Retry);
        assert_eq!(parse_input("/quit"), Input::Quit);
    }

    #[test]
    fn printer_reports_only_new_entries_and_state_changes() {
        let mut printer = ViewPrinter::default();
        let mut view = FeedView::empty(FeedKind::Chat);
        view.scope = Some(Scope::department("Admin"));
        view.entries = vec![entry(EventId::Server("1".to_string()), true)];

        let lines = printer.diff(&view);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("department:Admin"));
        assert!(lines[1].contains("push idle"));
        assert!(lines[2].ends_with("ana: hola"));

        assert!(printer.diff(&view).is_empty());

        view.connection = ConnectionState::Failed;
        let lines = printer.diff(&view);
        assert_eq!(lines, vec!["[chat] push failed".to_string()]);
    }
}
