//! bbs-term - BBS chat client core
//!
//! Manages the auto-response trigger list, saved BBS addresses, the chatlog
//! and profile settings, and runs a live session that answers matching chat
//! lines.

mod config;
mod core;
mod session;
mod storage;
mod transport;

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::core::editor::EDITOR_SLOTS;
use crate::core::{
    AddOutcome, Chatlog, EditorSlots, Favorites, LinkHistory, TriggerEngine, TriggerField,
    TriggerRule, TriggerStore,
};
use crate::storage::FileStore;

#[derive(ClapParser)]
#[command(name = "bbs-term")]
#[command(about = "BBS chat client with automatic trigger responses", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Profile name for profile-specific settings and triggers
    #[arg(long)]
    profile: Option<String>,

    /// Port override for the configured BBS
    #[arg(short, long)]
    port: Option<u16>,

    /// Custom data directory (default: ~/.bbs-term)
    /// Can also be set via BBS_TERM_DIR environment variable
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage trigger/response rules
    Triggers {
        #[command(subcommand)]
        action: TriggerAction,
    },
    /// Show which responses a message would send
    Check {
        /// Incoming chat message
        message: String,
    },
    /// Manage favorite BBS addresses
    Favorites {
        #[command(subcommand)]
        action: FavoriteAction,
    },
    /// Show or clear logged chat messages
    Chatlog {
        #[command(subcommand)]
        action: ChatlogAction,
    },
    /// Show or clear links seen in chat
    Links {
        #[command(subcommand)]
        action: LinksAction,
    },
    /// Save logon credentials (subject to the remember settings)
    Login {
        #[arg(long)]
        username: Option<String>,

        /// Prompt for a password to remember
        #[arg(long)]
        password: bool,
    },
    /// Read BBS output on stdin and write trigger responses to stdout
    Session,
}

#[derive(Subcommand)]
enum TriggerAction {
    /// List stored triggers
    List,
    /// Append a trigger (at most 10)
    Add { trigger: String, response: String },
    /// Remove trigger N (1-based)
    Remove { index: usize },
    /// Change one field of trigger N (1-based)
    Set {
        index: usize,
        #[arg(value_enum)]
        field: FieldArg,
        value: String,
    },
    /// Print the 10 editor rows as "trigger<TAB>response"
    Slots,
    /// Replace all triggers with up to 10 "trigger<TAB>response" rows from stdin
    SaveSlots,
}

#[derive(Subcommand)]
enum FavoriteAction {
    List,
    Add { address: String },
    Remove { address: String },
}

#[derive(Subcommand)]
enum ChatlogAction {
    /// Messages from one sender, or from everyone
    List { sender: Option<String> },
    /// Names with logged messages
    Senders,
    /// Forget one sender's messages
    Clear { sender: String },
}

#[derive(Subcommand)]
enum LinksAction {
    List,
    Clear,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum FieldArg {
    Trigger,
    Response,
}

impl FieldArg {
    fn field(self) -> TriggerField {
        match self {
            FieldArg::Trigger => TriggerField::Trigger,
            FieldArg::Response => TriggerField::Response,
        }
    }
}

/// Convert a 1-based row number from the command line
fn row_index(index: usize) -> Option<usize> {
    index.checked_sub(1)
}

/// Parse one "trigger<TAB>response" editor row
fn parse_slot_row(line: &str) -> TriggerRule {
    match line.split_once('\t') {
        Some((trigger, response)) => TriggerRule::new(trigger, response),
        None => TriggerRule::new(line, ""),
    }
}

fn init_logging() -> Result<()> {
    // Stdout carries outbound messages, so logs go to a file
    let log_path = config::Config::log_path()?;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context(format!("Failed to open log file {:?}", log_path))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false) // No color codes in log file
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set custom data directory before anything resolves paths
    if let Some(data_dir) = &cli.data_dir {
        std::env::set_var(config::DATA_DIR_ENV, data_dir);
    }

    init_logging()?;
    if let Some(data_dir) = &cli.data_dir {
        tracing::info!("Using custom data directory: {:?}", data_dir);
    }

    let profile = cli.profile.as_deref();
    let config = if let Some(config_path) = &cli.config {
        config::Config::load_from_path(config_path, profile, cli.port)?
    } else {
        config::Config::load_with_options(profile, cli.port)?
    };

    let store_dir = config::Config::profile_dir(profile)?;
    let mut backend = FileStore::new(store_dir);

    match cli.command {
        Commands::Triggers { action } => run_triggers(action, TriggerStore::new(backend)),
        Commands::Check { message } => {
            let set = TriggerStore::new(backend).load();
            for response in core::check(&message, &set) {
                println!("{}", response);
            }
            Ok(())
        }
        Commands::Favorites { action } => run_favorites(action, &mut backend),
        Commands::Chatlog { action } => run_chatlog(action, &mut backend),
        Commands::Links { action } => run_links(action, &mut backend),
        Commands::Login { username, password } => run_login(config, username, password),
        Commands::Session => run_session(config, TriggerStore::new(backend)),
    }
}

fn run_triggers(action: TriggerAction, mut store: TriggerStore<FileStore>) -> Result<()> {
    match action {
        TriggerAction::List => {
            let set = store.load();
            if set.is_empty() {
                println!("No triggers defined");
            }
            for (i, rule) in set.iter().enumerate() {
                println!("{:>2}. {:?} -> {:?}", i + 1, rule.trigger, rule.response);
            }
            for hazard in set.feedback_hazards() {
                println!(
                    "⚠ Trigger {} responds with text that fires trigger {}",
                    hazard.source + 1,
                    hazard.fires + 1
                );
            }
        }
        TriggerAction::Add { trigger, response } => {
            match store.add(TriggerRule::new(trigger, response))? {
                AddOutcome::Added { index } => println!("✓ Added trigger {}", index + 1),
                outcome @ AddOutcome::Full => {
                    if let Some(notice) = outcome.notice() {
                        eprintln!("✗ {}", notice);
                    }
                    std::process::exit(1);
                }
            }
        }
        TriggerAction::Remove { index } => {
            let removed = match row_index(index) {
                Some(i) => store.remove_at(i)?,
                None => false,
            };
            if removed {
                println!("✓ Removed trigger {}", index);
            } else {
                println!("No trigger {}", index);
            }
        }
        TriggerAction::Set {
            index,
            field,
            value,
        } => {
            let field = field.field();
            let updated = match row_index(index) {
                Some(i) => store.update_field(i, field, &value)?,
                None => false,
            };
            if updated {
                println!("✓ Trigger {} {} updated", index, field.name());
            } else {
                println!("No trigger {}", index);
            }
        }
        TriggerAction::Slots => {
            let slots = store.load_slots();
            for rule in slots.slots() {
                println!("{}\t{}", rule.trigger, rule.response);
            }
        }
        TriggerAction::SaveSlots => {
            let stdin = std::io::stdin();
            let mut rows = Vec::with_capacity(EDITOR_SLOTS);
            for line in stdin.lock().lines() {
                let line = line.context("Failed to read editor rows")?;
                rows.push(parse_slot_row(&line));
            }
            if rows.len() > EDITOR_SLOTS {
                eprintln!(
                    "⚠ Ignoring {} row(s) beyond the {} editor slots",
                    rows.len() - EDITOR_SLOTS,
                    EDITOR_SLOTS
                );
            }
            store.save_slots(&EditorSlots::from_rows(rows))?;
            println!("Triggers saved!");
        }
    }
    Ok(())
}

fn run_favorites(action: FavoriteAction, backend: &mut FileStore) -> Result<()> {
    let mut favorites = Favorites::load(&*backend);
    match action {
        FavoriteAction::List => {
            for address in favorites.addresses() {
                println!("{}", address);
            }
        }
        FavoriteAction::Add { address } => {
            if favorites.add(&address) {
                favorites.save(backend)?;
                println!("✓ Added {}", address.trim());
            } else {
                println!("Not added (blank or already saved)");
            }
        }
        FavoriteAction::Remove { address } => {
            if favorites.remove(&address) {
                favorites.save(backend)?;
                println!("✓ Removed {}", address.trim());
            } else {
                println!("No favorite {}", address.trim());
            }
        }
    }
    Ok(())
}

fn run_chatlog(action: ChatlogAction, backend: &mut FileStore) -> Result<()> {
    let mut chatlog = Chatlog::load(&*backend);
    match action {
        ChatlogAction::List { sender: Some(sender) } => {
            for entry in chatlog.messages(&sender) {
                println!("{}", entry);
            }
        }
        ChatlogAction::List { sender: None } => {
            let mut all: Vec<&String> = chatlog
                .senders()
                .flat_map(|sender| chatlog.messages(sender))
                .collect();
            // Entries start with their timestamp
            all.sort();
            for entry in all {
                println!("{}", entry);
            }
        }
        ChatlogAction::Senders => {
            for sender in chatlog.senders() {
                println!("{} ({})", sender, chatlog.messages(sender).len());
            }
        }
        ChatlogAction::Clear { sender } => {
            if chatlog.clear_sender(&sender) {
                chatlog.save(backend)?;
                println!("✓ Cleared messages from {}", sender);
            } else {
                println!("No messages from {}", sender);
            }
        }
    }
    Ok(())
}

fn run_links(action: LinksAction, backend: &mut FileStore) -> Result<()> {
    let mut history = LinkHistory::load(&*backend);
    match action {
        LinksAction::List => {
            for link in history.links() {
                println!("{} from {}:", link.timestamp, link.sender);
                println!("{}", link.url);
            }
        }
        LinksAction::Clear => {
            history.clear();
            history.save(backend)?;
            println!("✓ Link history cleared");
        }
    }
    Ok(())
}

fn run_login(mut config: config::Config, username: Option<String>, password: bool) -> Result<()> {
    if !config.settings.remember_username && !config.settings.remember_password {
        bail!("Enable remember_username or remember_password in config.toml first");
    }

    let password = if password {
        Some(rpassword::prompt_password("Password: ").context("Failed to read password")?)
    } else {
        None
    };

    config.remember_credentials(username.as_deref(), password.as_deref());
    config.save()?;
    println!("Settings saved!");
    Ok(())
}

fn run_session(config: config::Config, store: TriggerStore<FileStore>) -> Result<()> {
    // Use tokio runtime for the stdio pump
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async_run_session(config, store))
}

async fn async_run_session(config: config::Config, store: TriggerStore<FileStore>) -> Result<()> {
    use session::Session;
    use tokio::sync::mpsc;
    use transport::{ChannelSink, ServerMessage, StreamConnection};

    let (server_tx, server_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (command_tx, command_rx) = mpsc::unbounded_channel::<String>();

    tracing::info!(
        "Starting session for {}:{}",
        config.connection.host,
        config.connection.port
    );

    let session = Session::new(TriggerEngine::new(store), config, ChannelSink::new(command_tx))?;

    let connection = tokio::spawn(async move {
        if let Err(e) =
            StreamConnection::start(tokio::io::stdin(), tokio::io::stdout(), server_tx, command_rx)
                .await
        {
            tracing::error!(error = ?e, "Session stream error");
        }
    });

    let result = session.run(server_rx).await;

    if result.is_err() {
        connection.abort();
    }
    // Session dropped its sender; the writer drains and exits
    let _ = connection.await;
    std::io::stdout().flush()?;
    result
}
