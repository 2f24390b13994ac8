use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chatkeep_config::{find_config_path, load_config, resolve_root, Config, Rank};
use chatkeep_core::{Message, RecordStatus, RecordStore, Role};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatkeep", about = "Inspect and manage bot user records", version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration and users root
    Status,
    /// List user ids with a record on disk
    List,
    /// Print a user's config document
    Show {
        /// User (chat) id
        id: String,
    },
    /// Print a user's conversation history
    History {
        /// User (chat) id
        id: String,
    },
    /// Append a message to a user's history
    Say {
        /// User (chat) id
        id: String,
        /// Message role: user or assistant
        #[arg(short, long, default_value = "user")]
        role: String,
        /// Message text
        text: String,
    },
    /// Replace the system instruction
    Instruct {
        /// User (chat) id
        id: String,
        /// Instruction text
        text: String,
    },
    /// Activate a named instruction preset
    Preset {
        /// User (chat) id
        id: String,
        /// Preset name
        name: String,
    },
    /// Change a user's rank
    Rank {
        /// User (chat) id
        id: String,
        /// basic, plus, vip or admin
        rank: String,
    },
    /// Record one model request against the usage counters
    Usage {
        /// User (chat) id
        id: String,
        #[arg(long, default_value_t = 0)]
        tokens: u64,
        #[arg(long, default_value_t = 0.0)]
        cost: f64,
    },
    /// Block a user
    Block {
        /// User (chat) id
        id: String,
        /// Unblock instead of block
        #[arg(long)]
        unblock: bool,
    },
    /// Empty a user's history file
    ClearHistory {
        /// User (chat) id
        id: String,
    },
    /// Empty a user's log file
    ClearLog {
        /// User (chat) id
        id: String,
    },
    /// Recreate a user's files with defaults
    Reset {
        /// User (chat) id
        id: String,
    },
    /// Delete a user's record directory
    Remove {
        /// User (chat) id
        id: String,
    },
}

fn main() -> Result<()> {
    let base_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = format!("{base_filter},chatkeep_core=debug");
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(find_config_path);
    let config = load_config(&config_path)?;
    run_command(cli.command, &config_path, &config)
}

fn run_command(command: Commands, config_path: &Path, config: &Config) -> Result<()> {
    let store = &RecordStore::from_config(config);
    match command {
        Commands::Status => run_status(config_path, config)?,
        Commands::List => {
            let ids = store.list_ids()?;
            if ids.is_empty() {
                println!("No user records in {}", store.root().display());
            }
            for id in ids {
                println!("{id}");
            }
        }
        Commands::Show { id } => {
            let record = open_existing(store, &id)?;
            println!("{}", serde_json::to_string_pretty(&record.config()?)?);
        }
        Commands::History { id } => {
            let record = open_existing(store, &id)?;
            let history = record.load_history()?;
            if history.is_empty() {
                println!("(no history)");
            }
            for (i, msg) in history.iter().enumerate() {
                println!("[{i}] {}: {}", msg.role.as_str(), msg.content);
            }
        }
        Commands::Say { id, role, text } => {
            let role = match Role::from_str(&role) {
                Some(Role::System) | None => {
                    bail!("role must be 'user' or 'assistant', got '{role}'")
                }
                Some(r) => r,
            };
            let record = store.open(&id)?;
            let mut history = record.load_history()?;
            history.push(Message::new(role, text));
            let dropped = record.save_history(&history)?;

            let stored = record.load_history()?.len();
            println!(
                "Saved. {stored} message(s) stored, limit {}{}",
                record.history_limit()?,
                if dropped > 0 {
                    format!(", {dropped} oldest dropped")
                } else {
                    String::new()
                }
            );
        }
        Commands::Instruct { id, text } => {
            let record = store.open(&id)?;
            record.set_instruction(&text)?;
            record.info("System instruction updated");
            println!("Instruction set for {id}");
        }
        Commands::Preset { id, name } => {
            let record = store.open(&id)?;
            record.apply_preset(&name)?;
            record.info(&format!("Preset '{name}' applied"));
            println!("Preset '{name}' active for {id}");
        }
        Commands::Rank { id, rank } => {
            let rank = Rank::from_str(&rank)
                .with_context(|| format!("unknown rank '{rank}'"))?;
            let record = open_existing(store, &id)?;
            let mut config = record.config()?;
            config.rank = rank;
            config.is_admin = rank == Rank::Admin;
            record.write_config(&config)?;
            record.info(&format!("Rank changed to {rank}"));
            println!("{id} is now {rank}");
        }
        Commands::Usage { id, tokens, cost } => {
            if !cost.is_finite() || cost < 0.0 {
                bail!("cost must be a finite non-negative number, got {cost}");
            }
            let record = open_existing(store, &id)?;
            let config = record.record_usage(tokens, cost)?;
            println!(
                "Today: {} request(s), {} token(s), cost {:.4}. Lifetime: {} request(s), {} token(s), cost {:.4}",
                config.daily_usage.requests,
                config.daily_usage.tokens,
                config.daily_usage.cost,
                config.lifetime_usage.requests,
                config.lifetime_usage.tokens,
                config.lifetime_usage.cost,
            );
        }
        Commands::Block { id, unblock } => {
            let record = open_existing(store, &id)?;
            record.set_blocked(!unblock)?;
            println!("{id} {}", if unblock { "unblocked" } else { "blocked" });
        }
        Commands::ClearHistory { id } => {
            let record = open_existing(store, &id)?;
            record.clear_history()?;
            println!("History cleared for {id}");
        }
        Commands::ClearLog { id } => {
            let record = open_existing(store, &id)?;
            record.clear_log()?;
            println!("Log cleared for {id}");
        }
        Commands::Reset { id } => {
            let mut record = open_existing(store, &id)?;
            record.reset()?;
            println!("Record {id} reset to defaults");
        }
        Commands::Remove { id } => {
            let record = open_existing(store, &id)?;
            record.remove()?;
            println!("Record {id} removed");
        }
    }
    Ok(())
}

/// Open a record that must already exist; inspection commands never create one.
fn open_existing(store: &RecordStore, id: &str) -> Result<chatkeep_core::UserRecord> {
    if store.status(id)? == RecordStatus::New {
        bail!("no record for user '{id}' in {}", store.root().display());
    }
    Ok(store.open(id)?)
}

fn run_status(config_path: &Path, config: &Config) -> Result<()> {
    println!("chatkeep status");
    println!();

    if config_path.exists() {
        println!("  Config:    {} (found)", config_path.display());
    } else {
        println!("  Config:    {} (not found, using defaults)", config_path.display());
    }

    let root = resolve_root(&config.users.root);
    if root.exists() {
        println!("  Users:     {} (found)", root.display());
    } else {
        println!("  Users:     {} (not created yet)", root.display());
    }
    println!("  File log:  {} and above", config.users.file_log_level);
    println!();

    println!("  History limits:");
    for rank in [Rank::Basic, Rank::Plus, Rank::Vip, Rank::Admin] {
        match config.ranks.history_limits.get(&rank) {
            Some(limit) => println!("    {:<6} {limit}", rank.as_str()),
            None => println!("    {:<6} (missing, saves will fail)", rank.as_str()),
        }
    }
    Ok(())
}
