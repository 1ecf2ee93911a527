//! Command-line client for a running sqpatch server.

mod client;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client::SqPatchClient;
use serde_json::Value;
use sqpatch_types::{from_snapshot, Channel, SyncStatusResponse};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sqpatch-cli")]
#[command(about = "Manage channels, shows and mixer sync on a sqpatch server")]
struct Cli {
    /// sqpatch server URL
    #[arg(long, env = "SQPATCH_URL", default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the channel list, mixer address and current show
    Status,
    /// Push every channel to the mixer and wait for the result
    Sync {
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 60)]
        timeout: u64,
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 250)]
        interval: u64,
    },
    /// Manage stored shows
    #[command(subcommand)]
    Shows(ShowsCommand),
    /// Write the live channel list to a show file
    Export {
        file: PathBuf,
        /// Name recorded in the file
        #[arg(long)]
        name: Option<String>,
    },
    /// Replace the live channel list with a show file
    Import { file: PathBuf },
}

#[derive(Subcommand, Debug)]
enum ShowsCommand {
    List,
    Save {
        name: String,
        /// Keep the current show unchanged
        #[arg(long)]
        no_current: bool,
    },
    Load {
        name: String,
    },
    Delete {
        name: String,
    },
}

fn channel_line(channel: &Channel) -> String {
    let sockets = match channel.preamp_id_r {
        Some(right) => format!("{} {}+{}", channel.preamp_bus.label(), channel.preamp_id, right),
        None => format!("{} {}", channel.preamp_bus.label(), channel.preamp_id),
    };
    format!(
        "{:>4}  {:<20} {:<12} gain {:>3} dB{}{}",
        channel.id,
        channel.name,
        sockets,
        channel.display_gain(),
        if channel.phantom { "  48V" } else { "" },
        if channel.pad { "  PAD" } else { "" },
    )
}

fn sync_summary(status: &SyncStatusResponse) -> String {
    match &status.last_result {
        Some(result) => match &result.error {
            Some(error) => format!("Synced {} channels, then failed: {}", result.synced, error),
            None => format!("Synced {} channels", result.synced),
        },
        None => "No sync has completed".to_string(),
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = SqPatchClient::new(&cli.url);

    match cli.command {
        Command::Status => {
            let state = client.get_state().await?;
            let sync = client.sync_status().await?;
            println!(
                "Mixer: {}",
                if state.sq_ip.is_empty() {
                    "(not set)"
                } else {
                    &state.sq_ip
                }
            );
            println!(
                "Show:  {}",
                state.current_show.as_deref().unwrap_or("(none)")
            );
            println!(
                "Sync:  {}",
                if sync.status.is_running() {
                    format!("running {}/{}", sync.current, sync.total)
                } else {
                    sync_summary(&sync)
                }
            );
            println!();
            for channel in &state.channels {
                println!("{}", channel_line(channel));
            }
        }
        Command::Sync { timeout, interval } => {
            let started = client.start_sync().await?;
            println!("Sync started for {} channels", started.total);
            let status = client
                .wait_for_sync(
                    Duration::from_millis(interval),
                    Duration::from_secs(timeout),
                )
                .await?;
            println!("{}", sync_summary(&status));
            if let Some(error) = status.last_result.and_then(|r| r.error) {
                anyhow::bail!("sync failed: {}", error);
            }
        }
        Command::Shows(ShowsCommand::List) => {
            let list = client.list_shows().await?;
            for show in &list.shows {
                let marker = if list.current_show.as_deref() == Some(show.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {}", marker, show);
            }
        }
        Command::Shows(ShowsCommand::Save { name, no_current }) => {
            let saved = client.save_show(&name, !no_current).await?;
            println!("Saved show '{}'", saved.name);
        }
        Command::Shows(ShowsCommand::Load { name }) => {
            let loaded = client.load_show(&name).await?;
            print_warnings(&loaded.warnings);
            println!(
                "Loaded show '{}' ({} channels){}",
                loaded.name,
                loaded.channels.len(),
                if loaded.sync_started {
                    ", sync started"
                } else {
                    ""
                }
            );
        }
        Command::Shows(ShowsCommand::Delete { name }) => {
            client.delete_show(&name).await?;
            println!("Deleted show '{}'", name);
        }
        Command::Export { file, name } => {
            let show = client.export(name.as_deref()).await?;
            let json = serde_json::to_string_pretty(&show)?;
            tokio::fs::write(&file, json)
                .await
                .with_context(|| format!("Failed to write {}", file.display()))?;
            println!(
                "Exported {} channels to {}",
                show.channels.len(),
                file.display()
            );
        }
        Command::Import { file } => {
            let contents = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let value: Value = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not valid JSON", file.display()))?;

            // Reject bad files before touching the live channel list
            let state = client.get_state().await?;
            let snapshot = from_snapshot(&value, &state.layout, 1)
                .with_context(|| format!("{} is not a usable show file", file.display()))?;
            tracing::debug!("Validated {} channels locally", snapshot.channels.len());

            let imported = client.import(&value).await?;
            print_warnings(&imported.warnings);
            println!("Imported {} channels", imported.channels.len());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
