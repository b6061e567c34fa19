//! menu-sync: operator command line for the vendor menu.
//!
//! Fetches, imports, bulk-uploads and watches a menu through the
//! `menu-sync` library. Logging goes through `env_logger`; set `RUST_LOG`
//! to adjust verbosity.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use menu_sync::{
    ChannelClient, ChannelEvent, DeleteMarkerPolicy, MenuItem, Reconciler, SyncClient, SyncConfig,
};

/// Command-line arguments for menu-sync
#[derive(Parser, Debug)]
#[command(name = "menu-sync")]
#[command(about = "Sync a vendor menu with its backend")]
#[command(version)]
struct Cli {
    /// Menu collection endpoint
    #[arg(long, env = "MENU_SYNC_BASE_URL")]
    base_url: Option<String>,

    /// Bulk replace endpoint
    #[arg(long, env = "MENU_SYNC_BULK_URL")]
    bulk_url: Option<String>,

    /// Bearer token for the backend and the broadcast channel
    #[arg(long, env = "MENU_SYNC_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Broadcast channel WebSocket URL
    #[arg(long, env = "MENU_SYNC_WS_URL")]
    ws_url: Option<String>,

    /// Apply update responses even when a newer save of the same item is in flight
    #[arg(long)]
    allow_stale: bool,

    /// Keep deletion markers as records instead of removing the item
    #[arg(long)]
    legacy_delete_markers: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the menu as JSON
    Fetch,
    /// Load items from the first sheet of an .xlsx workbook
    Import {
        workbook: PathBuf,
        /// Replace the backend menu with the imported items
        #[arg(long)]
        upload: bool,
    },
    /// Replace the backend menu with the items in a JSON file
    Upload { items: PathBuf },
    /// Write the import template workbook
    Template { out: PathBuf },
    /// Follow the broadcast channel and keep a live copy of the menu
    Watch,
}

/// How long to wait for published frames to reach the channel before exit.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

impl Cli {
    fn config(&self) -> SyncConfig {
        let mut config = match self.base_url {
            Some(ref base) if self.bulk_url.is_none() => SyncConfig::for_base(base.clone()),
            Some(ref base) => SyncConfig {
                base_url: base.clone(),
                ..SyncConfig::default()
            },
            None => SyncConfig::default(),
        };
        if let Some(ref bulk) = self.bulk_url {
            config.bulk_url = bulk.clone();
        }
        config.token = self.token.clone();
        config.ws_url = self.ws_url.clone();
        config.discard_stale_responses = !self.allow_stale;
        if self.legacy_delete_markers {
            config.delete_marker_policy = DeleteMarkerPolicy::Overwrite;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.config();
    info!("Using menu backend at {}", config.base_url);

    match cli.command {
        Command::Template { ref out } => write_template(out).await,
        Command::Fetch => {
            let client = SyncClient::connect_http(&config)?;
            client.fetch_all().await?;
            print_items(&client.items().await)
        }
        Command::Import {
            ref workbook,
            upload,
        } => {
            let bytes = tokio::fs::read(workbook)
                .await
                .with_context(|| format!("Failed to read {}", workbook.display()))?;
            print_items(&import(&config, &bytes, upload).await?)
        }
        Command::Upload { ref items } => {
            let text = tokio::fs::read_to_string(items)
                .await
                .with_context(|| format!("Failed to read {}", items.display()))?;
            print_items(&upload_items(&config, parse_items(&text)?).await?)
        }
        Command::Watch => watch(&config).await,
    }
}

/// A sync client whose published changes also go out on the broadcast
/// channel, when one is configured and reachable.
struct Session {
    client: SyncClient,
    channel: Option<ChannelClient>,
}

impl Session {
    async fn open(config: &SyncConfig) -> Result<Self> {
        let client = SyncClient::connect_http(config)?;

        let channel = match ChannelClient::from_config(config) {
            Some(mut channel) => match channel.connect().await {
                Ok(()) => Some(channel),
                Err(e) => {
                    warn!("Changes will not be broadcast: {e}");
                    None
                }
            },
            None => None,
        };

        let client = match channel {
            Some(ref channel) => client.with_publisher(channel.publisher(config.broadcast_capacity)),
            None => client,
        };
        Ok(Self { client, channel })
    }

    /// Wait for every published frame to be written to the channel.
    async fn finish(&self) {
        let Some(ref channel) = self.channel else {
            return;
        };
        let published = self.client.publisher().stats().messages_sent;
        if !channel.wait_written(published, FLUSH_TIMEOUT).await {
            warn!(
                "Only {} of {published} notifications reached {}",
                channel.frames_written(),
                channel.url()
            );
        }
    }
}

/// Load a workbook into a fresh client and optionally bulk-upload it.
async fn import(config: &SyncConfig, bytes: &[u8], upload: bool) -> Result<Vec<MenuItem>> {
    if !upload {
        let client = SyncClient::connect_http(config)?;
        let count = Reconciler::new(&client).import_workbook(bytes).await?;
        info!("Imported {count} items");
        return Ok(client.items().await);
    }

    let session = Session::open(config).await?;
    let reconciler = Reconciler::new(&session.client);
    let count = reconciler.import_workbook(bytes).await?;
    info!("Imported {count} items");

    let saved = reconciler.upload_all().await?;
    session.finish().await;
    Ok(saved)
}

async fn upload_items(config: &SyncConfig, items: Vec<MenuItem>) -> Result<Vec<MenuItem>> {
    let session = Session::open(config).await?;
    let saved = session.client.bulk_replace(items).await?;
    session.finish().await;
    Ok(saved)
}

async fn write_template(out: &Path) -> Result<()> {
    let bytes = menu_sync::spreadsheet::write_template()?;
    tokio::fs::write(out, bytes)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!("Template written to {}", out.display());
    Ok(())
}

async fn watch(config: &SyncConfig) -> Result<()> {
    let Some(mut channel) = ChannelClient::from_config(config) else {
        bail!("watch needs a broadcast channel URL (--ws-url or MENU_SYNC_WS_URL)");
    };
    let Some(mut events) = channel.take_event_rx() else {
        bail!("Channel events already taken");
    };

    let client = SyncClient::connect_http(config)?;
    if let Err(e) = client.fetch_all().await {
        warn!("Starting from an empty menu: {e}");
    }
    channel.connect().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ChannelEvent::Notification(notification)) => {
                    client.apply_remote(notification).await;
                    info!("Menu now has {} items", client.store().len().await);
                }
                Some(ChannelEvent::Connected) => info!("Watching {}", channel.url()),
                Some(ChannelEvent::Disconnected) | None => {
                    warn!("Broadcast channel closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    Ok(())
}

/// A JSON array of items.
fn parse_items(text: &str) -> Result<Vec<MenuItem>> {
    let items: Vec<MenuItem> = serde_json::from_str(text).context("Expected a JSON array of menu items")?;
    if items.is_empty() {
        bail!("No items to upload");
    }
    Ok(items)
}

fn print_items(items: &[MenuItem]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(items)?);
    Ok(())
}
