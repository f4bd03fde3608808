mod poller;
mod scheduler;

use clap::{Parser, Subcommand};
use poller::{Poller, PollerSettings, Watch};
use scheduler::Scheduler;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use xrelay_channels::TelegramNotifier;
use xrelay_core::{
    config::{self, Config},
    shellexpand,
    traits::{ImageLookup, Notifier},
};
use xrelay_memory::{AccountCache, Store};
use xrelay_sources::{GoogleImageLookup, XApiSource};

#[derive(Parser)]
#[command(
    name = "xrelay",
    version,
    about = "Relay keyword-matching posts from an X account"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll on a schedule until interrupted.
    Start,
    /// Run a single poll cycle and print the notifications.
    Poll,
    /// Show configuration, window and store state.
    Status,
    /// Checkpoint the WAL and compact the database.
    Maintenance,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;
    let _log_guard = init_logging(&cfg)?;

    match cli.command {
        Commands::Start => {
            if !cfg.scheduler.enabled {
                anyhow::bail!("scheduler is disabled in {}", cli.config);
            }

            let notifiers = build_notifiers(&cfg)?;
            if notifiers.is_empty() {
                warn!("no delivery channel enabled, notifications will only be logged");
            }

            let poller = build_poller(&cfg).await?;
            let scheduler = Scheduler::new(
                poller,
                notifiers,
                watch_from(&cfg),
                Duration::from_secs(cfg.scheduler.poll_interval_secs.max(1)),
            );

            info!("{} starting", cfg.relay.name);
            scheduler
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("failed to listen for shutdown signal: {e}");
                    }
                })
                .await;

            scheduler.poller().store().close().await;
            info!("{} stopped", cfg.relay.name);
        }
        Commands::Poll => {
            let watch = watch_from(&cfg);
            if !watch.is_configured() {
                anyhow::bail!(
                    "monitor.handle and monitor.keywords must be set in {}",
                    cli.config
                );
            }

            let poller = build_poller(&cfg).await?;
            let result = poller.run_cycle(&watch).await;
            poller.store().close().await;

            let notifications = result?;
            if notifications.is_empty() {
                println!("No new matching posts.");
            }
            for n in &notifications {
                match &n.image_url {
                    Some(url) => println!("{}\n  image: {url}", n.message),
                    None => println!("{}", n.message),
                }
            }
        }
        Commands::Status => {
            let window = cfg.window.to_window()?;
            println!("xrelay status\n");
            println!("Config: {}", cli.config);
            println!(
                "Handle: {}",
                if cfg.monitor.handle.is_empty() {
                    "(not set)"
                } else {
                    cfg.monitor.handle.as_str()
                }
            );
            println!("Keywords: {}", cfg.monitor.keywords.join(", "));
            println!(
                "Window: {window} ({})",
                if window.is_now_in_window() {
                    "open"
                } else {
                    "closed"
                }
            );

            let cache = AccountCache::new(shellexpand(&cfg.monitor.account_cache));
            match cache.load() {
                Some(account) => println!(
                    "Account: {} -> {} ({})",
                    account.handle, account.numeric_id, account.display_name
                ),
                None => println!("Account: not resolved yet"),
            }

            let store = Store::new(&cfg.memory).await?;
            let (total, unposted) = store.count_posts().await?;
            println!("Posts: {total} stored, {unposted} unposted");
            println!("Database: {} bytes", store.db_size().await?);
            store.close().await;

            match cfg.channel.telegram {
                Some(ref tg) if tg.enabled && !tg.bot_token.is_empty() => {
                    println!("  telegram: {} chat(s)", tg.chat_ids.len())
                }
                Some(ref tg) if tg.enabled => println!("  telegram: enabled but missing bot_token"),
                Some(_) => println!("  telegram: disabled"),
                None => println!("  telegram: not configured"),
            }
        }
        Commands::Maintenance => {
            let store = Store::new(&cfg.memory).await?;
            let before = store.db_size().await?;
            store.checkpoint().await?;
            store.vacuum().await?;
            let after = store.db_size().await?;
            store.close().await;
            println!("Database compacted: {before} -> {after} bytes");
        }
    }

    Ok(())
}

/// Stderr plus a daily-rolling file under `{data_dir}/logs`.
///
/// `RUST_LOG` wins over `relay.log_level`. The returned guard flushes the
/// file writer on drop.
fn init_logging(cfg: &Config) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = PathBuf::from(shellexpand(&cfg.relay.data_dir)).join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "xrelay.log"));

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.relay.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}

fn watch_from(cfg: &Config) -> Watch {
    Watch {
        handle: cfg.monitor.handle.clone(),
        keywords: cfg.monitor.keywords.clone(),
    }
}

async fn build_poller(cfg: &Config) -> anyhow::Result<Poller> {
    let store = Store::new(&cfg.memory).await?;
    let source = Arc::new(XApiSource::from_config(&cfg.source)?);
    let images: Option<Arc<dyn ImageLookup>> = if cfg.images.enabled {
        Some(Arc::new(GoogleImageLookup::from_config(&cfg.images)?))
    } else {
        None
    };
    let accounts = AccountCache::new(shellexpand(&cfg.monitor.account_cache));

    Ok(Poller::new(
        store,
        source,
        images,
        accounts,
        PollerSettings {
            window: cfg.window.to_window()?,
            batch_size: cfg.monitor.batch_size,
            resolve_attempts: cfg.source.resolve_attempts,
        },
    ))
}

fn build_notifiers(cfg: &Config) -> anyhow::Result<Vec<Arc<dyn Notifier>>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(ref tg) = cfg.channel.telegram {
        if tg.enabled {
            if tg.bot_token.is_empty() {
                anyhow::bail!(
                    "Telegram is enabled but bot_token is empty. \
                     Set it in config.toml or the {} env var.",
                    config::TELEGRAM_TOKEN_ENV
                );
            }
            if tg.chat_ids.is_empty() {
                warn!("telegram: no chat_ids configured, nothing will be sent");
            }
            notifiers.push(Arc::new(TelegramNotifier::new(tg.clone())));
        }
    }

    Ok(notifiers)
}
