//! profilesync - command line client for a cached, offline-tolerant profile.
//!
//! Reads and edits the signed-in user's profile through the sync layer and
//! can watch connectivity, refreshing the profile when the backend comes
//! back.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use profilesync_core::auth::{MemoryTokenStore, SessionTokenStore, TokenStore};
use profilesync_core::models::{ImageUpload, ProfilePatch, ProfileRecord};
use profilesync_core::{
    ApiGateway, ConnectivityMonitor, ProfileHandle, ProfileService, ProfileState, SyncConfig,
    TcpProbe,
};

/// Environment variable supplying a bearer token without a saved session
const TOKEN_ENV: &str = "PROFILESYNC_TOKEN";

/// Log file name prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "profilesync.log";

#[derive(Parser)]
#[command(name = "profilesync", version, about = "Cached, offline-tolerant profile client")]
struct Cli {
    /// Also write logs to a daily file in the cache directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current profile
    Show {
        /// Skip the cache and fetch from the backend
        #[arg(long)]
        refresh: bool,
        /// Print the raw profile JSON
        #[arg(long)]
        json: bool,
    },
    /// Change profile fields
    Update {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        headline: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        about: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Replace the skill list (repeat for several skills)
        #[arg(long = "skill")]
        skills: Vec<String>,
    },
    /// Upload a new profile image
    Upload { path: PathBuf },
    /// Save a bearer token for later commands
    Login {
        #[arg(long)]
        token: String,
    },
    /// Forget the saved bearer token
    Logout,
    /// Show configuration, connectivity and session details
    Status,
    /// Keep the profile in sync, refreshing when connectivity returns
    Watch,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

/// Everything a command needs, wired together.
struct App {
    config: SyncConfig,
    session: Arc<SessionTokenStore>,
    monitor: Arc<ConnectivityMonitor>,
    probe: Option<TcpProbe>,
    handle: ProfileHandle,
}

impl App {
    async fn build(config: SyncConfig, cache_dir: PathBuf) -> Result<Self> {
        let session = Arc::new(SessionTokenStore::new(cache_dir));
        if let Err(e) = session.load() {
            warn!(error = %e, "Failed to load saved session");
        }

        let tokens: Arc<dyn TokenStore> = match std::env::var(TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => {
                info!("Using token from environment");
                Arc::new(MemoryTokenStore::new(Some(token.trim().to_string())))
            }
            _ => session.clone(),
        };

        let probe = TcpProbe::for_base_url(&config.api_base_url, config.probe_interval());
        let initial = match &probe {
            Some(probe) => probe.check().await,
            None => profilesync_core::Connectivity::Online,
        };
        let monitor = Arc::new(ConnectivityMonitor::new(initial));

        let gateway = ApiGateway::new(&config, tokens, monitor.clone())?;
        let service = ProfileService::new(gateway, &config);

        Ok(Self {
            config,
            session,
            monitor,
            probe,
            handle: ProfileHandle::new(service),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match SyncConfig::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config, using defaults: {:#}", e);
            let mut config = SyncConfig::default();
            config.apply_env();
            config
        }
    };
    let cache_dir = config.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));

    let _guard = init_tracing(cli.log_file.then(|| cache_dir.clone()));
    info!(api = %config.api_base_url, "profilesync starting");

    let ctx = App::build(config, cache_dir).await?;

    match cli.command {
        Command::Show { refresh, json } => show(&ctx, refresh, json).await,
        Command::Update {
            full_name,
            headline,
            summary,
            about,
            location,
            skills,
        } => {
            let patch = ProfilePatch {
                full_name,
                headline,
                summary,
                about,
                location,
                skills: if skills.is_empty() { None } else { Some(skills) },
                ..Default::default()
            };
            update(&ctx, patch).await
        }
        Command::Upload { path } => upload(&ctx, &path).await,
        Command::Login { token } => {
            ctx.session.login(token)?;
            println!("Token saved.");
            Ok(())
        }
        Command::Logout => {
            ctx.session.logout()?;
            ctx.handle.service().clear_cache();
            println!("Signed out.");
            Ok(())
        }
        Command::Status => {
            status(&ctx);
            Ok(())
        }
        Command::Watch => watch(ctx).await,
    }
}

async fn show(ctx: &App, refresh: bool, json: bool) -> Result<()> {
    let result = if refresh {
        ctx.handle.refresh().await
    } else {
        ctx.handle.load().await
    };
    let profile = result.context("Failed to load profile")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print_profile(&profile, &ctx.handle.state());
    }
    Ok(())
}

async fn update(ctx: &App, patch: ProfilePatch) -> Result<()> {
    if patch.is_empty() {
        anyhow::bail!("Nothing to update - pass at least one field");
    }
    let profile = ctx
        .handle
        .update(&patch)
        .await
        .context("Failed to update profile")?;
    println!("Profile updated.");
    print_profile(&profile, &ctx.handle.state());
    Ok(())
}

async fn upload(ctx: &App, path: &std::path::Path) -> Result<()> {
    let image = ImageUpload::from_path(path)?;
    let urls = ctx
        .handle
        .upload_image(&image)
        .await
        .context("Failed to upload image")?;
    println!("Image uploaded.");
    println!("  original:  {}", urls.original);
    println!("  thumbnail: {}", urls.thumbnail);
    Ok(())
}

fn status(ctx: &App) {
    println!("API:          {}", ctx.config.api_base_url);
    println!("Connectivity: {}", ctx.monitor.current());
    println!("Cache TTL:    {}s", ctx.config.cache_ttl_secs);
    match ctx.session.session() {
        Some(data) if !data.is_expired() => {
            println!("Session:      active ({}m left)", data.minutes_until_expiry())
        }
        Some(_) => println!("Session:      expired"),
        None => println!("Session:      none"),
    }
}

async fn watch(ctx: App) -> Result<()> {
    let App {
        config,
        monitor,
        probe,
        handle,
        ..
    } = ctx;

    let probe_task = probe.map(|p| p.spawn(monitor.clone()));
    let watcher = handle.spawn_reconnect_watcher();

    let mut rx = handle.subscribe();
    let printer = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let state = rx.borrow_and_update().clone();
            print_state_line(&state);
        }
    });

    // Initial read, then re-read on every probe interval; fresh cache
    // hits cost nothing.
    let mut ticker = tokio::time::interval(config.probe_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // Failures are already reflected in the printed state
                let _ = handle.load().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    watcher.abort();
    printer.abort();
    if let Some(task) = probe_task {
        task.abort();
    }
    Ok(())
}

fn print_profile(profile: &ProfileRecord, state: &ProfileState) {
    println!("{}", profile.display_name());
    if let Some(ref headline) = profile.headline {
        println!("  {}", headline);
    }
    if let Some(ref location) = profile.location {
        println!("  Location: {}", location);
    }
    if !profile.skills.is_empty() {
        println!("  Skills:   {}", profile.skills.join(", "));
    }
    if let Some(ref url) = profile.profile_image_url {
        println!("  Image:    {}", url);
    }
    if state.is_offline() {
        println!("  (offline - showing cached data)");
    }
}

fn print_state_line(state: &ProfileState) {
    if state.loading() {
        return;
    }
    match (&state.error, &state.profile) {
        (Some(e), _) => println!("[error] {}", e),
        (None, Some(profile)) => {
            let tag = if state.is_offline() { " (offline)" } else { "" };
            println!("[profile] {}{}", profile.display_name(), tag);
        }
        (None, None) => {}
    }
}
