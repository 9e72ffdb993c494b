//! relaygate CLI - OpenAI-compatible gateway with provider failover.

use anyhow::Context;
use clap::{Parser, Subcommand};
use relaygate::api::{create_router_with_state, AppState};
use relaygate::auth::generate_user_key;
use relaygate::catalog::Catalog;
use relaygate::check::{render_table, run_checks};
use relaygate::config::{Config, LogFormat, LogVerbosity};
use relaygate::http::{create_client_with_timeout, DEFAULT_TIMEOUT};
use relaygate::relay::ProxyTransport;
use relaygate::routing::{RoutingSnapshot, RoutingTable};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "relaygate")]
#[command(about = "OpenAI-compatible gateway that routes and fails over across LLM providers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Routing log verbosity
        #[arg(short, long, value_enum)]
        log_level: Option<LogLevel>,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate the configuration and print a summary
    Validate {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Probe every provider key with its test model
    Check {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate a new user key
    Keygen,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Minimal,
    Compact,
    Verbose,
}

impl From<LogLevel> for LogVerbosity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Minimal => LogVerbosity::Minimal,
            LogLevel::Compact => LogVerbosity::Compact,
            LogLevel::Verbose => LogVerbosity::Verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve {
            port,
            host,
            log_level,
            config,
        }) => {
            run_server(port, host, log_level, config).await?;
        }
        Some(Commands::Config { path, config }) => {
            show_config(path, config)?;
        }
        Some(Commands::Validate { config }) => {
            validate(config)?;
        }
        Some(Commands::Check { config }) => {
            check(config).await?;
        }
        Some(Commands::Keygen) => {
            let key = generate_user_key()
                .map_err(|e| anyhow::anyhow!("OS random source unavailable: {}", e))?;
            println!("{}", key);
        }
        None => {
            // Default: run server
            run_server(None, None, None, None).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(Config::default_path);
    let config = Config::load_from(path.clone())
        .with_context(|| format!("loading {}", path.display()))?
        .with_env_overrides();
    Ok((config, path))
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    let registry = tracing_subscriber::registry().with(filter);
    match config.logging.format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(true)).init(),
    }
}

async fn run_server(
    port_override: Option<u16>,
    host_override: Option<String>,
    log_level: Option<LogLevel>,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (mut config, config_path) = load_config(config_path)?;
    if let Some(level) = log_level {
        config.app.log_verbosity = level.into();
    }
    init_tracing(&config);

    let snapshot = RoutingSnapshot::from_config(&config)?;
    tracing::info!(
        providers = snapshot.catalog.providers().len(),
        models = snapshot.index.len(),
        user_keys = snapshot.catalog.user_key_count(),
        "Routing table loaded from {}",
        config_path.display()
    );
    if snapshot.catalog.user_key_count() == 0 {
        tracing::warn!("No user keys configured; every /v1 request will be rejected");
    }
    let routing = RoutingTable::new(snapshot);

    let host = host_override.unwrap_or_else(|| config.gateway.host.clone());
    let port = port_override.unwrap_or(config.gateway.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", host, port))?;

    let state = AppState::from_config(&config, routing.clone())?;
    let app = create_router_with_state(state);

    let verbosity = config.app.log_verbosity;
    match verbosity {
        LogVerbosity::Minimal => {
            println!("relaygate:{}", port);
        }
        LogVerbosity::Compact => {
            println!("→ relaygate starting on http://{}", addr);
            println!("→ OpenAI-compatible API: http://{}/v1", addr);
        }
        LogVerbosity::Verbose => {
            println!("────────────────────────────────────────");
            println!("relaygate v{}", env!("CARGO_PKG_VERSION"));
            println!("────────────────────────────────────────");
            println!("Gateway:    http://{}", addr);
            println!("API Base:   http://{}/v1", addr);
            println!("Health:     http://{}/health", addr);
            println!("Models:     http://{}/v1/models", addr);
            println!("Config:     {}", config_path.display());
            println!("────────────────────────────────────────");
            println!("Attempts:   {}", config.gateway.attempt_budget());
            println!("Timeout:    {}s", config.gateway.request_timeout_secs);
            println!("Log Level:  {:?}", verbosity);
            println!("────────────────────────────────────────");
        }
    }

    spawn_reload_listener(routing, config_path);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nGateway stopped.");
    Ok(())
}

/// Re-read the config on SIGHUP and swap the routing table.
#[cfg(unix)]
fn spawn_reload_listener(routing: RoutingTable, path: PathBuf) {
    let mut hangup = match signal::unix::signal(signal::unix::SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("Config reload on SIGHUP unavailable: {}", e);
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            tracing::info!("SIGHUP received, reloading {}", path.display());
            let result = Config::load_from(path.clone())
                .map(Config::with_env_overrides)
                .and_then(|config| routing.reload(&config));
            if let Err(e) = result {
                tracing::error!("Reload failed, keeping previous routing table: {}", e);
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_routing: RoutingTable, _path: PathBuf) {}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn show_config(show_path: bool, config_path: Option<PathBuf>) -> anyhow::Result<()> {
    if show_path {
        let path = config_path.unwrap_or_else(Config::default_path);
        println!("{}", path.display());
        return Ok(());
    }

    let (config, _) = load_config(config_path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = load_config(config_path)?;
    tracing_subscriber::fmt().with_target(false).init();

    let snapshot = RoutingSnapshot::from_config(&config)
        .with_context(|| format!("validating {}", path.display()))?;
    let enabled = snapshot.catalog.providers().iter().filter(|p| p.enabled).count();

    println!("Config OK: {}", path.display());
    println!(
        "  providers: {} configured, {} usable, {} enabled",
        config.providers.len(),
        snapshot.catalog.providers().len(),
        enabled
    );
    println!("  models:    {}", snapshot.index.len());
    println!("  user keys: {}", snapshot.catalog.user_key_count());
    Ok(())
}

async fn check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = load_config(config_path)?;
    tracing_subscriber::fmt().with_target(false).init();

    let catalog = Catalog::from_config(&config)?;
    let transport = ProxyTransport::new(create_client_with_timeout(DEFAULT_TIMEOUT)?);

    let rows = run_checks(&config, &catalog, &transport).await;
    print!("{}", render_table(&rows));
    Ok(())
}
