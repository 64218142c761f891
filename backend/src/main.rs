//! Tardet backend server.

use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use tardet::relay::SecretCipher;
use tardet::{auth, config::Config, create_app_with_config, state::AppState};

/// Tardet - video surveillance backend with live camera relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for the JSON record store
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Explicit path of the JSON record store (overrides --data-dir)
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// PostgreSQL connection URL; records are stored in the database when set
    #[arg(long, env = "TARDET_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a password from stdin and print its bcrypt hash
    HashPassword,

    /// Generate a fresh key and IV for device credential encryption
    GenKey,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Some(Command::HashPassword) => return print_password_hash(),
        Some(Command::GenKey) => return print_new_key(),
        None => {}
    }

    let config = Config::from_figment(
        args.port,
        args.data_dir,
        args.store_path,
        args.database_url,
    )?;
    let _log_guard = init_logging(&config)?;

    info!("Starting Tardet backend server...");
    info!("Configuration loaded");

    // Initialize GStreamer
    gstreamer::init()?;
    info!("GStreamer initialized");

    run(config)
}

/// Install the tracing subscriber: compact output on stdout and, when a log
/// file is configured, the same events appended to that file.
fn init_logging(config: &Config) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = match &config.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let timer = UtcTime::new(time::format_description::well_known::Rfc3339);

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_timer(timer.clone())
        .compact();

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(directory)?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(path) = &config.log_file {
        info!("Logging to file {}", path.display());
    }
    Ok(guard)
}

#[tokio::main]
async fn run(config: Config) -> anyhow::Result<()> {
    let cipher = config.security.cipher()?;

    // Create application with persistent storage
    let state = match &config.database_url {
        Some(url) => {
            info!("Using PostgreSQL storage");
            AppState::with_postgres_storage(
                url,
                config.auth.clone(),
                cipher,
                config.relay.clone(),
            )
            .await?
        }
        None => {
            info!("Using JSON storage at {}", config.store_path.display());
            AppState::with_json_storage(
                &config.store_path,
                config.auth.clone(),
                cipher,
                config.relay.clone(),
            )
        }
    };
    state.load_from_storage().await?;
    state.bootstrap_admin().await?;

    let app = create_app_with_config(state.clone(), config.cors_origins.clone());

    // Start server - bind to 0.0.0.0 to be accessible from all interfaces (Docker, network, etc.)
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Set up graceful shutdown handler
    let shutdown = state.shutdown_token().clone();
    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down gracefully...");

        // Ends every relay session, which releases its camera source
        shutdown.cancel();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Usage: echo "password" | tardet hash-password
fn print_password_hash() -> anyhow::Result<()> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("No password given on stdin");
    }

    println!("{}", auth::hash_password(password)?);
    Ok(())
}

/// Print a key and IV in the form the config expects.
fn print_new_key() -> anyhow::Result<()> {
    let (key, iv) = SecretCipher::generate().to_base64();
    println!("TARDET_SECURITY_AES_KEY={}", key);
    println!("TARDET_SECURITY_AES_IV={}", iv);
    Ok(())
}
