//! ImageStore -- image storage server on Azure Blob Storage.
//!
//! SIGTERM/SIGINT stop accepting connections; in-flight requests get up to
//! `server.shutdown_timeout` seconds to finish.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use imagestore::auth::RequestAuthenticator;
use imagestore::blob_store::BlobStore;
use imagestore::config::{Config, LoggingConfig};
use imagestore::jwt::JwtTokenProvider;
use imagestore::storage::azure::AzureBlobBackend;
use imagestore::storage::backend::BlobBackend;
use imagestore::storage::memory::MemoryBackend;

/// Command-line arguments for the ImageStore server.
#[derive(Parser, Debug)]
#[command(
    name = "imagestore",
    version,
    about = "Image storage server on Azure Blob Storage"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "imagestore.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a bearer token signed with `auth.jwt_secret`, valid for
    /// `auth.token_ttl_secs`.
    IssueToken {
        /// Principal (email) placed in the `sub` claim.
        #[arg(long)]
        principal: String,

        /// Role without the `ROLE_` prefix, e.g. USER or ADMIN.
        #[arg(long, default_value = "USER")]
        role: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = imagestore::config::load_config(&cli.config)?;
    config.apply_env();
    init_tracing(&config.logging);
    info!("Loaded configuration from {}", cli.config);

    if let Some(Command::IssueToken { principal, role }) = &cli.command {
        config.validate_auth()?;
        let token = JwtTokenProvider::from_config(&config.auth).issue(principal, role)?;
        println!("{}", token);
        return Ok(());
    }

    config.validate()?;

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        imagestore::metrics::init_metrics()?;
        imagestore::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let backend = build_backend(&config)?;
    backend.ensure_container().await?;
    info!("Container '{}' ready", config.storage.container_name);

    let tokens = Arc::new(JwtTokenProvider::from_config(&config.auth));

    let state = Arc::new(imagestore::AppState {
        blobs: Arc::new(BlobStore::new(backend, config.storage.sas_validity())),
        authenticator: Arc::new(RequestAuthenticator::new(tokens)),
        config: config.clone(),
    });

    let app = imagestore::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("ImageStore listening on {}", bind_addr);

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::select! {
        result = server => result?,
        _ = drain_deadline(shutdown_timeout) => {
            warn!("In-flight requests did not finish within {:?}", shutdown_timeout);
        }
    }

    info!("ImageStore shut down");

    Ok(())
}

/// Install the global subscriber.  `RUST_LOG` overrides `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Build the blob backend named by `storage.backend`.
fn build_backend(config: &Config) -> anyhow::Result<Arc<dyn BlobBackend>> {
    let storage = &config.storage;
    match storage.backend.as_str() {
        "memory" => {
            info!("Memory storage backend initialized");
            Ok(Arc::new(MemoryBackend::new(storage.container_name.clone())))
        }
        _ => Ok(Arc::new(AzureBlobBackend::from_connection_string(
            &storage.azure.connection_string,
            storage.container_name.clone(),
            storage.request_timeout(),
        )?)),
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}

/// Resolve `timeout` after a shutdown signal arrives; never before.
async fn drain_deadline(timeout: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(timeout).await;
}
