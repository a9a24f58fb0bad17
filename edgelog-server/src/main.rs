// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  edgelog: edge-intercepted request logging
//
//  Interceptor: axum middleware, fire-and-forget forwarder
//  Ingestion:   POST /internal/logging -> append-only sink
//  Config:      YAML file + EDGELOG_* env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod app;

use clap::{Parser, Subcommand};
use edgelog_core::{DeploymentProfile, EdgelogConfig};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "edgelog", version, about = "Edge-intercepted request logger")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "edgelog.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the application, interceptor and ingestion endpoint (default).
    Serve,
    /// Print the resources a deployment profile would provision, as YAML.
    Plan {
        #[arg(long)]
        profile: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Tracing ──
    // stderr: stdout carries sink records and rendered plans.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = load_config(&cli.config)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("edgelog")
                .build()?;
            runtime.block_on(serve(config))
        }
        Command::Plan { profile } => plan(&profile),
    }
}

fn load_config(path: &Path) -> anyhow::Result<EdgelogConfig> {
    if path.exists() {
        info!(path = %path.display(), "Loading config file");
        EdgelogConfig::load(path)
    } else {
        info!("No config file found, using defaults");
        let config = EdgelogConfig::default();
        config.validate()?;
        Ok(config)
    }
}

async fn serve(config: EdgelogConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "edgelog starting");

    // Bound first: with port 0 the forwarder needs the assigned port.
    let listener = tokio::net::TcpListener::bind(config.listen_addr()?).await?;
    let addr = listener.local_addr()?;
    let app::Pipeline {
        router,
        sink,
        forwarder,
    } = app::build(&config, addr)?;

    info!(
        addr = %addr,
        ingest_path = %config.ingest.path,
        sink = %sink.describe().path,
        "edgelog is ready"
    );

    // The forwarder posts to this same listener, so it drains before the
    // server stops accepting connections.
    let grace = Duration::from_millis(config.server.shutdown_grace_ms);
    edgelog_ingest::serve(listener, router, async move {
        shutdown_signal().await;
        info!("Shutdown signal received, draining log forwarder");
        if let Some(task) = forwarder {
            task.shutdown(grace).await;
        }
    })
    .await?;

    if let Err(e) = sink.flush() {
        error!(error = %e, "Failed to flush sink");
    }
    info!("edgelog stopped");
    Ok(())
}

fn plan(path: &Path) -> anyhow::Result<()> {
    let profile = DeploymentProfile::load(path)?;
    let resources = profile.plan()?;
    info!(profile = %path.display(), resources = resources.len(), "Deployment plan rendered");
    print!("{}", serde_yaml::to_string(&resources)?);
    Ok(())
}

/// SIGTERM (docker stop) or Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
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
}
