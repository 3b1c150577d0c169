use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use dify_relay::{AppConfig, AppState, create_router};

const APP_NAME: &str = "dify_relay";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Relay Dify agent thoughts to clients as Server-Sent Events."
)]
struct Cli {
    /// Path to a TOML config file (defaults to ./dify-relay.toml if present).
    #[arg(long, short = 'c', env = "DIFY_RELAY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to bind, overriding server.host.
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on, overriding server.port.
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Increase logging verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON.
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

fn try_main() -> Result<()> {
    // Missing .env is fine
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_logging(cli.log_level(), cli.json);

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    serve(config)
}

fn init_logging(level: &str, json: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{APP_NAME}={level},tower_http={level}")));

    // Use JSON output if --json flag is set, otherwise human-readable
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
            .ok();
    }
}

#[tokio::main]
async fn serve(config: AppConfig) -> Result<()> {
    let state = AppState::from_config(&config).context("building upstream client")?;
    let app = create_router(state);

    let bind_addr = config.server.bind_addr();
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {bind_addr}"))?;
    let addr = listener.local_addr().context("reading listen address")?;

    info!(
        %addr,
        upstream = %config.upstream.api_url,
        timeout_secs = config.upstream.timeout_secs,
        "dify relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running server")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
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

    info!("shutdown signal received");
}
