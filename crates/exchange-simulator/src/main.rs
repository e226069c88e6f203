use anyhow::Context;
use clap::{Parser, ValueEnum};
use exchange_simulator::config::{Config, LogFormat};
use exchange_simulator::logging;
use exchange_simulator::simulator::{serve, serve_metrics, Simulator};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "exchange-simulator", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "EXSIM_CONFIG")]
    config: PathBuf,
    /// Listen address, overriding `listen.address`
    #[arg(short, long, env = "EXSIM_ADDRESS")]
    address: Option<String>,
    /// Log level, overriding `logging.level`
    #[arg(long)]
    log_level: Option<String>,
    /// Log format, overriding `logging.format`
    #[arg(long, value_enum)]
    log_format: Option<LogFormatArg>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;
    if let Some(address) = args.address {
        config.listen.address = address;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format.into();
    }
    let address = config.listen_address()?;

    logging::init(&config.logging)?;

    // reqwest and tungstenite both use rustls; pin the provider once for the process
    let _ = rustls::crypto::ring::default_provider().install_default();

    let simulator = Arc::new(Simulator::from_config(&config).context("Failed to build rules")?);
    let shutdown = CancellationToken::new();

    if config.metrics.enabled {
        let metrics_addr = SocketAddr::new(address.ip(), config.metrics.port);
        let listener = TcpListener::bind(metrics_addr)
            .await
            .with_context(|| format!("Failed to bind metrics listener {metrics_addr}"))?;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(listener, shutdown).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    let server = tokio::spawn(serve(listener, simulator, shutdown.clone()));

    tokio::signal::ctrl_c().await.ok();
    info!("Received Ctrl-C, shutting down");
    shutdown.cancel();

    server.await??;
    Ok(())
}
