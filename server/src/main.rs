use anyhow::Result;
use axum::Router;
use clap::Parser;
use docseek_core::config::{EngineConfig, IndexLayout};
use docseek_server::build_app_from_config;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// Engine configuration file (defaults to $DOCSEEK_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Index path, overriding the configuration
    #[arg(long)]
    index: Option<PathBuf>,
    /// Use the file-based layout, overriding the configuration
    #[arg(long, default_value_t = false)]
    file_based: bool,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(index) = args.index {
        config.index_path = index;
    }
    if args.file_based {
        config.layout = IndexLayout::FileBased;
    }
    let app: Router = build_app_from_config(config)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
