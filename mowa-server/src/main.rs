// mowa-server entry point

use clap::Parser;
use mowa_engine::SessionManager;
use mowa_server::http::{self, AppState};
use mowa_server::settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "mowa-server", about = "Real-time avatar conversation server")]
struct Args {
    /// Configuration file (toml/yaml/json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }

    info!("starting mowa-server v{}", env!("CARGO_PKG_VERSION"));
    let manager = Arc::new(SessionManager::new(settings.engine.clone())?);
    manager.start_sweep();
    info!(
        "session manager ready (max {} sessions, {}s timeout)",
        settings.engine.limits.max_sessions, settings.engine.limits.session_timeout_secs
    );

    let state = Arc::new(AppState {
        manager: Arc::clone(&manager),
        started_at: Instant::now(),
    });
    let app = http::router(state);

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(manager))
        .await?;
    Ok(())
}

async fn shutdown_signal(manager: Arc<SessionManager>) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, closing sessions");
    manager.shutdown().await;
}
