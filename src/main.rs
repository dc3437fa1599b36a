use clap::Parser;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tinyurl::config::TinyUrlConfig;
use tinyurl::http::{AppState, TinyUrlServer};
use tinyurl::store;

/// URL shortener with expiring links and per-client rate limiting.
#[derive(Parser, Debug)]
#[command(name = "tinyurl", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "TINYURL_CONFIG")]
    config: Option<String>,

    /// Override the HTTP listen address
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(args.log_json);

    info!("Starting tinyurl service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TinyUrlConfig::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_addr = bind;
    }
    info!(
        bind_addr = %config.server.bind_addr,
        base_url = %config.server.base_url,
        link_expiry_hours = config.links.expiry_hours,
        rate_limit_max = config.rate_limit.max_requests,
        rate_limit_window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    let store = store::connect(&config.store).await?;
    let state = AppState::from_config(store, &config);

    TinyUrlServer::new(config.server.bind_addr, state)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("tinyurl service stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Resolves on Ctrl+C or SIGTERM, after which the server drains its workers.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    };
    info!(signal = received, "Shutdown requested, draining in-flight requests");
}
