// Entry point for the proxy-node binary: a protocol-translating reverse
// proxy that accepts both client dialects, routes to a configured upstream
// backend, and translates the response back.

use anyhow::Result as AnyhowResult;
use clap::Parser;
use proxy_node::api::create_router;
use proxy_node::config::{Args, Config};
use proxy_node::core::state::AppState;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, fmt::time::ChronoUtc, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stdout());

    let base_subscriber = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "proxy_node=info,tower_http=info".into()));

    match log_format.as_str() {
        "json" => {
            let json_layer = tracing_bunyan_formatter::JsonStorageLayer;
            let bunyan_layer = tracing_bunyan_formatter::BunyanFormattingLayer::new("proxy_node".into(), non_blocking_writer);
            base_subscriber.with(json_layer).with(bunyan_layer).init();
        }
        _ => {
            let fmt_layer = fmt::layer()
                .with_writer(non_blocking_writer)
                .with_target(false)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_ansi(true)
                .with_timer(ChronoUtc::new("%T%.3f".to_string()))
                .compact();
            base_subscriber.with(fmt_layer).init();
        }
    }

    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info.location().map(|l| format!("{}:{}", l.file(), l.line())).unwrap_or_else(|| "unknown".to_string());
        let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "Box<Any>"
        };
        error!(target: "panic", location = %location, error = %payload, "CRITICAL: Process Panic");
    }));

    let args = Args::parse();
    info!(version = env!("CARGO_PKG_VERSION"), log_format, "Starting proxy-node instance");

    let config = Config::from_env(&args).map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    info!(
        environment = ?config.environment,
        port = config.port,
        upstream_timeout_secs = config.upstream_timeout.as_secs(),
        has_secondary = config.secondary.is_some(),
        "Loaded configuration"
    );

    let port = config.port;
    let cleanup_interval = config.max_conversation_age;
    let state = Arc::new(AppState::new(config).map_err(|e| anyhow::anyhow!("failed to initialize state: {e}"))?);
    state.conversation_manager.start_cleanup_timer(cleanup_interval);

    info!("Starting Axum Web Server...");
    let listen_addr = SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), port);
    info!("Attempting to bind server to address: {}", listen_addr);
    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(l) => {
            info!("Successfully bound server to IPv6 address {}", listen_addr);
            l
        }
        Err(e) => {
            warn!("Failed to bind to IPv6 address {}: {}. Attempting fallback to IPv4.", listen_addr, e);
            let listen_addr_v4 = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
            info!("Retrying bind on IPv4 address {}", listen_addr_v4);
            tokio::net::TcpListener::bind(&listen_addr_v4).await?
        }
    };
    let actual_local_addr = listener.local_addr()?;
    info!("Server listening on: {}", actual_local_addr);

    let app = create_router(state.clone());
    info!("Axum server configured. Listening for connections...");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(graceful_shutdown_signal(state.shutdown.clone()))
        .await?;

    state.conversation_manager.stop();
    info!("Graceful shutdown complete. Exiting process.");
    Ok(())
}

/// Resolves once a Ctrl+C or SIGTERM is received, or once `shutdown` is
/// flipped by other means.
async fn graceful_shutdown_signal(shutdown: Arc<std::sync::atomic::AtomicBool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    info!("Shutdown signal received");
}
