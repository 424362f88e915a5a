use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use axum::Router;
use clap::Parser;
use http::{
    Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use anyhow::anyhow;

use dictation_gateway::{ServerConfig, routes, state::AppState};

/// Dictation Gateway - real-time dictation pipeline server
#[derive(Parser, Debug)]
#[command(name = "dictation-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Build the log filter: `--verbose`, then the configured level, then RUST_LOG
fn log_filter(verbose: bool, log_level: Option<&str>) -> anyhow::Result<EnvFilter> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if let Some(level) = log_level {
        EnvFilter::try_new(level).map_err(|e| anyhow!("Invalid log level '{level}': {e}"))?
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Per-connection hyper chatter is never useful at info
    Ok(filter.add_directive("hyper=warn".parse()?))
}

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
            Ok(mut signal) => {
                signal.recv().await;
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Load configuration from file or environment
    let loaded = if let Some(config_path) = &cli.config {
        println!("Loading configuration from {}", config_path.display());
        ServerConfig::from_file(config_path)
    } else {
        ServerConfig::from_env()
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!(
                "Set the API keys and server options in the environment (or a .env file), \
                 or pass a YAML file with --config."
            );
            std::process::exit(1);
        }
    };
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, config.log_level.as_deref())?)
        .init();

    let address = config.address();
    let rate_limit_rps = config.rate_limit_requests_per_second;
    let rate_limit_burst = config.rate_limit_burst_size;
    let cors_origins = config.cors_allowed_origins.clone();
    let drain_timeout = Duration::from_secs_f64(config.shutdown_timeout_seconds);

    // Create application state; refuses to start without a provider per role
    let app_state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let available = app_state.gateway.list_available_providers();
    let current = app_state.gateway.current_providers();
    info!(
        stt = ?available.stt.iter().map(|p| p.value.as_str()).collect::<Vec<_>>(),
        llm = ?available.llm.iter().map(|p| p.value.as_str()).collect::<Vec<_>>(),
        "Providers available"
    );
    info!(
        stt = current.stt.as_deref().unwrap_or("-"),
        llm = current.llm.as_deref().unwrap_or("-"),
        "Default providers"
    );
    println!("Starting server on {address}");

    // Create public health check route
    let public_routes = Router::new().route(
        "/",
        axum::routing::get(dictation_gateway::handlers::api::health_check),
    );

    // Configure rate limiting (disabled when rate >= 100000 for performance testing)
    let governor_layer = if rate_limit_rps < 100000 {
        let governor_config = GovernorConfigBuilder::default()
            .per_second(rate_limit_rps as u64)
            .burst_size(rate_limit_burst)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow!("Invalid rate limiter configuration"))?;
        Some(GovernorLayer::new(governor_config))
    } else {
        println!("Rate limiting disabled (rate >= 100000/s)");
        None
    };

    // Configure CORS
    let cors_layer = if let Some(ref origins) = cors_origins {
        if origins == "*" {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_credentials(false)
        } else {
            // Parse comma-separated origins
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_credentials(true)
        }
    } else {
        info!(
            "CORS not configured, defaulting to same-origin only. \
             Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
        );
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([AUTHORIZATION, CONTENT_TYPE])
            .allow_credentials(false)
    };

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    let app = public_routes
        .merge(routes::api::create_api_router())
        .with_state(app_state.clone())
        .layer(cors_layer)
        .layer(tower::util::option_layer(governor_layer))
        .layer(security_headers);

    // Parse socket address
    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    let listener = TcpListener::bind(&socket_addr).await?;
    println!("Server listening on http://{}", socket_addr);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = stop_rx.await;
        })
        .await
    });

    tokio::select! {
        result = &mut server => {
            result.map_err(|e| anyhow!("Server task failed: {e}"))??;
            return Ok(());
        }
        _ = shutdown_signal() => {}
    }

    // Sessions and connections first, then stop accepting and drain HTTP
    let report = app_state.shutdown_coordinator().shutdown().await;
    if report.sessions_timed_out || report.connections_timed_out {
        warn!(?report, "Shutdown finished with timeouts");
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(drain_timeout, server).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(anyhow!("Server task failed: {e}")),
        Err(_) => warn!(
            timeout_secs = drain_timeout.as_secs_f64(),
            "Timeout draining HTTP requests, forcing exit"
        ),
    }

    Ok(())
}
