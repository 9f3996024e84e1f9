//! Serve command implementation

use crate::cli::ServeArgs;
use crate::config::{LogFormat, VoltwatchConfig};
use crate::gateway::{create_router, AppState};
use crate::lifecycle::{LifecycleController, ShutdownReport};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &ServeArgs,
) -> Result<VoltwatchConfig, Box<dyn std::error::Error>> {
    // Load from file if it exists, otherwise use defaults
    let mut config = if args.config.exists() {
        VoltwatchConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        VoltwatchConfig::default()
    };

    config = config.with_env_overrides();

    // Apply CLI overrides (highest priority)
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }
    if let Some(ref url) = args.upstream_url {
        config.upstream.url = url.clone();
    }
    if args.lazy_connect {
        config.upstream.connect_on_start = false;
    }

    Ok(config)
}

/// Initialize tracing based on configuration
pub fn init_tracing(
    config: &crate::config::LoggingConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = crate::logging::build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }

    Ok(())
}

/// Build the lifecycle controller, shared state and router for `config`.
pub fn build_app(config: VoltwatchConfig) -> (axum::Router, Arc<AppState>) {
    let lifecycle = Arc::new(LifecycleController::new(&config));
    let app_state = Arc::new(AppState::new(lifecycle, Arc::new(config)));
    let router = create_router(Arc::clone(&app_state));
    (router, app_state)
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Serve `app` on `listener` until `signal` resolves.
///
/// When the signal fires the relay is shut down first, so every dashboard
/// and the upstream link get a close frame, and only then does the HTTP
/// server stop.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: axum::Router,
    state: Arc<AppState>,
    signal: F,
) -> std::io::Result<ShutdownReport>
where
    F: Future<Output = ()> + Send + 'static,
{
    let lifecycle = Arc::clone(&state.lifecycle);
    let (report_tx, mut report_rx) = oneshot::channel();

    let graceful = {
        let lifecycle = Arc::clone(&lifecycle);
        async move {
            signal.await;
            let report = lifecycle.shutdown().await;
            let _ = report_tx.send(report);
        }
    };

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful)
    .await;

    // The server can also stop on an I/O error before any signal arrived
    let report = match report_rx.try_recv() {
        Ok(report) => report,
        Err(_) => lifecycle.shutdown().await,
    };

    served.map(|()| report)
}

/// Main serve command handler
pub async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load and merge configuration
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;

    tracing::info!("Starting Voltwatch relay");
    tracing::debug!(?config, "Loaded configuration");

    // 3. Build relay, upstream connector and router
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let ws_path = config.server.ws_path.clone();
    let connect_on_start = config.upstream.connect_on_start;
    let (app, app_state) = build_app(config);

    // 4. Connect upstream now, or leave it to the first dashboard request
    if connect_on_start {
        app_state.lifecycle.ensure_started();
    } else {
        tracing::info!("Upstream connect deferred until the first dashboard request");
    }

    // 5. Bind and serve
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, ws_path = %ws_path, "Voltwatch relay listening");

    let report = serve_until(listener, app, app_state, shutdown_signal()).await?;

    tracing::info!(
        subscribers_closed = report.subscribers_closed,
        upstream_stopped = report.upstream_stopped,
        "Voltwatch relay stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::LinkState;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn serve_args(config: PathBuf) -> ServeArgs {
        ServeArgs {
            config,
            port: None,
            host: None,
            log_level: None,
            upstream_url: None,
            lazy_connect: false,
        }
    }

    #[tokio::test]
    async fn test_serve_config_loading() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(
            temp.path(),
            "[server]\nws_path = \"/live\"\n\n[relay]\nsubscriber_buffer = 8",
        )
        .unwrap();

        let config = load_config_with_overrides(&serve_args(temp.path().to_path_buf())).unwrap();
        assert_eq!(config.server.ws_path, "/live");
        assert_eq!(config.relay.subscriber_buffer, 8);
    }

    #[tokio::test]
    async fn test_serve_cli_overrides_config() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(
            temp.path(),
            "[server]\nport = 8080\n\n[upstream]\nurl = \"ws://10.1.1.1/ws\"",
        )
        .unwrap();

        let mut args = serve_args(temp.path().to_path_buf());
        args.port = Some(9000);
        args.upstream_url = Some("ws://127.0.0.1:9001/ws".to_string());
        args.lazy_connect = true;

        let config = load_config_with_overrides(&args).unwrap();
        assert_eq!(config.server.port, 9000); // CLI wins
        assert_eq!(config.upstream.url, "ws://127.0.0.1:9001/ws");
        assert!(!config.upstream.connect_on_start);
    }

    #[tokio::test]
    async fn test_serve_works_without_config_file() {
        let config =
            load_config_with_overrides(&serve_args(PathBuf::from("nonexistent.toml"))).unwrap();
        assert_eq!(config.server.ws_path, "/api/websocket"); // Default
        assert_eq!(config.relay.subscriber_buffer, 256);
    }

    #[tokio::test]
    async fn test_serve_until_shuts_relay_down_on_signal() {
        let mut config = VoltwatchConfig::default();
        config.upstream.url = "ws://127.0.0.1:9/ws".to_string();
        config.upstream.reconnect_delay_ms = 50;
        config.server.shutdown_timeout_seconds = 2;

        let (app, state) = build_app(config);
        state.lifecycle.ensure_started();
        let (_subscriber, mut stream) = state.lifecycle.relay().admit(None);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_until(listener, app, Arc::clone(&state), async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let report = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();

        assert_eq!(report.subscribers_closed, 1);
        assert!(report.upstream_stopped);
        assert_eq!(state.lifecycle.link_state(), LinkState::Shutdown);
        assert_eq!(stream.recv().await, None);
    }
}
