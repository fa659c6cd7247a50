//! fingerd - the agent runtime broker daemon
//!
//! Boots the runtime, loads the persisted orchestration config (an
//! invalid file is fatal), binds the HTTP and WebSocket ports, and
//! serves until interrupted. Exit codes: 0 on clean shutdown, 1 when a
//! port stays unavailable or the orchestration config is invalid.

use clap::Parser;
use finger_core::system_clock;
use finger_runtime::{
    load_orchestration_config, mock_roles_from_env, AgentRuntime, AgentRuntimeOptions, HubConfig,
};
use finger_server::{env::ServerEnv, http, ws, AppState};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "fingerd", about = "Agent runtime broker daemon")]
struct Cli {
    /// HTTP port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,

    /// WebSocket port (overrides WS_PORT)
    #[arg(long)]
    ws_port: Option<u16>,

    /// Finger home directory (overrides FINGER_HOME)
    #[arg(long)]
    home: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut env = ServerEnv::from_env();
    if let Some(port) = cli.port {
        env.port = port;
    }
    if let Some(ws_port) = cli.ws_port {
        env.ws_port = ws_port;
    }
    if let Some(home) = cli.home {
        env.home = home;
    }

    info!(
        "starting fingerd (http: {}, ws: {}, home: {})",
        env.port,
        env.ws_port,
        env.home.display()
    );

    let runtime = AgentRuntime::new({
        let mut options = AgentRuntimeOptions::new(env.home.clone(), system_clock());
        options.hub_config = HubConfig::from_env();
        options
    });

    let mock_roles = mock_roles_from_env();
    if !mock_roles.is_empty() {
        runtime.register_mock_modules(&mock_roles);
    }

    // An invalid orchestration config at startup is fatal.
    let config_path = env.orchestration_config_path();
    if config_path.exists() {
        match load_orchestration_config(&config_path) {
            Ok(config) => {
                if let Err(err) = runtime.applier.apply(&config) {
                    error!("failed to apply orchestration config: {}", err);
                    return ExitCode::from(1);
                }
                info!("applied orchestration config from {}", config_path.display());
            }
            Err(err) => {
                error!("invalid orchestration config: {}", err);
                return ExitCode::from(1);
            }
        }
    }

    let state = AppState {
        runtime: runtime.clone(),
        env: env.clone(),
    };

    let http_listener = match bind(env.port).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind http port {}: {}", env.port, err);
            return ExitCode::from(1);
        }
    };
    let ws_listener = match bind(env.ws_port).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("failed to bind ws port {}: {}", env.ws_port, err);
            return ExitCode::from(1);
        }
    };

    let lock_sweeper = runtime
        .input_locks
        .spawn_expiry_task(finger_runtime::input_lock::DEFAULT_EXPIRE_SCAN_INTERVAL_MS);

    let http_app = http::router(state.clone());
    let ws_app = ws::router(state);
    let http_server = tokio::spawn(async move { axum::serve(http_listener, http_app).await });
    let ws_server = tokio::spawn(async move { axum::serve(ws_listener, ws_app).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = http_server => {
            error!("http server exited: {:?}", result);
            return ExitCode::from(1);
        }
        result = ws_server => {
            error!("ws server exited: {:?}", result);
            return ExitCode::from(1);
        }
    }

    lock_sweeper.abort();
    runtime.scheduler.shutdown().await;
    info!("fingerd stopped");
    ExitCode::SUCCESS
}

/// Bind a port, retrying once after a short delay so a restart can win
/// the port back from a closing predecessor
async fn bind(port: u16) -> std::io::Result<tokio::net::TcpListener> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => Ok(listener),
        Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
            info!("port {} in use; retrying once", port);
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            tokio::net::TcpListener::bind(addr).await
        }
        Err(err) => Err(err),
    }
}
