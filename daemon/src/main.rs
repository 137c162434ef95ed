/// Pinion Daemon entry point: the HTTP/streaming boundary for the release
/// and QA workflow engine.
use clap::Parser;
use pinion_daemon::{DaemonConfig, RpcServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pinion-daemon",
    about = "HTTP/streaming server for release and QA workflow chat sessions",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    /// Daemon configuration file path (HTTP bind address, auth)
    #[arg(short, long, value_name = "PATH", help = "Path to daemon configuration file (TOML)")]
    config: Option<PathBuf>,

    /// Workflow engine configuration file path
    #[arg(long, value_name = "PATH", help = "Path to workflow engine configuration file (TOML)")]
    workflow_config: Option<PathBuf>,

    /// HTTP server port
    #[arg(short = 'p', long, value_name = "PORT", help = "HTTP server port (default: 8080)")]
    http_port: Option<u16>,

    /// Enable authentication
    #[arg(long, help = "Enable bearer-token authentication")]
    enable_auth: bool,

    /// JWT secret
    #[arg(long, value_name = "SECRET", help = "JWT secret (required if auth enabled)")]
    jwt_secret: Option<String>,

    /// Log level
    #[arg(short, long, value_name = "LEVEL", default_value = "info", help = "Log level (trace, debug, info, warn, error)")]
    log_level: String,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { &args.log_level };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.parse()?))
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    info!("Starting Pinion Daemon v{}", pinion_daemon::VERSION);

    let mut config = match args.config {
        Some(path) => {
            info!("Loading daemon configuration from: {}", path.display());
            DaemonConfig::load(path.to_str().unwrap())?
        }
        None => {
            info!("Using default daemon configuration");
            DaemonConfig::default()
        }
    };

    if let Some(port) = args.http_port {
        config.server.http_port = port;
    }
    if args.enable_auth {
        config.auth.enabled = true;
        if let Some(secret) = args.jwt_secret {
            config.auth.jwt_secret = secret;
        } else {
            eprintln!("Error: JWT secret required when auth is enabled");
            std::process::exit(1);
        }
    }
    config.validate()?;

    let workflow_config = {
        if let Some(path) = &args.workflow_config {
            info!("Loading workflow configuration from: {}", path.display());
        } else {
            info!("Using default workflow configuration");
        }
        pinion_core::ConfigManager::load(args.workflow_config.as_deref())?.config().clone()
    };

    info!("Server configuration: HTTP {}:{}", config.server.http_addr, config.server.http_port);
    if config.auth.enabled {
        info!("Authentication: ENABLED");
    } else {
        info!("Authentication: DISABLED");
    }

    let registry = Arc::new(pinion_core::WorkflowRegistry::init(&workflow_config));
    let server = RpcServer::new(config, registry)?;

    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let signal_handler = tokio::spawn(async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("failed to install CTRL+C signal handler");
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
            () = ctrl_c => info!("Received CTRL+C signal"),
            () = terminate => info!("Received SIGTERM signal"),
        }

        let _ = tx.send(()).await;
    });

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            eprintln!("Server error: {:?}", e);
        }
    });

    tokio::select! {
        _ = signal_handler => info!("Shutting down daemon..."),
        _ = rx.recv() => info!("Shutting down daemon..."),
        _ = server_handle => info!("Server terminated unexpectedly"),
    }

    info!("Pinion Daemon stopped");
    Ok(())
}
