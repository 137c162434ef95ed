/// Thin command-line demo client for the release/QA workflow engine: drives
/// one-shot chat turns in-process, or starts the HTTP/streaming daemon.
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use pinion_core::{AppConfig, ConfigManager, WorkflowRegistry};
use pinion_daemon::handlers;
use pinion_daemon::types::ChatRequest;
use pinion_daemon::{DaemonConfig, RpcServer};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pinion", about = "Release and QA workflow chat engine", version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Workflow engine configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/streaming daemon
    Daemon {
        #[arg(short = 'p', long)]
        http_port: Option<u16>,
    },

    /// Send one chat message, starting or continuing a workflow session
    Chat {
        /// The message text to classify and route
        message: String,
        /// Existing session id to continue, if any
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        repositories: Vec<String>,
        #[arg(long)]
        fix_version: Option<String>,
        #[arg(long)]
        sprint_name: Option<String>,
        #[arg(long)]
        release_type: Option<String>,
    },

    /// Show a workflow's current status
    Status {
        /// Workflow id
        id: String,
    },

    /// List all known workflows
    List,

    /// Print shell completion script
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    if let Commands::Completions { shell } = args.command {
        clap_complete::generate(shell, &mut Args::command(), "pinion", &mut std::io::stdout());
        return Ok(());
    }

    let workflow_config: AppConfig = ConfigManager::load(args.config.as_deref())?.config().clone();

    match args.command {
        Commands::Daemon { http_port } => {
            let mut daemon_config = DaemonConfig::default();
            if let Some(port) = http_port {
                daemon_config.server.http_port = port;
            }
            let registry = Arc::new(WorkflowRegistry::init(&workflow_config));
            let server = RpcServer::new(daemon_config, registry)?;
            server.run().await?;
        }

        Commands::Chat { message, session, repositories, fix_version, sprint_name, release_type } => {
            let registry = WorkflowRegistry::init(&workflow_config);
            let req = ChatRequest {
                message,
                session_id: session,
                repositories: (!repositories.is_empty()).then_some(repositories),
                fix_version,
                sprint_name,
                release_type,
            };
            let response = handlers::handle_chat(&registry, req).await?;
            println!("{} {}", "workflow:".bold(), response.data.workflow_id);
            println!("{} {}", "status:".bold(), response.workflow_status);
            println!("{}", response.message);
        }

        Commands::Status { id } => {
            let registry = WorkflowRegistry::init(&workflow_config);
            let status = handlers::handle_status(&registry, &id)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::List => {
            let registry = WorkflowRegistry::init(&workflow_config);
            let list = handlers::handle_list(&registry);
            println!("{}", serde_json::to_string_pretty(&list)?);
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}
