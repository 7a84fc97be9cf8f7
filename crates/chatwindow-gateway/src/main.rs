//! Chatwindow: token-budgeted chat completion gateway

use chatwindow_core::{BindMode, ChatConfig};
use chatwindow_gateway::start_gateway;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chatwindow",
    about = "Chat completion gateway that fits history to the model's context window"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway (default)
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
        /// loopback or lan
        #[arg(short, long)]
        bind: Option<String>,
        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Write the effective config (defaults plus environment) as TOML
    InitConfig {
        #[arg(short, long, default_value = "chatwindow.toml")]
        output: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (port, bind, config_path) = match cli.command {
        Some(Commands::Version) => {
            println!("chatwindow v{}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(Commands::InitConfig { output, force }) => {
            if output.exists() && !force {
                anyhow::bail!("{} already exists (use --force)", output.display());
            }
            ChatConfig::default().with_env().save(&output)?;
            println!("Wrote {}", output.display());
            return Ok(());
        }
        Some(Commands::Serve { port, bind, config }) => (port, bind, config),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatwindow=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match config_path {
        Some(path) => ChatConfig::load(&path),
        None => ChatConfig::default(),
    }
    .with_env();

    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(bind) = bind {
        config.gateway.bind = BindMode::parse(&bind);
    }

    start_gateway(config).await
}
