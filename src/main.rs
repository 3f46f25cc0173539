use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dealboard::config::DealboardConfig;
use dealboard::observability::{LogFormat, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "dealboard")]
#[command(version, about = "Kanban board for CRM deal pipelines")]
pub struct Cli {
    /// Path to a dealboard.toml. Defaults to ./dealboard.toml, then the user config dir.
    #[arg(long, global = true, env = "DEALBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use a built-in in-memory pipeline instead of HubSpot
    #[arg(long, global = true)]
    pub demo: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the proxy server with the board API and notification socket
    Serve {
        /// Port to serve on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Enable dev mode (permissive CORS for a local front-end dev server)
        #[arg(long)]
        dev: bool,

        /// Don't open the browser after the server starts
        #[arg(long)]
        no_open: bool,
    },
    /// Print the board as columns of deals
    Board {
        /// Only show this pipeline
        #[arg(short, long)]
        pipeline: Option<String>,

        /// Only show deals whose name, company or contact contains this text
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Move a deal to another stage
    Move {
        deal_id: String,
        from_stage: String,
        to_stage: String,

        /// Position within the target column
        #[arg(long)]
        index: Option<usize>,
    },
    /// Create a deal
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        pipeline: String,

        #[arg(long)]
        stage: String,

        #[arg(long)]
        amount: Option<i64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default dealboard.toml in the current directory
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = DealboardConfig::resolve(cli.config.as_deref())?;
    init_logging(LogFormat::from_json_flag(cli.log_json || config.logging.json));

    match &cli.command {
        Commands::Serve {
            port,
            host,
            dev,
            no_open,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            config.server.dev_mode |= *dev;
            config.server.open_browser &= !*no_open;
            cmd::cmd_serve(&config, cli.demo).await?;
        }
        Commands::Board { pipeline, search } => {
            let controller = cmd::build_controller(&config, cli.demo)?;
            cmd::cmd_board(&controller, pipeline.clone(), search.as_deref()).await?;
        }
        Commands::Move {
            deal_id,
            from_stage,
            to_stage,
            index,
        } => {
            let controller = cmd::build_controller(&config, cli.demo)?;
            cmd::cmd_move(&controller, deal_id, from_stage, to_stage, *index).await?;
        }
        Commands::Create {
            name,
            pipeline,
            stage,
            amount,
        } => {
            let controller = cmd::build_controller(&config, cli.demo)?;
            cmd::cmd_create(&controller, name, pipeline, stage, *amount).await?;
        }
        Commands::Config { command } => {
            cmd::cmd_config(&config, cli.config.as_deref(), command.clone())?;
        }
    }

    Ok(())
}
