//! Peerclip CLI - LAN clipboard and file sync between two devices.

mod commands;
mod ui;

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use peerclip_core::Config;

#[derive(Parser)]
#[command(name = "peerclip")]
#[command(about = "LAN clipboard and file sync between two devices", long_about = None)]
struct Cli {
    /// Device name to present to peers
    #[arg(short, long, global = true, default_value_t = peerclip_core::default_device_name())]
    name: String,

    /// TCP port to listen on and dial peers at
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Directory for history (default ~/.peerclip)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen, sync the clipboard and print events (default)
    Run {
        /// Connect to this address at startup
        #[arg(long)]
        peer: Option<IpAddr>,
        /// Scan the subnet and connect to the first peer found
        #[arg(long, conflicts_with = "peer")]
        auto: bool,
    },
    /// Scan the local subnet for peers
    Scan,
    /// Show device info
    Info,
    /// Send one file to a peer and wait for its acknowledgment
    SendFile {
        path: PathBuf,
        #[arg(long)]
        peer: IpAddr,
    },
    /// Show recent clipboard and file history
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete all history
    ClearHistory,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::default();
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("peerclip=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    match cli.command.unwrap_or(Commands::Run { peer: None, auto: false }) {
        Commands::Run { peer, auto } => commands::run_service(cli.name, config, peer, auto).await?,
        Commands::Scan => commands::scan(cli.name, config).await,
        Commands::Info => commands::show_info(cli.name, &config),
        Commands::SendFile { path, peer } => commands::send_file(cli.name, config, peer, &path).await?,
        Commands::History { limit } => commands::show_history(&config, limit)?,
        Commands::ClearHistory => commands::clear_history(&config)?,
    }

    Ok(())
}
