use clap::Parser;
use log::info;
use server::config::RosterConfig;
use server::network::{BoxError, Server};
use std::path::PathBuf;

/// Command line arguments; flags override values from the config file
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Start every client with the roster hidden
    #[clap(long)]
    hide_tab: bool,
    /// Hide newly connected clients from everyone else
    #[clap(long)]
    hide_player_join: bool,
    /// Maximum number of connected clients
    #[clap(short, long)]
    max_clients: Option<usize>,
    /// Seconds between full roster re-sends, 0 disables them
    #[clap(short, long)]
    refresh_interval: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RosterConfig::load(path)?,
        None => RosterConfig::default(),
    };
    config.hide_tab |= args.hide_tab;
    config.hide_player_join |= args.hide_player_join;
    if let Some(max_clients) = args.max_clients {
        config.max_clients = max_clients;
    }
    if let Some(secs) = args.refresh_interval {
        config.refresh_interval_secs = secs;
    }

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
