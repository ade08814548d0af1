use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::levels::{resolve_level_sequence, HttpLevelList, LevelListProvider};
use server::network::{Server, ServerMessage};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short = 'l', long)]
    listen: Option<String>,

    /// Players needed before the first level starts
    #[arg(short = 'r', long)]
    required_players: Option<usize>,

    /// Wait for every connected client to spawn before starting
    #[arg(long)]
    require_all_players: bool,

    /// Maximum number of players
    #[arg(short = 'm', long)]
    max_players: Option<usize>,

    /// Base URL of the remote level list
    #[arg(long)]
    levels_url: Option<String>,

    /// Comma-separated level sequence used when no remote list is available
    #[arg(long, value_delimiter = ',')]
    levels: Option<Vec<String>>,
}

impl Args {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(required) = self.required_players {
            config.required_players = required;
        }
        if self.require_all_players {
            config.require_all_players = true;
        }
        if let Some(max) = self.max_players {
            config.max_players = max;
        }
        if let Some(url) = self.levels_url {
            config.level_source.url = Some(url);
        }
        if let Some(levels) = self.levels {
            config.level_sequence = levels;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ServerConfig::load(path)?
        }
        None => ServerConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let remote = config.level_source.url.clone().map(HttpLevelList::new);
    let levels = resolve_level_sequence(
        remote.as_ref().map(|p| p as &dyn LevelListProvider),
        config.level_sequence.clone(),
        config.level_fetch_timeout(),
    )
    .await;
    info!("Level sequence: {:?}", levels);

    let mut server = Server::new(&config, levels).await?;

    let control = server.message_sender();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down gracefully...");
                let _ = control.send(ServerMessage::Shutdown);
            }
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    server.run().await?;

    Ok(())
}
