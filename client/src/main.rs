use clap::Parser;
use client::network::{Client, ClientOptions};
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:7777")]
    server: String,

    /// Display name; a random one is assigned if omitted
    #[arg(short = 'n', long)]
    name: Option<String>,

    /// Length of each fade in milliseconds
    #[arg(long, default_value = "500")]
    fade_ms: u64,

    /// Simulated scene load time in milliseconds
    #[arg(long, default_value = "300")]
    load_ms: u64,

    /// Finish every level automatically after this many milliseconds
    #[arg(long)]
    auto_finish_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);

    let options = ClientOptions {
        name: args.name,
        fade: Duration::from_millis(args.fade_ms),
        load: Duration::from_millis(args.load_ms),
        auto_finish: args.auto_finish_ms.map(Duration::from_millis),
        read_stdin: true,
    };

    let mut client = Client::new(&args.server, options).await?;
    client.run().await?;

    info!("{}", client.session().status_line());

    Ok(())
}
