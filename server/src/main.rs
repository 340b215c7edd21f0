use clap::Parser;
use log::{error, info, LevelFilter};
use server::ban_manager::BanManager;
use server::config::Config;
use server::network::Server;
use server::state::ServerState;
use server::{console, events};
use std::path::PathBuf;
use std::sync::Arc;

/// Main-method of the application.
/// Parses command-line arguments, loads configuration and bans, then runs the
/// network server next to the operator console until either stops.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// IP address to bind to, overrides the config file
        #[clap(short = 'H', long)]
        host: Option<String>,
        /// UDP port to listen on, overrides the config file
        #[clap(short, long)]
        port: Option<u16>,
        /// Address advertised to clients
        #[clap(long)]
        public_ip: Option<String>,
        /// JSON configuration file
        #[clap(short, long)]
        config: Option<PathBuf>,
        /// JSON ban list, created on the first ban
        #[clap(short, long, default_value = "bans.json")]
        ban_file: PathBuf,
        /// Log everything down to trace level
        #[clap(short, long)]
        verbose: bool,
        /// Only log errors
        #[clap(short, long, conflicts_with = "verbose")]
        errors_only: bool,
    }

    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Trace
    } else if args.errors_only {
        LevelFilter::Error
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(host) = args.host {
        config.server.listen_ip = host;
    }
    if let Some(port) = args.port {
        config.server.listen_port = port;
    }
    if let Some(public_ip) = args.public_ip {
        config.server.public_ip = public_ip;
    }
    config.validate()?;

    let bans = BanManager::load(&args.ban_file)?;
    let state = Arc::new(ServerState::new(config, bans));

    tokio::spawn(events::log_events(state.events.subscribe()));

    let server = Server::bind(Arc::clone(&state)).await?;
    info!(
        "Advertising {} to clients, type 'help' for console commands",
        state.config.server.public_ip
    );

    let server_handle = tokio::spawn(server.run());
    let console_handle = tokio::spawn(console::run(Arc::clone(&state)));

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            match result {
                Ok(Err(e)) => error!("Server stopped: {}", e),
                Err(e) => error!("Network task panicked: {}", e),
                Ok(Ok(())) => {}
            }
        }
        result = console_handle => {
            if let Err(e) = result {
                error!("Console task panicked: {}", e);
            }
            info!("Console closed, shutting down...");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    if let Err(e) = state.bans.flush().await {
        error!("Failed to save ban list: {}", e);
    }
    Ok(())
}
