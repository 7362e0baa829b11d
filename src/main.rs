use clap::{Parser, Subcommand};
use std::error::Error;

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Peer-to-peer file transfer tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a file or folder to a connecting peer
    Send {
        /// Path to the file or folder to send
        path: String,

        /// Recursively send a folder
        #[arg(short, long)]
        recursive: bool,

        /// Port to listen on
        #[arg(short, long, default_value_t = ferry::DEFAULT_PORT)]
        port: u16,
    },
    /// Connect to a sending peer and download its offer
    Receive {
        /// Address of the sending peer
        address: String,

        /// Port the sender is listening on
        #[arg(short, long, default_value_t = ferry::DEFAULT_PORT)]
        port: u16,

        /// Downloads folder
        #[arg(short, long, default_value = ".")]
        downloads: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // Configure logging based on verbose flag
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
        log::info!("Verbose logging enabled");
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    match cli.command {
        Commands::Send { path, recursive, port } => {
            ferry::commands::send::run(&path, recursive, port).await?;
        }
        Commands::Receive { address, port, downloads } => {
            ferry::commands::receive::run(&address, port, &downloads).await?;
        }
    }

    Ok(())
}
