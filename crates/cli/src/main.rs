//! Sotto CLI — the main entry point.
//!
//! Commands:
//! - `onboard` — Write a starter config file
//! - `chat`    — Interactive chat or single-message mode
//! - `status`  — Show configuration and registered tools

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "sotto",
    about = "Sotto — a local, privacy-preserving voice assistant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter configuration to ~/.sotto/config.toml
    Onboard,

    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Resume a specific session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,

        /// Synthesize replies to audio files as well as printing them
        #[arg(long)]
        speak: bool,

        /// Transcribe this audio file and use it as the message
        #[arg(long)]
        audio: Option<std::path::PathBuf>,
    },

    /// Show configuration, providers, and registered tools
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run()?,
        Commands::Chat {
            message,
            session,
            speak,
            audio,
        } => commands::chat::run(message, session, speak, audio).await?,
        Commands::Status => commands::status::run()?,
    }

    Ok(())
}
