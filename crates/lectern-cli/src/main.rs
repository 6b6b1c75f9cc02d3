//! lectern: terminal client for a live classroom room.
//!
//! Connects to the signaling server and exposes the room's chat and
//! whiteboard channels. Media is left to graphical clients.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lectern_common::LecternError;
use lectern_config::{config_to_json, load_config, LecternConfig};
use lectern_live::{LiveConfig, SignalingChannel};

#[derive(Parser)]
#[command(name = "lectern", about = "Live classroom chat and whiteboard client")]
struct Args {
    /// Config file. Defaults to the OS config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Signaling URL, overriding the config file.
    #[arg(long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join a room's chat. Lines read from stdin are sent as messages.
    Chat { room: String },
    /// Print a room's stored chat history.
    History { room: String },
    /// Follow the teacher's whiteboard.
    Watch { room: String },
    /// Print the effective configuration as JSON.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lectern: {e}");
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_filter().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "lectern failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: LecternConfig) -> Result<(), LecternError> {
    if let Command::Config = args.command {
        println!("{}", config_to_json(&config));
        return Ok(());
    }

    let mut live = LiveConfig::from(&config);
    if let Some(url) = args.url {
        live.signaling.url = url;
    }

    let channel = SignalingChannel::new(live.signaling.clone());
    channel.connect();
    channel
        .wait_connected(live.signaling.connect_timeout)
        .await?;
    tracing::info!(url = %live.signaling.display_url(), "Connected to signaling server");

    let result = tokio::select! {
        result = dispatch(&channel, &live, args.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            Ok(())
        }
    };

    channel.disconnect();
    result
}

async fn dispatch(
    channel: &SignalingChannel,
    live: &LiveConfig,
    command: Command,
) -> Result<(), LecternError> {
    match command {
        Command::Chat { room } => commands::chat(channel, live, room.into()).await,
        Command::History { room } => commands::history(channel, live, room.into()).await,
        Command::Watch { room } => commands::watch(channel, live, room.into()).await,
        Command::Config => Ok(()),
    }
}
