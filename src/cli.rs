use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "vision-relay", version, about = "Compare vision model outputs through one relay endpoint")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to a dotenv config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Enable trace logging including request/response bodies
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run the relay server in the background
    #[arg(long)]
    pub daemon: bool,

    /// PID file used by --daemon, stop and status
    #[arg(long, default_value = "/tmp/vision-relay.pid")]
    pub pid_file: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stop a daemonized relay
    Stop {
        #[arg(long, default_value = "/tmp/vision-relay.pid")]
        pid_file: PathBuf,
    },
    /// Check whether a daemonized relay is running
    Status {
        #[arg(long, default_value = "/tmp/vision-relay.pid")]
        pid_file: PathBuf,
    },
    /// Send one image and prompt to several models and print each answer
    Compare {
        /// Model to query; repeat for several models
        #[arg(short, long = "model", required = true)]
        models: Vec<String>,

        /// System prompt (the relay default is used when empty)
        #[arg(long, default_value = "")]
        system: String,

        /// User prompt
        #[arg(long, default_value = "")]
        prompt: String,

        /// Image file to analyze
        #[arg(long)]
        image: Option<PathBuf>,

        /// Request streamed output
        #[arg(long)]
        stream: bool,

        /// Relay base URL (overrides RELAY_URL)
        #[arg(long)]
        relay_url: Option<String>,
    },
    /// Run every row of a JSON batch file concurrently
    Batch {
        /// JSON array of rows: {id?, model, stream?, sys_prompt?, user_prompt?, image?}
        file: PathBuf,

        /// Copy the first row's model to all rows
        #[arg(long)]
        sync_model: bool,

        /// Copy the first row's system prompt to all rows
        #[arg(long)]
        sync_system: bool,

        /// Copy the first row's user prompt to all rows
        #[arg(long)]
        sync_user: bool,

        /// Relay base URL (overrides RELAY_URL)
        #[arg(long)]
        relay_url: Option<String>,
    },
}
