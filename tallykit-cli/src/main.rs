//! TallyKit CLI: drives the telemetry pipeline against on-disk storage.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

use commands::{clear, flush, identity, log, queue, Session};

#[derive(Parser)]
#[command(name = "tallykit")]
#[command(about = "Resolve the device identity, enqueue events and flush the TallyKit queue")]
#[command(version)]
struct Cli {
    /// Storage root shared by every app on this machine (default: the user data directory)
    #[arg(long, global = true, env = "TALLYKIT_ROOT")]
    root: Option<PathBuf>,
    /// SDK key: four characters of organization id followed by the secret
    #[arg(long, global = true, env = "TALLYKIT_SDK_KEY", hide_env_values = true)]
    sdk_key: Option<String>,
    /// Bundle identifier the CLI reports as
    #[arg(long, global = true, default_value = "dev.tallykit.cli")]
    bundle_id: String,
    /// Application version the CLI reports as
    #[arg(long, global = true, default_value = env!("CARGO_PKG_VERSION"))]
    app_version: String,
    /// Collector endpoint override
    #[arg(long, global = true, env = "TALLYKIT_COLLECTOR")]
    collector: Option<String>,
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and print the device identity
    Identity,
    /// Build and enqueue an event
    Log {
        /// Event name
        name: String,
        /// Event parameter as key=value, repeatable
        #[arg(short = 'p', long = "param", value_parser = log::parse_parameter)]
        parameters: Vec<(String, String)>,
        /// File whose bytes are sent as the event payload
        #[arg(long)]
        payload: Option<PathBuf>,
        /// Deliver through a renderer that keeps the collector's cookies
        #[arg(long)]
        cookie: bool,
        /// Ask the collector to fingerprint the device
        #[arg(long)]
        fingerprint: bool,
    },
    /// List pending events
    Queue,
    /// Deliver pending events for a bounded time and print the report
    Flush {
        /// Length of the flush window
        #[arg(long, default_value_t = 30)]
        window_secs: u64,
    },
    /// Drop every pending event
    Clear,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let session = Session {
        root: cli.root,
        sdk_key: cli.sdk_key,
        bundle_id: cli.bundle_id,
        app_version: cli.app_version,
        collector: cli.collector,
        json: cli.json,
    };

    match cli.command {
        Commands::Identity => identity::run(&session),
        Commands::Log {
            name,
            parameters,
            payload,
            cookie,
            fingerprint,
        } => log::run(&session, name, parameters, payload, cookie, fingerprint),
        Commands::Queue => queue::run(&session),
        Commands::Flush { window_secs } => flush::run(&session, window_secs).await,
        Commands::Clear => clear::run(&session),
    }
}
