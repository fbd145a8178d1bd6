//! Chatsync CLI
//!
//! Runs the sync engine against an in-process reference server.
//!
//! # Commands
//!
//! - `bootstrap` - Run the startup handshake and report its follow-ups
//! - `paginate` - Bootstrap, then page a narrow in both directions

mod commands;
mod realm;

use chatsync_engine::SyncConfig;
use chatsync_protocol::{Anchor, Narrow};
use chatsync_server::Fault;
use clap::{Parser, Subcommand, ValueEnum};
use commands::Format;
use realm::{Realm, RealmOptions};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exercise the chatsync engine against a local server.
#[derive(Parser)]
#[command(name = "chatsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Server version the realm reports
    #[arg(global = true, long, default_value = "5.0")]
    server_version: String,

    /// Number of stream messages to seed
    #[arg(global = true, long, default_value = "250")]
    seed: u64,

    /// Delay added to every request, in milliseconds
    #[arg(global = true, long, default_value = "0")]
    latency_ms: u64,

    /// Require API keys (a valid key is sent unless --api-key is given)
    #[arg(global = true, long)]
    auth: bool,

    /// API key to send
    #[arg(global = true, long)]
    api_key: Option<String>,

    /// Absolute deadline for each resilient call, in seconds
    #[arg(global = true, long, default_value = "60")]
    timeout_secs: u64,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value = "text")]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the startup handshake
    Bootstrap {
        /// Fail this many register calls
        #[arg(long, default_value = "0")]
        fail_register: usize,

        /// Fail this many server settings calls
        #[arg(long, default_value = "0")]
        fail_settings: usize,

        /// Kind of injected failure
        #[arg(long, value_enum, default_value = "unavailable")]
        fault: FaultKind,
    },

    /// Page through a narrow
    Paginate {
        /// Narrow (home, stream:NAME, topic:STREAM/TOPIC, pm:IDS, private, search:TEXT)
        #[arg(short, long, default_value = "home")]
        narrow: Narrow,

        /// Anchor (newest, first_unread or a message id)
        #[arg(short, long, default_value = "first_unread")]
        anchor: Anchor,

        /// Messages per request
        #[arg(long, default_value = "100")]
        page_size: u32,

        /// Maximum pages per direction
        #[arg(long, default_value = "20")]
        max_pages: usize,

        /// Fail this many message fetches
        #[arg(long, default_value = "0")]
        fail_messages: usize,

        /// Kind of injected failure
        #[arg(long, value_enum, default_value = "unavailable")]
        fault: FaultKind,
    },

    /// Show version information
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FaultKind {
    Unavailable,
    Internal,
    Unauthorized,
    BadRequest,
}

impl From<FaultKind> for Fault {
    fn from(kind: FaultKind) -> Self {
        match kind {
            FaultKind::Unavailable => Fault::Unavailable,
            FaultKind::Internal => Fault::Internal,
            FaultKind::Unauthorized => Fault::Unauthorized,
            FaultKind::BadRequest => Fault::BadRequest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let options = RealmOptions {
        server_version: cli.server_version,
        seed_messages: cli.seed,
        latency: Duration::from_millis(cli.latency_ms),
        auth: cli.auth,
        api_key: cli.api_key,
    };
    let config =
        SyncConfig::default().with_request_long_timeout(Duration::from_secs(cli.timeout_secs));

    match cli.command {
        Commands::Bootstrap {
            fail_register,
            fail_settings,
            fault,
        } => {
            let realm = Realm::start(&options, config);
            let faults = commands::bootstrap::BootstrapFaults {
                register: fail_register,
                settings: fail_settings,
                fault: fault.into(),
            };
            commands::bootstrap::run(&realm, faults, cli.format).await?;
        }
        Commands::Paginate {
            narrow,
            anchor,
            page_size,
            max_pages,
            fail_messages,
            fault,
        } => {
            if page_size == 0 {
                return Err("page size must be positive".into());
            }
            let realm = Realm::start(&options, config.with_messages_per_request(page_size));
            let args = commands::paginate::PaginateArgs {
                narrow,
                anchor,
                max_pages,
                fail_messages,
                fault: fault.into(),
            };
            commands::paginate::run(&realm, args, cli.format).await?;
        }
        Commands::Version => {
            println!("Chatsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "Recent PMs fallback below server {}",
                chatsync_engine::MIN_RECENT_PMS_SERVER_VERSION
            );
        }
    }

    Ok(())
}
