//! Binary entrypoint for the LineBBS CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the server
//! - `init` - create a starter `config.toml`
//! - `status` - print a read-only summary of the checkpointed user directory
//!
//! See the library crate docs for module-level details: `linebbs::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;

use linebbs::config::Config;
use linebbs::server::LineServer;
use linebbs::storage::CheckpointStore;

#[derive(Parser)]
#[command(name = "linebbs")]
#[command(about = "A minimal multi-user line-protocol message server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Start {
        /// Listen address override, e.g. 0.0.0.0:5011
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Initialize a new configuration file
    Init,
    /// Show the checkpointed user directory
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { bind } => {
            let mut config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting LineBBS v{}", env!("CARGO_PKG_VERSION"));

            if let Some(addr) = bind {
                config.server.bind = addr;
            }

            let server = LineServer::bind(config).await?;
            server.run().await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);

            let store = CheckpointStore::new(&config.storage.checkpoint_file);
            let records = store.load()?;
            println!("{} - {} known users", config.metadata.server_name, records.len());
            let mut names: Vec<&String> = records.keys().collect();
            names.sort();
            for name in names {
                let record = &records[name];
                println!(
                    "{} - first login: {}, last active: {}, {} commands, {} messages received",
                    name,
                    record.first_login.to_rfc3339(),
                    record.last_active.to_rfc3339(),
                    record.commands.len(),
                    record.messages_received.len()
                );
            }
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from config, overridden by CLI verbosity
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|c| c.logging.file.clone());
    if let Some(file) = log_file {
        if let Ok(f) = std::fs::OpenOptions::new().create(true).append(true).open(&file) {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));

            // If stdout is a terminal, mirror log lines to the console too.
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        } else {
            builder.format(default_format);
        }
    } else {
        builder.format(default_format);
    }
    let _ = builder.try_init();
}

fn default_format(
    fmt: &mut env_logger::fmt::Formatter,
    record: &log::Record<'_>,
) -> std::io::Result<()> {
    use std::io::Write;
    writeln!(
        fmt,
        "{} [{}] {}",
        chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
        record.level(),
        record.args()
    )
}
