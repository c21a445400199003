use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use runsheet_sync::runner::{SyncArgs, run};

#[derive(Parser, Clone)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    Sync {
        /// Path to the JSON configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Spreadsheet name (overrides SPREADSHEET_NAME from the config)
        #[arg(short, long)]
        spreadsheet: Option<String>,

        /// Only sync runs owned by this user
        #[arg(short, long)]
        user: Option<String>,

        /// Minutes between sync ticks
        #[arg(short, long, default_value = "30")]
        interval: u64,

        /// Runs extracted per batch
        #[arg(short, long, default_value = "100")]
        batch_size: usize,

        /// Base name for generated destination tabs
        #[arg(long, default_value = "sync")]
        tab_base: String,

        /// Clear the tab and rewrite the merged history instead of appending
        #[arg(long)]
        rewrite: bool,

        /// Run a single sync and exit
        #[arg(long)]
        once: bool,

        /// Run the first scheduled sync immediately instead of after one interval
        #[arg(long)]
        immediate: bool,

        /// Quiet mode - minimal output, only warnings
        #[arg(short, long)]
        quiet: bool,

        /// Log file path
        #[arg(long, default_value = "runsheet-sync.log")]
        log_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Sync {
            config,
            spreadsheet,
            user,
            interval,
            batch_size,
            tab_base,
            rewrite,
            once,
            immediate,
            quiet,
            log_file,
        } => {
            init_tracing(quiet, &log_file)?;

            run(SyncArgs {
                config_path: config,
                spreadsheet,
                tab_base,
                user,
                batch_size,
                interval: Duration::from_secs(interval * 60),
                rewrite,
                once,
                immediate,
                quiet,
            })
            .await?;
        }
    }
    Ok(())
}

/// Initialize tracing with a console layer and a plain-text log file layer
fn init_tracing(quiet: bool, log_file: &Path) -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if quiet {
        EnvFilter::new("runsheet_sync=warn")
    } else {
        EnvFilter::new("runsheet_sync=info")
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("cannot open log file {}", log_file.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(std::sync::Arc::new(file)))
        .init();

    Ok(())
}
