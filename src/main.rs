mod api_client;
mod catalog;
mod collector;
mod config;
mod detail_cache;
mod enricher;
mod extractor;
mod fetch;
mod json_store;
mod pacing;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info};

use config::{Config, FailedItemPolicy};

#[derive(Parser)]
#[command(name = "figvault")]
#[command(about = "Harvest LEGO sets and their minifigures from Brickset", long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/figvault/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download every set of the configured themes into one JSON file
    Collect {
        /// Output file (defaults to collector.output_path)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Attach minifigures to collected sets.
    ///
    /// Resumable: resolved sets are kept in the cache file. Do not run two
    /// enrichers against the same cache file at once; the last writer wins.
    Enrich {
        /// Collected sets (defaults to enricher.input_path)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Minifigure cache (defaults to enricher.cache_path)
        #[arg(long)]
        cache: Option<PathBuf>,

        /// Output file (defaults to enricher.output_path)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Do not cache sets whose page failed, so the next run retries them
        #[arg(long)]
        retry_failed: bool,
    },
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config: Config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Collect { output } => {
            let output =
                output.unwrap_or_else(|| PathBuf::from(&config.collector.output_path));
            info!(
                "Collecting {} theme(s): {}",
                config.collector.categories.len(),
                config.collector.categories.join(", ")
            );
            collector::run(&config, &output)?;
        }
        Command::Enrich {
            input,
            cache,
            output,
            retry_failed,
        } => {
            if retry_failed {
                config.enricher.failed_items = FailedItemPolicy::RetryNextRun;
            }
            let input = input.unwrap_or_else(|| PathBuf::from(&config.enricher.input_path));
            let cache = cache.unwrap_or_else(|| PathBuf::from(&config.enricher.cache_path));
            let output = output.unwrap_or_else(|| PathBuf::from(&config.enricher.output_path));
            enricher::run(&config, &input, &cache, &output)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    if let Err(err) = run(cli) {
        error!("{}", err);
        std::process::exit(1);
    }
}
