//! ts-check-rs: scoped TypeScript type checking.

mod cli;
mod config;
mod filter;
mod orchestrator;
mod output;
mod paths;

use clap::Parser;
use cli::Args;
use miette::Result;
use tracing::debug;
use tsc_runner::TscRunner;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.debug);

    // Handle tsc version command
    if args.tsc_version {
        let workspace = orchestrator::resolve_workspace(&args.workspace).ok();
        let path = match (&args.tsc, &workspace) {
            (Some(path), Some(root)) => Some(paths::absolute_from(path, root)),
            (Some(path), None) => Some(path.clone()),
            (None, root) => TscRunner::find_tsc(root.as_deref()),
        };
        let Some(path) = path else {
            eprintln!("Error: tsc not found");
            std::process::exit(1);
        };
        match TscRunner::get_tsc_version(&path).await {
            Ok(version) => {
                println!("tsc {}", version);
                println!("path: {}", path);
                if let Some(cache_dir) = TscRunner::get_cache_dir() {
                    println!("cache: {}", cache_dir);
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    // Handle tsc update command
    if let Some(version_opt) = &args.tsc_update {
        let version = version_opt.as_deref();
        match TscRunner::update_tsc(version).await {
            Ok(path) => {
                println!("installed tsc at {}", path);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
    }

    match orchestrator::run(args).await {
        Ok(summary) => {
            if summary.failed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool, debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    debug!("Logging initialized at level: {}", level);
}
