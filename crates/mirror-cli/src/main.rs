//! Mirror CLI - command-line entry point
//!
//! Takes a source and a target directory, mirrors the source onto the
//! target once, then keeps watching the source until interrupted.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "mirror")]
#[command(author = "Mirror Contributors")]
#[command(version)]
#[command(
    about = "Keep a target directory an exact mirror of a source directory",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Quiet interval after the first change before re-syncing, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Follow symbolic links in the source tree
    #[arg(long)]
    follow_symlinks: bool,

    /// Directory to watch
    source: PathBuf,

    /// Directory kept identical to the source
    target: PathBuf,
}

impl Cli {
    fn into_options(self) -> commands::MirrorOptions {
        commands::MirrorOptions {
            source: self.source,
            target: self.target,
            config: self.config,
            debounce_ms: self.debounce_ms,
            follow_symlinks: self.follow_symlinks,
        }
    }
}

fn print_usage() {
    println!("{}", Cli::command().render_usage());
    println!(
        "  Example: {}",
        "mirror /path/to/source /path/to/target".cyan()
    );
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(_) => {
            print_usage();
            return;
        }
    };

    // Set up logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(filter)
        .init();

    if let Err(e) = commands::run(cli.into_options()).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_two_positionals_required() {
        assert!(Cli::try_parse_from(["mirror", "only-one"]).is_err());
        assert!(Cli::try_parse_from(["mirror", "a", "b", "c"]).is_err());

        let cli = Cli::try_parse_from(["mirror", "--debounce-ms", "250", "src", "dst"]).unwrap();
        assert_eq!(cli.source, PathBuf::from("src"));
        assert_eq!(cli.target, PathBuf::from("dst"));
        assert_eq!(cli.debounce_ms, Some(250));
    }
}
