//! CLI command implementation.

use colored::Colorize;
use mirror_core::{MirrorConfig, Reconciler};
use mirror_watcher::{StopReason, WatchLoop};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// What the user asked for on the command line.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub source: PathBuf,
    pub target: PathBuf,
    pub config: Option<PathBuf>,
    pub debounce_ms: Option<u64>,
    pub follow_symlinks: bool,
}

/// Reads the config file, if any, and applies command-line overrides.
pub fn load_config(options: &MirrorOptions) -> Result<MirrorConfig> {
    let mut config = match &options.config {
        Some(path) => MirrorConfig::load(path)?,
        None => MirrorConfig::default(),
    };
    if let Some(ms) = options.debounce_ms {
        config.debounce_ms = ms;
    }
    if options.follow_symlinks {
        config.follow_symlinks = true;
    }
    Ok(config)
}

/// Checks that both roots are existing directories, logging what is wrong.
pub fn validate_roots(source: &Path, target: &Path) -> bool {
    let mut ok = true;
    for (label, path) in [("Source", source), ("Target", target)] {
        if !path.exists() {
            error!("{} directory does not exist: {}", label, path.display());
            ok = false;
        } else if !path.is_dir() {
            error!("{} is not a directory: {}", label, path.display());
            ok = false;
        }
    }
    ok
}

/// Mirrors once, then watches until Ctrl+C or until the watch loop stops.
pub async fn run(options: MirrorOptions) -> Result<()> {
    let config = load_config(&options)?;

    if !validate_roots(&options.source, &options.target) {
        return Ok(());
    }

    let reconciler = Arc::new(Reconciler::new(&options.source, &options.target, &config));

    // Baseline pass before any watch exists.
    let baseline = {
        let reconciler = reconciler.clone();
        tokio::task::spawn_blocking(move || reconciler.synchronize()).await?
    };
    println!(
        "{} Mirrored {} -> {} ({} changes, {} errors)",
        "✓".green(),
        options.source.display(),
        options.target.display(),
        baseline.mutations().to_string().cyan(),
        baseline.errors
    );

    let watch = WatchLoop::new(reconciler, &options.source, &config);
    let shutdown = watch.shutdown_handle();
    let (done_tx, mut done_rx) = oneshot::channel();
    thread::Builder::new()
        .name("mirror-watch".into())
        .spawn(move || {
            let _ = done_tx.send(watch.run());
        })?;

    println!("  Press {} to stop", "Ctrl+C".cyan());

    let stopped = tokio::select! {
        result = &mut done_rx => Some(result),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("Interrupted, stopping watch");
                    shutdown.shutdown();
                }
                Err(e) => warn!("Cannot listen for Ctrl+C: {}", e),
            }
            None
        }
    };
    let stopped = match stopped {
        Some(result) => result,
        None => done_rx.await,
    };

    match stopped?? {
        StopReason::Shutdown => info!("Watch stopped"),
        StopReason::RegistryEmpty => warn!("Watch stopped: nothing left to watch"),
        StopReason::Disconnected => warn!("Watch stopped: event stream closed"),
    }
    Ok(())
}
