//! The watch loop.
//!
//! Blocks until the source tree reports a change, waits out the debounce
//! window, drains whatever else arrived, and runs a reconciliation pass
//! once nothing more is pending and the reconciler is idle. After every
//! pass the watch registry is rebuilt from scratch so that directories
//! created in the meantime get watched.

use crate::error::WatchError;
use crate::event::classify;
use crate::registry::WatchRegistry;
use mirror_core::{MirrorConfig, Reconcile, TreePath};
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Everything that can wake the loop.
#[derive(Debug)]
pub(crate) enum Signal {
    /// A notify callback result, tagged with the registry generation that
    /// produced it.
    Fs {
        generation: u64,
        result: notify::Result<notify::Event>,
    },
    Shutdown,
}

/// Why [`WatchLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A [`ShutdownHandle`] asked the loop to stop.
    Shutdown,
    /// No watched directories remain.
    RegistryEmpty,
    /// The event channel closed while the loop was waiting on it.
    ///
    /// The loop keeps a sender of its own for rebuilding registries, so
    /// the channel stays open for as long as it runs. A wait is normally
    /// interrupted through a [`ShutdownHandle`]; this is only reported if
    /// the channel breaks anyway.
    Disconnected,
}

/// Stops a running [`WatchLoop`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Sender<Signal>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        if self.0.send(Signal::Shutdown).is_err() {
            debug!("Watch loop already stopped");
        }
    }
}

enum Absorbed {
    Change,
    Noise,
    Stale,
    Shutdown,
}

/// Watches a source tree and re-runs the reconciler after changes settle.
pub struct WatchLoop<R: Reconcile> {
    reconciler: Arc<R>,
    source: PathBuf,
    debounce: Duration,
    follow_symlinks: bool,
    tx: Sender<Signal>,
    rx: Receiver<Signal>,
    generation: u64,
}

impl<R: Reconcile> WatchLoop<R> {
    pub fn new(reconciler: Arc<R>, source: impl Into<PathBuf>, config: &MirrorConfig) -> Self {
        let (tx, rx) = channel();
        Self {
            reconciler,
            source: source.into(),
            debounce: config.debounce(),
            follow_symlinks: config.follow_symlinks,
            tx,
            rx,
            generation: 0,
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.tx.clone())
    }

    /// Runs until a [`ShutdownHandle`] stops it or nothing is left to
    /// watch.
    ///
    /// Only fails if the platform watcher itself cannot be created.
    pub fn run(mut self) -> Result<StopReason, WatchError> {
        info!("Watching directory for changes: {}", self.source.display());

        let mut registry = self.build_registry()?;
        loop {
            if registry.is_empty() {
                warn!("Nothing to watch under {}", self.source.display());
                return Ok(StopReason::RegistryEmpty);
            }

            if let Some(reason) = self.watch_until_synced(&mut registry) {
                return Ok(reason);
            }

            // The new registry subscribes before the old one is dropped, so
            // an edit right after the pass is reported by one or the other.
            self.generation += 1;
            registry = self.build_registry()?;
        }
    }

    fn build_registry(&self) -> Result<WatchRegistry, WatchError> {
        WatchRegistry::build(
            &self.source,
            self.generation,
            self.follow_symlinks,
            self.tx.clone(),
        )
    }

    /// Processes bursts against one registry.
    ///
    /// Returns `None` after a pass has run and the registry needs a
    /// rebuild, or the reason to stop.
    fn watch_until_synced(&self, registry: &mut WatchRegistry) -> Option<StopReason> {
        let mut dirty = false;
        let mut carried: Option<Signal> = None;

        loop {
            // A deferred sync must not wait for a further event to be
            // retried, so block with a timeout while one is owed.
            let first = match carried.take() {
                Some(signal) => Some(signal),
                None if dirty => match self.rx.recv_timeout(self.debounce) {
                    Ok(signal) => Some(signal),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return Some(self.interrupted()),
                },
                None => match self.rx.recv() {
                    Ok(signal) => Some(signal),
                    Err(_) => return Some(self.interrupted()),
                },
            };

            if let Some(signal) = first {
                match self.absorb(signal, registry) {
                    Absorbed::Shutdown => return Some(StopReason::Shutdown),
                    Absorbed::Stale => continue,
                    Absorbed::Change => dirty = true,
                    Absorbed::Noise => {}
                }

                // Coalesce a write with the timestamp update that follows it.
                thread::sleep(self.debounce);

                loop {
                    match self.rx.try_recv() {
                        Ok(signal) => match self.absorb(signal, registry) {
                            Absorbed::Shutdown => return Some(StopReason::Shutdown),
                            Absorbed::Change => dirty = true,
                            Absorbed::Noise | Absorbed::Stale => {}
                        },
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => return Some(self.interrupted()),
                    }
                }

                registry.prune_invalid();
                if registry.is_empty() {
                    info!("All watched directories are gone, stopping");
                    return Some(StopReason::RegistryEmpty);
                }
            }

            if !dirty {
                continue;
            }

            match self.rx.try_recv() {
                Ok(signal) => {
                    debug!("More events pending, deferring sync");
                    carried = Some(signal);
                    continue;
                }
                Err(TryRecvError::Disconnected) => return Some(self.interrupted()),
                Err(TryRecvError::Empty) => {}
            }

            if self.reconciler.is_busy() {
                debug!("Synchronization in progress, deferring sync");
                continue;
            }

            let report = self.reconciler.synchronize();
            debug!(
                "Pass finished with {} changes and {} errors, rebuilding watches",
                report.mutations(),
                report.errors
            );
            return None;
        }
    }

    fn absorb(&self, signal: Signal, registry: &WatchRegistry) -> Absorbed {
        let (generation, result) = match signal {
            Signal::Shutdown => {
                info!("Watch loop shutting down");
                return Absorbed::Shutdown;
            }
            Signal::Fs { generation, result } => (generation, result),
        };

        let event = match result {
            Ok(event) => event,
            Err(e) => {
                // Events may have been lost, so treat it as a change.
                warn!("Watch error: {}", e);
                return Absorbed::Change;
            }
        };

        let changes = classify(&event);
        let changed = event.need_rescan() || !changes.is_empty();

        // A change from an earlier generation may have happened after the
        // pass walked past it, so it still owes a pass.
        if generation != registry.generation() {
            if !changed {
                trace!("Dropping {:?} event from watch generation {}", event.kind, generation);
                return Absorbed::Stale;
            }
            debug!("Change reported by watch generation {}", generation);
        }

        for change in &changes {
            let relative = TreePath::relative_to(registry.root(), change.path())
                .map(|rel| rel.to_string())
                .unwrap_or_else(|_| change.path().display().to_string());
            match registry.handle_for(change.path()) {
                Some((handle, _)) => {
                    debug!("A file has been {}: {} ({})", change.verb(), relative, handle)
                }
                None => warn!("Event for unwatched path: {}", change),
            }
        }

        if event.need_rescan() {
            debug!("Watcher asked for a rescan");
        }
        if changed {
            Absorbed::Change
        } else {
            trace!("Ignoring {:?} event", event.kind);
            Absorbed::Noise
        }
    }

    fn interrupted(&self) -> StopReason {
        error!("Event channel closed while waiting, stopping watch loop");
        StopReason::Disconnected
    }
}
