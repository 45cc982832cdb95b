//! Mirror Watcher - change detection
//!
//! This crate handles the live side of mirroring:
//! - Watching every directory under the source root
//! - Debouncing bursts of filesystem events
//! - Re-running the reconciler once things settle, then re-registering
//!   watches so new directories are picked up

mod error;
mod event;
mod registry;
mod watcher;

pub use error::WatchError;
pub use event::{classify, FileChange};
pub use registry::{WatchHandle, WatchRegistry};
pub use watcher::{ShutdownHandle, StopReason, WatchLoop};
