//! Mirror Core - tree reconciliation
//!
//! This crate makes a target directory tree an exact copy of a source
//! directory tree. A pass copies what is missing, rewrites files whose
//! bytes differ, and deletes what the source no longer has. It keeps no
//! state between passes apart from a busy flag that other threads can
//! observe.
//!
//! # Example
//!
//! ```no_run
//! use mirror_core::{MirrorConfig, Reconciler};
//!
//! let reconciler = Reconciler::new("./source", "./target", &MirrorConfig::default());
//! let report = reconciler.synchronize();
//! println!("{} changes, {} errors", report.mutations(), report.errors);
//! ```

pub mod busy;
pub mod config;
pub mod error;
pub mod fsops;
pub mod reconciler;
pub mod tree;

pub use busy::{BusyFlag, BusyGuard};
pub use config::{MirrorConfig, DEFAULT_DEBOUNCE_MS};
pub use error::{Result, SyncError};
pub use reconciler::{Reconcile, Reconciler, SyncReport};
pub use tree::{EntryKind, TreeEntry, TreePath};
