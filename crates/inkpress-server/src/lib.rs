//! Development server for inkpress sites.
//!
//! Serves the output directory over plain HTTP, watches the source tree and
//! drives a single rebuild loop that coalesces bursts of changes.

pub mod rebuild;
pub mod server;
pub mod watcher;

pub use rebuild::{next_batch, rebuild_loop};
pub use server::{BoundServer, DevServer, DevServerConfig, ServerError};
pub use watcher::{FileWatcher, WatchEvent};
