//! Upstream communication for the delineator monitor.
//!
//! - [`synchronizer`]: the long-lived stream connection and reconnect loop
//! - [`sse`]: the server-sent events transport it runs over
//! - [`snapshot`]: the one-shot initial state load
//! - [`commands`]: operator command submission
//!
//! All of it talks to the same upstream, configured through
//! [`UpstreamConfig`](delineator_core::config::UpstreamConfig).

pub mod backoff;
pub mod commands;
pub mod error;
pub mod snapshot;
pub mod sse;
pub mod synchronizer;
pub mod transport;

pub use backoff::Backoff;
pub use commands::CommandClient;
pub use error::SyncError;
pub use snapshot::{Snapshot, SnapshotLoader};
pub use sse::{SseDecoder, SseTransport};
pub use synchronizer::{StreamSynchronizer, SyncHandle, SyncState, SyncStats, SyncStatsSnapshot};
pub use transport::{MessageStream, StreamTransport};
