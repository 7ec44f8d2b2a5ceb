//! The seam between the synchronizer and the wire.

use std::future::Future;

use futures::stream::BoxStream;

use crate::error::SyncError;

/// An open connection: a stream of raw text messages.
///
/// The stream ending means the upstream closed the connection; an `Err`
/// item means it failed. Either way the synchronizer drops it and
/// reconnects.
pub type MessageStream = BoxStream<'static, Result<String, SyncError>>;

/// Something that can open a message stream to the upstream.
///
/// A successful `connect` is the open acknowledgment: the connection is
/// established and messages may follow.
pub trait StreamTransport: Send + Sync + 'static {
    /// Open a new connection.
    fn connect(&self) -> impl Future<Output = Result<MessageStream, SyncError>> + Send;
}
