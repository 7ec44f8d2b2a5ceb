//! Stream synchronizer: connect, apply, reconnect.
//!
//! The synchronizer owns one long-lived connection to the upstream event
//! stream and applies every decoded delta to the [`SharedStore`]. Its state
//! moves `Disconnected -> Connecting -> Streaming`, back to `Disconnected`
//! on any failure, and is published on a [`watch`] channel.
//!
//! # Reconnect policy
//!
//! Retries are unbounded. After a connection fails or ends the retry
//! counter is bumped (capped) and the loop waits per [`Backoff`] before
//! connecting again. Opening a connection resets the counter. The wait is
//! raced against the shutdown signal, so [`SyncHandle::stop`] never waits
//! out a backoff.
//!
//! # Message handling
//!
//! Each message is decoded independently. Undecodable messages are logged
//! and discarded without dropping the connection; keep-alives and unknown
//! types are ignored without taking the store lock. Connects and
//! disconnects are recorded as `system` entries in the operator log.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use delineator_core::config::SyncConfig;
use delineator_core::{ChangeKind, DeltaOutcome, SharedStore};
use delineator_types::{Delta, EventSeverity};

use crate::backoff::Backoff;
use crate::error::SyncError;
use crate::transport::{MessageStream, StreamTransport};

/// Connection state of the synchronizer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No connection. Initial state, and the state while backing off.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and applying deltas.
    Streaming,
}

/// Running counters, updated by the synchronizer task.
#[derive(Debug, Default)]
pub struct SyncStats {
    connects: AtomicU64,
    failed_connects: AtomicU64,
    disconnects: AtomicU64,
    applied: AtomicU64,
    unchanged: AtomicU64,
    ignored: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatsSnapshot {
    /// Connections opened.
    pub connects: u64,
    /// Connection attempts that failed.
    pub failed_connects: u64,
    /// Open connections that ended or failed.
    pub disconnects: u64,
    /// Deltas that changed the store.
    pub applied: u64,
    /// Deltas that changed nothing.
    pub unchanged: u64,
    /// Keep-alive and unrecognized messages.
    pub ignored: u64,
    /// Messages that could not be decoded.
    pub discarded: u64,
}

impl SyncStats {
    /// Copy the current values.
    pub fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            failed_connects: self.failed_connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            unchanged: self.unchanged.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Why a connection stopped being read.
#[derive(Debug)]
enum StreamEnd {
    Shutdown,
    Closed,
    Idle(Duration),
    Failed(SyncError),
}

/// Keeps a [`SharedStore`] in step with the upstream event stream.
#[derive(Debug)]
pub struct StreamSynchronizer<T> {
    transport: T,
    store: SharedStore,
    backoff: Backoff,
    idle_timeout: Option<Duration>,
}

impl<T: StreamTransport> StreamSynchronizer<T> {
    /// Create a synchronizer. Nothing happens until [`start`](Self::start).
    pub fn new(transport: T, store: SharedStore, config: &SyncConfig) -> Self {
        let idle_timeout =
            (config.idle_timeout_ms > 0).then(|| Duration::from_millis(config.idle_timeout_ms));
        Self {
            transport,
            store,
            backoff: Backoff::from_config(config),
            idle_timeout,
        }
    }

    /// Replace the reconnect schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Spawn the synchronization loop on the Tokio runtime.
    pub fn start(self) -> SyncHandle {
        let (state_tx, state_rx) = watch::channel(SyncState::Disconnected);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = Arc::new(SyncStats::default());
        let task = tokio::spawn(self.run(state_tx, shutdown_rx, Arc::clone(&stats)));
        SyncHandle {
            state: state_rx,
            stats,
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }

    async fn run(
        self,
        state: watch::Sender<SyncState>,
        mut shutdown: watch::Receiver<bool>,
        stats: Arc<SyncStats>,
    ) {
        let mut retry: u32 = 0;
        tracing::info!("stream synchronizer started");

        loop {
            state.send_replace(SyncState::Connecting);
            let connected = tokio::select! {
                biased;
                () = stopped(&mut shutdown) => break,
                result = self.transport.connect() => result,
            };

            match connected {
                Ok(stream) => {
                    retry = 0;
                    bump(&stats.connects);
                    state.send_replace(SyncState::Streaming);
                    tracing::info!("event stream connected");
                    self.note(EventSeverity::Info, "Upstream stream connected").await;

                    let end = self.pump(stream, &mut shutdown, &stats).await;
                    bump(&stats.disconnects);
                    let reason = match end {
                        StreamEnd::Shutdown => break,
                        StreamEnd::Closed => {
                            tracing::warn!("event stream closed by upstream");
                            String::from("closed by upstream")
                        }
                        StreamEnd::Idle(after) => {
                            let idle_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX);
                            tracing::warn!(idle_ms, "event stream idle, dropping connection");
                            format!("silent for {idle_ms} ms")
                        }
                        StreamEnd::Failed(e) => {
                            tracing::warn!(error = %e, "event stream failed");
                            e.to_string()
                        }
                    };
                    self.note(
                        EventSeverity::Warning,
                        format!("Upstream stream lost ({reason}), reconnecting"),
                    )
                    .await;
                }
                Err(e) => {
                    bump(&stats.failed_connects);
                    tracing::warn!(error = %e, "event stream connect failed");
                }
            }

            state.send_replace(SyncState::Disconnected);
            retry = self.backoff.next_retry(retry);
            let delay = self.backoff.delay(retry);
            tracing::info!(
                retry,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "reconnecting after backoff"
            );

            tokio::select! {
                biased;
                () = stopped(&mut shutdown) => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        state.send_replace(SyncState::Disconnected);
        tracing::info!("stream synchronizer stopped");
    }

    async fn pump(
        &self,
        mut stream: MessageStream,
        shutdown: &mut watch::Receiver<bool>,
        stats: &SyncStats,
    ) -> StreamEnd {
        loop {
            let next = tokio::select! {
                biased;
                () = stopped(shutdown) => return StreamEnd::Shutdown,
                item = stream.next() => item,
                () = idle(self.idle_timeout) => {
                    return StreamEnd::Idle(self.idle_timeout.unwrap_or_default());
                }
            };
            match next {
                Some(Ok(text)) => self.dispatch(&text, stats).await,
                Some(Err(e)) => return StreamEnd::Failed(e),
                None => return StreamEnd::Closed,
            }
        }
    }

    async fn dispatch(&self, text: &str, stats: &SyncStats) {
        let delta = match Delta::decode(text) {
            Ok(delta) => delta,
            Err(e) => {
                bump(&stats.discarded);
                tracing::warn!(error = %e, "discarding undecodable stream message");
                return;
            }
        };
        if !delta.is_stateful() {
            if let Delta::Unrecognized(kind) = &delta {
                tracing::debug!(kind = %kind, "ignoring unrecognized stream message");
            }
            bump(&stats.ignored);
            return;
        }
        let kind = delta.kind().to_owned();
        match self.store.apply(delta).await {
            DeltaOutcome::Applied => {
                bump(&stats.applied);
                tracing::debug!(kind = %kind, "delta applied");
            }
            DeltaOutcome::Unchanged => {
                bump(&stats.unchanged);
                tracing::debug!(kind = %kind, "delta changed nothing");
            }
            DeltaOutcome::Ignored => bump(&stats.ignored),
        }
    }

    /// Record a connection event in the operator log.
    async fn note(&self, severity: EventSeverity, message: impl Into<String>) {
        let message = message.into();
        self.store
            .mutate(ChangeKind::Other, |store| store.note(severity, message))
            .await;
    }
}

/// Resolves once shutdown has been requested (or the handle is gone).
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // Err means the sender was dropped, which also means stop.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Resolves after `timeout`, or never when the watchdog is disabled.
async fn idle(timeout: Option<Duration>) {
    match timeout {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}

/// Handle to a running synchronizer.
///
/// Dropping the handle aborts the task; [`stop`](Self::stop) shuts it down
/// cleanly and waits for it.
#[derive(Debug)]
pub struct SyncHandle {
    state: watch::Receiver<SyncState>,
    stats: Arc<SyncStats>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// A receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// Wait until the synchronizer reaches `target`. Returns `false` if the
    /// task has exited first.
    pub async fn wait_for(&self, target: SyncState) -> bool {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target).await.is_ok()
    }

    /// Shared counters.
    pub fn stats(&self) -> Arc<SyncStats> {
        Arc::clone(&self.stats)
    }

    /// Stop the synchronizer: cancel any pending backoff, drop any open
    /// connection, and wait for the task to finish. No reconnect is
    /// attempted afterwards.
    pub async fn stop(mut self) -> Result<(), SyncError> {
        self.shutdown.send_replace(true);
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| SyncError::Task(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
