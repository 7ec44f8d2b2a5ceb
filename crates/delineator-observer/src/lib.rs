//! Read-only observer API for the delineator monitor.
//!
//! An Axum server over the monitor's [`SharedStore`] that exposes:
//!
//! - **REST endpoints** for nodes, incidents, the system status and the
//!   operator event log
//! - **`WebSocket` endpoint** (`/ws/updates`) streaming every effective
//!   store change as it happens
//!
//! The observer never mutates the store. Display clients poll the REST
//! endpoints or refetch when a change notification arrives.
//!
//! [`SharedStore`]: delineator_core::SharedStore

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod ws;

pub use router::build_router;
pub use server::{ServerConfig, ServerError};
pub use startup::{ObserverHandle, StartupError, spawn_observer};
pub use state::{AppState, SyncView};
