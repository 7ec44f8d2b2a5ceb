//! Core state engine of the delineator incident monitor.
//!
//! This crate owns the authoritative in-memory view of roadside nodes and
//! incidents and derives every node's warning-light state from incident
//! geometry.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `delineator.yaml` into
//!   strongly-typed structs, with environment overrides.
//! - [`geometry`] -- Direction-aware upstream illumination: single-incident
//!   signal computation and multi-incident combination.
//! - [`store`] -- [`EntityStore`]: node/incident maps, delta application,
//!   signal recomputation, snapshots.
//! - [`shared`] -- [`SharedStore`]: lock-protected handle with change
//!   notifications.
//! - [`status`] -- System status aggregation.
//! - [`events`] -- Bounded operator event log.
//!
//! [`EntityStore`]: store::EntityStore
//! [`SharedStore`]: shared::SharedStore

pub mod config;
pub mod events;
pub mod geometry;
pub mod shared;
pub mod status;
pub mod store;

pub use config::{ConfigError, MonitorConfig};
pub use shared::{ChangeKind, SharedStore, StoreChange};
pub use store::{DeltaOutcome, EntityStore, NodeMerge, StoreSettings, StoreSnapshot};
