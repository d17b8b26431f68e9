//! scribble-core - Core library for Scribble
//!
//! This crate contains the offline-first synchronization engine shared by all
//! Scribble front-ends: the network monitor, the pending change queue, the
//! local mirror store, and the engine that drains the queue against the remote
//! Postgres service.

pub mod config;
pub mod db;
pub mod error;
pub mod mirror;
pub mod models;
pub mod network;
pub mod queue;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
pub use models::{ChangeId, ChangeKind, FolderId, PageId, PendingChange};
