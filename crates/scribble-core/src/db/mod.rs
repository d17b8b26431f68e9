//! Database layer for Scribble

mod connection;
mod kv_repository;
mod migrations;

pub use connection::Database;
pub use kv_repository::{KvEntry, KvRepository, LibSqlKvRepository};
