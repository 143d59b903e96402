//! SQLite backend for the ladder reporting hierarchy.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every assignment write is a single
//! `BEGIN IMMEDIATE` transaction: the scope's graph is read, checked and
//! written under SQLite's write lock, so two writers can never both pass the
//! cycle guard against the same snapshot.

mod cache;
mod encode;
mod queries;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
