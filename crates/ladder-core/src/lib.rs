//! Core types and trait definitions for the ladder reporting hierarchy.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! cycle guard and the tree builder are pure functions over in-memory
//! snapshots so that every backend enforces the same rules.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod assignment;
pub mod audit;
pub mod error;
pub mod graph;
pub mod ids;
pub mod policy;
pub mod role;
pub mod store;
pub mod tree;

pub use error::{Classify, Error, ErrorKind, Result};
