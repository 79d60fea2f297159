//! gaiadb — per-node transactional storage engine for a distributed
//! key-value store backing a SQL layer via a B-tree-style index (§1-§2).
//!
//! This crate wires the workspace's layers (`gaia-core`, `gaia-pendingtx`,
//! `gaia-logmem`, `gaia-wal`, `gaia-scheduler`, `gaia-net`, `gaia-splitter`)
//! into a runnable node: the 2PC participant [`engine::Engine`], the §6.1
//! RPC dispatch table in [`handlers`], node [`config`] parsing, the §6.6
//! admin [`console`], and startup [`recovery`] replay. `main.rs` is
//! intentionally thin — it only opens the configured WAL/disk store,
//! builds an [`engine::Engine`], and starts the RPC listener, console, and
//! splitter-check loop.

#![warn(clippy::all)]

pub mod config;
pub mod console;
pub mod engine;
pub mod handlers;
pub mod recovery;
pub mod wire;

pub use engine::Engine;
