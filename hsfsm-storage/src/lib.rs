//! # hsfsm-storage
//!
//! Store backends for hsfsm.
//!
//! This crate provides:
//! - `MemoryStore`, an in-process store with atomic conditional writes
//! - `SqlStore`, a `sqlx`-backed store (features `sqlite`, `mysql`, `postgres`)

pub mod memory;
#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
pub mod sql;

pub use memory::MemoryStore;
#[cfg(any(feature = "sqlite", feature = "mysql", feature = "postgres"))]
pub use sql::SqlStore;
