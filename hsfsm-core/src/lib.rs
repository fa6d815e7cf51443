//! # hsfsm-core
//!
//! Transition engine for hsfsm.
//!
//! This crate provides:
//! - Transition table definition and lookup
//! - Conditional statement construction and SQL rendering
//! - The store boundary trait
//! - The engine facade (initialize, current, event)
//! - Configuration loading

pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod statement;
pub mod store;

pub use config::{Config, ConfigError};
pub use definition::{EntityId, State, TransitionRule, TransitionTable, TransitionTableRaw};
pub use engine::{Deadline, Engine, Entity};
pub use error::{CoreError, StoreError};
pub use statement::{
    Branch, Dialect, Layout, RenderedStatement, Statement, StatementBuilder, StatementKind,
};
pub use store::Store;
