//! In-process store with atomic conditional writes.
//!
//! Each statement is evaluated while holding the row's shard lock, so a
//! transition compares and writes without any window for another writer.
//! Affected-row counts follow MySQL: 1 for an insert, 2 for a changed row,
//! 0 for an update that left the row as it was.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hsfsm_core::{EntityId, State, Statement, StatementKind, Store, StoreError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RowKey {
    table: String,
    id: EntityId,
}

impl RowKey {
    fn of(statement: &Statement) -> Self {
        Self {
            table: statement.layout().table().to_string(),
            id: statement.id().clone(),
        }
    }
}

/// Shared in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// (table, id) -> state.
    rows: DashMap<RowKey, State>,

    /// Statements received, including rejected ones.
    statements: AtomicU64,

    /// Rows whose state was changed by a transition.
    rows_changed: AtomicU64,

    /// Simulated round-trip time, spent before the statement is evaluated.
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a simulated network delay to every statement.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reads a row directly, bypassing statement accounting.
    pub fn get(&self, table: &str, id: &EntityId) -> Option<State> {
        let key = RowKey {
            table: table.to_string(),
            id: id.clone(),
        };
        self.rows.get(&key).map(|r| r.value().clone())
    }

    /// Number of stored rows across all tables.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of statements received.
    pub fn statement_count(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }

    /// Number of transitions that changed a row.
    pub fn rows_changed(&self) -> u64 {
        self.rows_changed.load(Ordering::Relaxed)
    }

    async fn round_trip(&self, statement: &Statement) {
        self.statements.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            table = statement.layout().table(),
            id = %statement.id(),
            operation = statement.operation(),
            "memory statement"
        );
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        self.round_trip(statement).await;
        let key = RowKey::of(statement);

        match statement.kind() {
            StatementKind::Insert { state } => match self.rows.entry(key) {
                Entry::Occupied(slot) => Err(StoreError::DuplicateKey(format!(
                    "{}/{}",
                    slot.key().table,
                    slot.key().id
                ))),
                Entry::Vacant(slot) => {
                    slot.insert(state.clone());
                    Ok(1)
                }
            },

            StatementKind::Transition { initial, branches } => match self.rows.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(initial.clone());
                    Ok(1)
                }
                Entry::Occupied(mut slot) => {
                    let current = slot.get_mut();
                    match branches.iter().find(|b| b.when == *current) {
                        Some(branch) if branch.then != *current => {
                            *current = branch.then.clone();
                            self.rows_changed.fetch_add(1, Ordering::Relaxed);
                            Ok(2)
                        }
                        _ => Ok(0),
                    }
                }
            },

            StatementKind::Read => Err(StoreError::Unsupported(
                "read statements go through query_one".to_string(),
            )),
        }
    }

    async fn query_one(&self, statement: &Statement) -> Result<Option<State>, StoreError> {
        self.round_trip(statement).await;

        match statement.kind() {
            StatementKind::Read => Ok(self
                .rows
                .get(&RowKey::of(statement))
                .map(|r| r.value().clone())),
            _ => Err(StoreError::Unsupported(format!(
                "{} statement passed to query_one",
                statement.operation()
            ))),
        }
    }
}
