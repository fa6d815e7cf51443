//! Transition engine - binds a rule table to a store.
//!
//! The engine keeps no per-entity state. Each operation is a single
//! statement sent to the store, so any number of engines in any number of
//! processes can drive the same entities concurrently.

use crate::definition::{EntityId, State, TransitionTable};
use crate::error::{CoreError, StoreError};
use crate::statement::{Layout, Statement, StatementBuilder};
use crate::store::Store;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Latest instant by which a store call must complete.
///
/// Dropping an operation's future cancels it; a deadline bounds how long the
/// caller is willing to wait for the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline; wait as long as the store takes.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    pub fn is_expired(&self) -> bool {
        self.0.map(|at| at <= Instant::now()).unwrap_or(false)
    }
}

/// The transition engine.
pub struct Engine<S> {
    /// Shared, immutable rule table.
    table: Arc<TransitionTable>,

    /// Store handle; owned by the caller's choice of `S` (e.g. `Arc<_>` or a
    /// pool handle), never closed here.
    store: S,

    builder: StatementBuilder,

    /// Deadline applied by the operations that do not take one explicitly.
    default_timeout: Option<Duration>,
}

impl<S: Store> Engine<S> {
    pub fn new(table: Arc<TransitionTable>, layout: Layout, store: S) -> Self {
        Self {
            table,
            store,
            builder: StatementBuilder::new(layout),
            default_timeout: None,
        }
    }

    /// Sets the timeout used by [`Self::initialize`], [`Self::current`] and
    /// [`Self::event`].
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn table(&self) -> &TransitionTable {
        &self.table
    }

    pub fn layout(&self) -> &Layout {
        self.builder.layout()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns a handle bound to a single entity.
    pub fn entity(&self, id: impl Into<EntityId>) -> Entity<'_, S> {
        Entity {
            engine: self,
            id: id.into(),
        }
    }

    fn default_deadline(&self) -> Deadline {
        self.default_timeout
            .map(Deadline::after)
            .unwrap_or_default()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Creates the entity's record in the initial state.
    ///
    /// Not idempotent: a second call for the same id fails with
    /// [`CoreError::DuplicateEntry`] and leaves the stored state untouched.
    pub async fn initialize(&self, id: &EntityId) -> Result<(), CoreError> {
        self.initialize_by(id, self.default_deadline()).await
    }

    pub async fn initialize_by(&self, id: &EntityId, deadline: Deadline) -> Result<(), CoreError> {
        let statement = self.builder.initialize(id, self.table.initial());

        match self
            .run(&statement, deadline, self.store.execute(&statement))
            .await
        {
            Ok(_) => {
                tracing::debug!(
                    table = self.layout().table(),
                    id = %id,
                    state = %self.table.initial(),
                    "initialized entity"
                );
                Ok(())
            }
            Err(CoreError::Store(StoreError::DuplicateKey(_))) => Err(CoreError::DuplicateEntry {
                id: id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Reads the entity's current state from the store.
    pub async fn current(&self, id: &EntityId) -> Result<State, CoreError> {
        self.current_by(id, self.default_deadline()).await
    }

    pub async fn current_by(&self, id: &EntityId, deadline: Deadline) -> Result<State, CoreError> {
        let statement = self.builder.read(id);

        self.run(&statement, deadline, self.store.query_one(&statement))
            .await?
            .ok_or_else(|| CoreError::NotFound { id: id.to_string() })
    }

    /// Applies an event as one conditional write.
    ///
    /// Succeeds whether or not the state changed: if the current state is
    /// not among the rule's sources the row is left as is. If the entity has
    /// no record yet, it is created in the initial state and the event is
    /// not applied.
    pub async fn event(&self, id: &EntityId, event: &str) -> Result<(), CoreError> {
        self.event_by(id, event, self.default_deadline()).await
    }

    pub async fn event_by(
        &self,
        id: &EntityId,
        event: &str,
        deadline: Deadline,
    ) -> Result<(), CoreError> {
        let rule = self.table.lookup(event)?;
        let statement = self.builder.transition(id, rule, self.table.initial());

        let affected = self
            .run(&statement, deadline, self.store.execute(&statement))
            .await?;

        tracing::debug!(
            table = self.layout().table(),
            id = %id,
            event,
            branches = statement.branches().len(),
            affected,
            "applied event"
        );
        Ok(())
    }

    /// Awaits one store call, bounded by `deadline`.
    async fn run<T, F>(
        &self,
        statement: &Statement,
        deadline: Deadline,
        call: F,
    ) -> Result<T, CoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let Some(at) = deadline.instant() else {
            return Ok(call.await?);
        };

        match tokio::time::timeout_at(at, call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                tracing::warn!(
                    table = self.layout().table(),
                    id = %statement.id(),
                    operation = statement.operation(),
                    "store call exceeded deadline"
                );
                Err(CoreError::DeadlineExceeded {
                    operation: statement.operation(),
                })
            }
        }
    }
}

/// An engine bound to one entity id.
pub struct Entity<'a, S> {
    engine: &'a Engine<S>,
    id: EntityId,
}

impl<'a, S: Store> Entity<'a, S> {
    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub async fn initialize(&self) -> Result<(), CoreError> {
        self.engine.initialize(&self.id).await
    }

    pub async fn current(&self) -> Result<State, CoreError> {
        self.engine.current(&self.id).await
    }

    pub async fn event(&self, event: &str) -> Result<(), CoreError> {
        self.engine.event(&self.id, event).await
    }

    pub async fn initialize_by(&self, deadline: Deadline) -> Result<(), CoreError> {
        self.engine.initialize_by(&self.id, deadline).await
    }

    pub async fn current_by(&self, deadline: Deadline) -> Result<State, CoreError> {
        self.engine.current_by(&self.id, deadline).await
    }

    pub async fn event_by(&self, event: &str, deadline: Deadline) -> Result<(), CoreError> {
        self.engine.event_by(&self.id, event, deadline).await
    }
}
