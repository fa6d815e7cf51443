//! Statement construction.
//!
//! Every engine operation is exactly one statement. The transition statement
//! is an insert-or-update whose update arm is a multi-branch `CASE`, so the
//! store compares the current state and writes the new one in a single
//! atomic step:
//!
//! ```sql
//! INSERT INTO `task` (`id`, `state`) VALUES (?, ?)
//! ON DUPLICATE KEY UPDATE `state` = CASE
//!     WHEN `state` = ? THEN ?
//!     WHEN `state` = ? THEN ?
//!     ELSE `state`
//! END
//! ```
//!
//! When no row exists yet the insert arm stores the table's *initial* state,
//! not the rule's destination: an event on an entity that was never
//! initialized creates it without applying the transition.
//!
//! Statements are structured values. Table and column names are validated
//! identifiers and are quoted when rendered; entity ids and state labels are
//! only ever bound as parameters.

use crate::definition::{EntityId, State, TransitionRule};
use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// MySQL's identifier limit, the loosest of the supported dialects.
const MAX_IDENTIFIER_LEN: usize = 64;

/// SQL flavour a statement is rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// `ON DUPLICATE KEY UPDATE`, backtick identifiers, `?` placeholders.
    #[default]
    MySql,
    /// `ON CONFLICT ... DO UPDATE`, double-quoted identifiers, `?` placeholders.
    Sqlite,
    /// `ON CONFLICT ... DO UPDATE`, double-quoted identifiers, `$n` placeholders.
    Postgres,
}

impl Dialect {
    fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident),
            Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", ident),
        }
    }

    /// Longest identifier, in bytes, the backend stores without truncating.
    /// Postgres silently cuts names at 63 bytes.
    pub fn max_identifier_len(&self) -> usize {
        match self {
            Dialect::MySql | Dialect::Sqlite => MAX_IDENTIFIER_LEN,
            Dialect::Postgres => 63,
        }
    }

    /// Placeholder for the 1-based parameter `n`.
    fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::MySql | Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", n),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dialect::MySql => "mysql",
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        })
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            other => Err(format!("unknown dialect '{}'", other)),
        }
    }
}

/// Where one kind of entity is persisted: a table with an id column and a
/// single state column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    table: String,
    id_column: String,
    field: String,
}

impl Layout {
    /// Creates a layout with the default `id` key column.
    pub fn new(table: impl Into<String>, field: impl Into<String>) -> Result<Self, CoreError> {
        Self::with_id_column(table, "id", field)
    }

    pub fn with_id_column(
        table: impl Into<String>,
        id_column: impl Into<String>,
        field: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let layout = Self {
            table: table.into(),
            id_column: id_column.into(),
            field: field.into(),
        };
        validate_identifier(&layout.table)?;
        validate_identifier(&layout.id_column)?;
        validate_identifier(&layout.field)?;
        if layout.id_column == layout.field {
            return Err(CoreError::InvalidIdentifier {
                identifier: layout.field,
                reason: "state column must differ from the id column".to_string(),
            });
        }
        Ok(layout)
    }

    /// Checks the identifiers against `dialect`'s length limit.
    pub fn validate_for(&self, dialect: Dialect) -> Result<(), CoreError> {
        let max = dialect.max_identifier_len();
        for ident in [&self.table, &self.id_column, &self.field] {
            if ident.len() > max {
                return Err(CoreError::InvalidIdentifier {
                    identifier: ident.clone(),
                    reason: format!("longer than {} bytes, the {} limit", max, dialect),
                });
            }
        }
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

/// Accepts plain SQL identifiers: `[A-Za-z_][A-Za-z0-9_]*`, at most 64 bytes.
/// Use [`Layout::validate_for`] for a dialect's tighter limit.
pub fn validate_identifier(ident: &str) -> Result<(), CoreError> {
    let invalid = |reason: &str| CoreError::InvalidIdentifier {
        identifier: ident.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = ident.chars();
    match chars.next() {
        None => return Err(invalid("must not be empty")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err(invalid("must start with a letter or underscore"))
        }
        Some(_) => {}
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("may only contain letters, digits and underscores"));
    }
    if ident.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid("longer than 64 characters"));
    }
    Ok(())
}

/// One `WHEN state = when THEN then` arm of a transition statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub when: State,
    pub then: State,
}

/// What a statement does to the entity's row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    /// Plain insert; fails on an existing row.
    Insert { state: State },
    /// Point read of the state column.
    Read,
    /// Insert `initial`, or on an existing row apply the first matching
    /// branch, else keep the current state.
    Transition {
        initial: State,
        branches: Vec<Branch>,
    },
}

/// A backend-neutral statement against one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    layout: Arc<Layout>,
    id: EntityId,
    kind: StatementKind,
}

/// Statement text plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedStatement {
    pub sql: String,
    pub params: Vec<String>,
}

impl Statement {
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn kind(&self) -> &StatementKind {
        &self.kind
    }

    /// Branches of a transition statement; empty for other kinds.
    pub fn branches(&self) -> &[Branch] {
        match &self.kind {
            StatementKind::Transition { branches, .. } => branches,
            _ => &[],
        }
    }

    /// Short name used in logs.
    pub fn operation(&self) -> &'static str {
        match self.kind {
            StatementKind::Insert { .. } => "initialize",
            StatementKind::Read => "current",
            StatementKind::Transition { .. } => "event",
        }
    }

    /// Renders the statement for a dialect.
    pub fn render(&self, dialect: Dialect) -> RenderedStatement {
        let table = dialect.quote(self.layout.table());
        let id_column = dialect.quote(self.layout.id_column());
        let field = dialect.quote(self.layout.field());
        let mut params = vec![self.id.as_str().to_string()];

        let sql = match &self.kind {
            StatementKind::Read => format!(
                "SELECT {} FROM {} WHERE {} = {}",
                field,
                table,
                id_column,
                dialect.placeholder(1)
            ),
            StatementKind::Insert { state } => {
                params.push(state.as_str().to_string());
                format!(
                    "INSERT INTO {} ({}, {}) VALUES ({}, {})",
                    table,
                    id_column,
                    field,
                    dialect.placeholder(1),
                    dialect.placeholder(2)
                )
            }
            StatementKind::Transition { initial, branches } => {
                params.push(initial.as_str().to_string());
                let insert = format!(
                    "INSERT INTO {} ({}, {}) VALUES ({}, {})",
                    table,
                    id_column,
                    field,
                    dialect.placeholder(1),
                    dialect.placeholder(2)
                );

                // Postgres resolves the existing row through the table name.
                let current = match dialect {
                    Dialect::Postgres => format!("{}.{}", table, field),
                    Dialect::MySql | Dialect::Sqlite => field.clone(),
                };

                let mut cases = Vec::with_capacity(branches.len());
                for branch in branches {
                    params.push(branch.when.as_str().to_string());
                    let when = dialect.placeholder(params.len());
                    params.push(branch.then.as_str().to_string());
                    let then = dialect.placeholder(params.len());
                    cases.push(format!("WHEN {} = {} THEN {}", current, when, then));
                }
                let case = format!("CASE {} ELSE {} END", cases.join(" "), current);

                match dialect {
                    Dialect::MySql => {
                        format!("{} ON DUPLICATE KEY UPDATE {} = {}", insert, field, case)
                    }
                    Dialect::Sqlite | Dialect::Postgres => format!(
                        "{} ON CONFLICT ({}) DO UPDATE SET {} = {}",
                        insert, id_column, field, case
                    ),
                }
            }
        };

        RenderedStatement { sql, params }
    }
}

/// Builds the three statements the engine issues for a layout.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    layout: Arc<Layout>,
}

impl StatementBuilder {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout: Arc::new(layout),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Unconditional insert of the initial record.
    pub fn initialize(&self, id: &EntityId, initial: &State) -> Statement {
        self.statement(
            id,
            StatementKind::Insert {
                state: initial.clone(),
            },
        )
    }

    /// Point read of the current state.
    pub fn read(&self, id: &EntityId) -> Statement {
        self.statement(id, StatementKind::Read)
    }

    /// Conditional insert-or-update applying `rule`, one branch per source
    /// in declaration order.
    pub fn transition(&self, id: &EntityId, rule: &TransitionRule, initial: &State) -> Statement {
        let branches = rule
            .sources
            .iter()
            .map(|source| Branch {
                when: source.clone(),
                then: rule.destination.clone(),
            })
            .collect();

        self.statement(
            id,
            StatementKind::Transition {
                initial: initial.clone(),
                branches,
            },
        )
    }

    fn statement(&self, id: &EntityId, kind: StatementKind) -> Statement {
        Statement {
            layout: Arc::clone(&self.layout),
            id: id.clone(),
            kind,
        }
    }
}
