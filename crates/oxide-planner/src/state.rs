//! Migration state bookkeeping.
//!
//! A [`MigrationState`] is the last recorded snapshot plus its revision. A
//! transition compares it with the current snapshot and, when anything
//! changed, produces the next state together with the plan between them.
//!
//! [`SchemaReplay`] goes the other way: it replays actions onto a snapshot
//! to reconstruct the schema they produce.

use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::error::{PlanError, Result};
use crate::planner::{plan_actions, plan_migration, MigrationPlan};
use crate::snapshot::{TableSnapshot, Tables};

/// Format version written into every state.
pub const STATE_VERSION: i64 = 1;

/// A recorded snapshot and its revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationState {
    /// Revision number, 0 for the initial empty state.
    pub revision: i64,
    /// State format version.
    pub version: i64,
    /// Tables at this revision.
    pub tables: Tables,
}

impl Default for MigrationState {
    fn default() -> Self {
        Self::initial()
    }
}

impl MigrationState {
    /// The state before any migration: revision 0, no tables.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            revision: 0,
            version: STATE_VERSION,
            tables: Tables::new(),
        }
    }

    /// The state following this one, holding `tables`.
    #[must_use]
    pub fn next(&self, tables: Tables) -> Self {
        Self {
            revision: self.revision + 1,
            version: self.version,
            tables,
        }
    }

    /// Parses a state from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the state to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Outcome of [`transition`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The current snapshot matches the previous state.
    NoChangesFound,
    /// Something changed.
    Changed {
        /// The state to record once the migration is saved.
        next_state: MigrationState,
        /// Plan from the previous state to `next_state`.
        plan: MigrationPlan,
    },
}

/// Compares `previous` with `current` and builds the next state.
///
/// `previous` is not modified; the next state owns `current`.
pub fn transition(previous: &MigrationState, current: Tables) -> Result<Transition> {
    let plan = plan_migration(&previous.tables, &current)?;
    if plan.is_empty() {
        return Ok(Transition::NoChangesFound);
    }

    Ok(Transition::Changed {
        next_state: previous.next(current),
        plan,
    })
}

/// Reconstructs a schema by replaying actions.
#[derive(Debug, Default)]
pub struct SchemaReplay {
    tables: Tables,
}

impl SchemaReplay {
    /// Starts from a copy of `tables`.
    #[must_use]
    pub fn new(tables: &Tables) -> Self {
        Self {
            tables: tables.clone(),
        }
    }

    /// Returns the replayed tables.
    #[must_use]
    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Consumes and returns the replayed tables.
    #[must_use]
    pub fn into_tables(self) -> Tables {
        self.tables
    }

    /// Applies a single action.
    pub fn apply(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::CreateTable { table, columns, .. } => {
                if self.tables.contains_key(table) {
                    return Err(PlanError::InvalidState(format!(
                        "Table '{}' already exists",
                        table
                    )));
                }
                let mut snapshot = TableSnapshot::new(table.clone());
                snapshot.schema = columns.clone();
                self.tables.insert(table.clone(), snapshot);
            }

            Action::DropTable { table, .. } => {
                self.tables.remove(table).ok_or_else(|| {
                    PlanError::InvalidState(format!("Table '{}' does not exist", table))
                })?;
            }

            Action::AddColumn {
                table,
                column,
                spec,
                ..
            } => {
                let t = self.table_mut(table)?;
                if t.schema.contains_key(column) {
                    return Err(PlanError::InvalidState(format!(
                        "Column '{}' already exists in table '{}'",
                        column, table
                    )));
                }
                t.schema.insert(column.clone(), spec.clone());
            }

            Action::RemoveColumn { table, column, .. } => {
                let t = self.table_mut(table)?;
                t.schema.shift_remove(column).ok_or_else(|| {
                    PlanError::InvalidState(format!(
                        "Column '{}' does not exist in table '{}'",
                        column, table
                    ))
                })?;
            }

            Action::ChangeColumn {
                table,
                column,
                spec,
                ..
            } => {
                let t = self.table_mut(table)?;
                let existing = t.schema.get_mut(column).ok_or_else(|| {
                    PlanError::InvalidState(format!(
                        "Column '{}' does not exist in table '{}'",
                        column, table
                    ))
                })?;
                *existing = spec.clone();
            }

            Action::AddIndex { table, index, .. } => {
                let t = self.table_mut(table)?;
                t.indexes.insert(index.key(), index.clone());
            }

            Action::RemoveIndex { table, index, .. } => {
                let t = self.table_mut(table)?;
                t.indexes.remove(&index.key()).ok_or_else(|| {
                    PlanError::InvalidState(format!(
                        "Index {:?} does not exist on table '{}'",
                        index.fields, table
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Applies actions in order.
    pub fn apply_all(&mut self, actions: &[Action]) -> Result<()> {
        for action in actions {
            self.apply(action)?;
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &str) -> Result<&mut TableSnapshot> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| PlanError::InvalidState(format!("Table '{}' does not exist", table)))
    }
}

/// Replays the plan from `from` to `to` onto `from` and returns the result.
///
/// For consistent inputs the result equals `to`.
pub fn replay_plan(from: &Tables, to: &Tables) -> Result<Tables> {
    let (actions, _) = plan_actions(from, to)?;
    let mut replay = SchemaReplay::new(from);
    replay.apply_all(&actions)?;
    Ok(replay.into_tables())
}
