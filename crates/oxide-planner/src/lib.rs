//! Schema migration planning from model snapshots.
//!
//! `oxide-planner` compares two snapshots of a set of table definitions and
//! produces an ordered, reversible migration plan:
//! - Differences are computed structurally, down to single column attributes
//! - Every difference becomes a schema action annotated with the tables it
//!   depends on
//! - Actions are ordered so that referenced tables exist when needed
//! - The reverse plan is planned independently from the swapped snapshots
//!
//! # Architecture
//!
//! - **Snapshot** - Tables, columns and indexes at one point in time
//! - **Diff** - Typed structural differences between two snapshots
//! - **Actions** - Schema actions derived from diff entries
//! - **Sorter** - Dependency ordering with cycle detection
//! - **Render** - Engine-neutral operations with raw expressions
//! - **State** - Revision bookkeeping and schema replay
//! - **Store** - Persisted migration states (SQLite)
//! - **Writer** - Migration artifact files
//! - **Maker** - Orchestrates load, plan, write and record
//!
//! # Example
//!
//! ```rust
//! use oxide_planner::prelude::*;
//!
//! let previous = Tables::new();
//! let current = tables([TableSnapshot::new("Cars")
//!     .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key())
//!     .column("name", ColumnSpec::new("Sequelize.STRING"))]);
//!
//! let plan = plan_migration(&previous, &current).unwrap();
//! assert_eq!(plan.console_out, vec!["createTable \"Cars\", deps: []"]);
//! assert_eq!(plan.commands_down[0].name, OperationName::DropTable);
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the plan between two snapshot files
//! oxide-planner plan --previous old.json --current new.json
//!
//! # Write the next migration and record its state
//! oxide-planner make --current models.json --out-dir migrations --name "add owners"
//! ```

pub mod actions;
pub mod diff;
pub mod error;
pub mod maker;
pub mod naming;
pub mod planner;
pub mod render;
pub mod snapshot;
pub mod sorter;
pub mod state;
pub mod store;
pub mod writer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::actions::{derive, Action, ActionKind, Derivation, Diagnostic};
    pub use crate::diff::{diff, DiffEntry, DiffKind, DiffNode, DiffPath};
    pub use crate::error::{PlanError, Result};
    pub use crate::maker::{MakeOutcome, MigrationMaker, MigrationOptions};
    pub use crate::naming::{snake_case, ColumnNamePolicy};
    pub use crate::planner::{plan_actions, plan_migration, MigrationPlan};
    pub use crate::render::{render, Operation, OperationName, Param, RenderedPlan};
    pub use crate::snapshot::{
        tables, ColumnSpec, DefaultValue, IndexDefinition, IndexOptions, IndexSpec, Reference,
        TableSnapshot, Tables,
    };
    pub use crate::sorter::sort;
    pub use crate::state::{replay_plan, transition, MigrationState, SchemaReplay, Transition};
    pub use crate::store::{MemoryStateStore, SqliteStateStore, StateStore};
    pub use crate::writer::{generate_migration_name, MigrationArtifact, MigrationWriter};
}
