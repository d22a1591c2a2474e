//! Forward and reverse migration planning.

use tracing::{debug, warn};

use crate::actions::{derive, Action, Diagnostic};
use crate::diff::diff;
use crate::error::Result;
use crate::render::{render, Operation};
use crate::snapshot::Tables;
use crate::sorter::sort;

/// A forward plan and the reverse plan that undoes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationPlan {
    /// Operations taking `previous` to `current`.
    pub commands_up: Vec<Operation>,
    /// Operations taking `current` back to `previous`.
    pub commands_down: Vec<Operation>,
    /// One summary line per forward operation.
    pub console_out: Vec<String>,
    /// Findings that produced no operation.
    pub diagnostics: Vec<Diagnostic>,
}

impl MigrationPlan {
    /// Returns true if there is nothing to migrate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands_up.is_empty()
    }

    /// Printable listing of both directions, forward operations first.
    #[must_use]
    pub fn preview_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.commands_up.len() + self.commands_down.len() + 2);
        lines.push("Up:".to_string());
        lines.extend(self.commands_up.iter().map(|op| format!("  {op}")));
        lines.push("Down:".to_string());
        lines.extend(self.commands_down.iter().map(|op| format!("  {op}")));
        lines
    }
}

/// Diffs, derives and sorts the actions taking `from` to `to`.
pub fn plan_actions(from: &Tables, to: &Tables) -> Result<(Vec<Action>, Vec<Diagnostic>)> {
    let entries = diff(from, to);
    debug!(entries = entries.len(), "Computed schema diff");

    let derivation = derive(&entries, to)?;
    let actions = sort(derivation.actions)?;
    Ok((actions, derivation.diagnostics))
}

/// Plans a migration from `previous` to `current`, and its reverse.
///
/// Both inputs are only read. Diagnostics are reported once, from the
/// forward direction.
pub fn plan_migration(previous: &Tables, current: &Tables) -> Result<MigrationPlan> {
    let (up_actions, diagnostics) = plan_actions(previous, current)?;
    let (down_actions, _) = plan_actions(current, previous)?;

    for diagnostic in &diagnostics {
        warn!("{}", diagnostic);
    }

    let up = render(&up_actions);
    let down = render(&down_actions);

    Ok(MigrationPlan {
        commands_up: up.operations,
        commands_down: down.operations,
        console_out: up.summary,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;
    use crate::render::OperationName;
    use crate::snapshot::{tables, ColumnSpec, TableSnapshot};

    fn names(ops: &[Operation]) -> Vec<OperationName> {
        ops.iter().map(|op| op.name).collect()
    }

    #[test]
    fn test_identical_snapshots_plan_nothing() {
        let t = tables([TableSnapshot::new("t").column("id", ColumnSpec::new("Sequelize.INTEGER"))]);
        let plan = plan_migration(&t, &t).unwrap();

        assert!(plan.is_empty());
        assert!(plan.commands_down.is_empty());
        assert!(plan.console_out.is_empty());
    }

    #[test]
    fn test_create_plan_reverses_to_drop() {
        let current = tables([TableSnapshot::new("CarBrands")
            .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key())]);
        let plan = plan_migration(&Tables::new(), &current).unwrap();

        assert_eq!(names(&plan.commands_up), vec![OperationName::CreateTable]);
        assert_eq!(names(&plan.commands_down), vec![OperationName::DropTable]);
        assert_eq!(plan.console_out, vec!["createTable \"CarBrands\", deps: []"]);
    }

    #[test]
    fn test_preview_lists_both_directions() {
        let current = tables([TableSnapshot::new("CarBrands")
            .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key())]);
        let plan = plan_migration(&Tables::new(), &current).unwrap();
        let lines = plan.preview_lines();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "Up:");
        assert!(lines[1].contains("\"createTable\""));
        assert_eq!(lines[2], "Down:");
        assert!(lines[3].contains("\"dropTable\""));
    }

    #[test]
    fn test_console_out_parallels_commands_up() {
        let previous = tables([TableSnapshot::new("t").column("a", ColumnSpec::new("Sequelize.STRING"))]);
        let current = tables([TableSnapshot::new("t")
            .column("b", ColumnSpec::new("Sequelize.STRING"))
            .column("c", ColumnSpec::new("Sequelize.STRING"))]);
        let plan = plan_migration(&previous, &current).unwrap();

        assert_eq!(plan.commands_up.len(), plan.console_out.len());
        assert_eq!(plan.commands_up.len(), 3);
    }

    #[test]
    fn test_cycle_propagates() {
        let current = tables([
            TableSnapshot::new("A").column("bId", ColumnSpec::new("Sequelize.INTEGER").references("B", None)),
            TableSnapshot::new("B").column("aId", ColumnSpec::new("Sequelize.INTEGER").references("A", None)),
        ]);

        let result = plan_migration(&Tables::new(), &current);
        assert!(matches!(result, Err(PlanError::DependencyCycle { .. })));
    }
}
