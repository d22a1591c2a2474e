//! Dependency ordering of actions.
//!
//! Two kinds of edges are derived from the `depends` lists:
//!
//! - a `CreateTable X` runs before every other action that depends on `X`;
//! - a `DropTable X` runs after every other action that depends on `X`.
//!
//! Actions with no edge between them keep a fixed kind order (see
//! [`ActionKind::rank`]) and then their input order, so the result is
//! deterministic.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::actions::{Action, ActionKind};
use crate::error::{PlanError, Result};

/// Orders `actions` so that every dependency edge is respected.
///
/// Returns [`PlanError::DependencyCycle`] listing the unschedulable actions
/// when no valid order exists.
pub fn sort(actions: Vec<Action>) -> Result<Vec<Action>> {
    let count = actions.len();

    let mut creators: HashMap<&str, usize> = HashMap::new();
    let mut droppers: HashMap<&str, usize> = HashMap::new();
    for (i, action) in actions.iter().enumerate() {
        match action.kind() {
            ActionKind::CreateTable => {
                creators.insert(action.table(), i);
            }
            ActionKind::DropTable => {
                droppers.insert(action.table(), i);
            }
            _ => {}
        }
    }

    let mut edges: HashSet<(usize, usize)> = HashSet::new();
    for (i, action) in actions.iter().enumerate() {
        for dep in action.depends() {
            if let Some(&creator) = creators.get(dep.as_str()) {
                if creator != i {
                    edges.insert((creator, i));
                }
            }
            if let Some(&dropper) = droppers.get(dep.as_str()) {
                if dropper != i {
                    edges.insert((i, dropper));
                }
            }
        }
    }

    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];
    for &(from, to) in &edges {
        successors[from].push(to);
        in_degree[to] += 1;
    }

    // Kahn's algorithm with a (rank, input index) priority
    let mut ready: BTreeSet<(u8, usize)> = in_degree
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| (actions[i].kind().rank(), i))
        .collect();

    let mut order = Vec::with_capacity(count);
    while let Some((_, i)) = ready.pop_first() {
        order.push(i);
        for &next in &successors[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert((actions[next].kind().rank(), next));
            }
        }
    }

    if order.len() < count {
        let scheduled: HashSet<usize> = order.iter().copied().collect();
        let stuck: Vec<String> = actions
            .iter()
            .enumerate()
            .filter(|(i, _)| !scheduled.contains(i))
            .map(|(_, action)| action.to_string())
            .collect();
        return Err(PlanError::DependencyCycle { actions: stuck });
    }

    debug!(actions = count, edges = edges.len(), "Sorted actions");

    let mut slots: Vec<Option<Action>> = actions.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ColumnSpec, IndexDefinition, TableSnapshot};

    fn create(name: &str, refs: &[&str]) -> Action {
        let mut table = TableSnapshot::new(name)
            .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key());
        for r in refs {
            table = table.column(
                format!("{}Id", r),
                ColumnSpec::new("Sequelize.INTEGER").references(*r, Some("id")),
            );
        }
        Action::create_table(name, table.schema)
    }

    fn dropped(name: &str, refs: &[&str]) -> Action {
        let mut table = TableSnapshot::new(name);
        for r in refs {
            table = table.column(
                format!("{}Id", r),
                ColumnSpec::new("Sequelize.INTEGER").references(*r, None),
            );
        }
        Action::drop_table(name, &table.schema)
    }

    fn position(actions: &[Action], line: &str) -> usize {
        actions
            .iter()
            .position(|a| a.to_string().starts_with(line))
            .unwrap_or_else(|| panic!("{} not found", line))
    }

    #[test]
    fn test_empty_input() {
        assert!(sort(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_created_table_comes_before_dependents() {
        let sorted = sort(vec![create("Cars", &["CarBrands"]), create("CarBrands", &[])]).unwrap();

        assert!(
            position(&sorted, "createTable \"CarBrands\"")
                < position(&sorted, "createTable \"Cars\"")
        );
    }

    #[test]
    fn test_chain_of_creations() {
        let sorted = sort(vec![
            create("C", &["B"]),
            create("B", &["A"]),
            create("A", &[]),
        ])
        .unwrap();

        let names: Vec<&str> = sorted.iter().map(Action::table).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_dropped_table_comes_after_dependents() {
        let sorted = sort(vec![dropped("CarBrands", &[]), dropped("Cars", &["CarBrands"])]).unwrap();

        assert!(
            position(&sorted, "dropTable \"Cars\"") < position(&sorted, "dropTable \"CarBrands\"")
        );
    }

    #[test]
    fn test_change_column_before_referenced_drop() {
        let change = Action::change_column(
            "Cars",
            "ownerId",
            ColumnSpec::new("Sequelize.INTEGER"),
        );
        let remove = Action::remove_column("Cars", "ownerId");
        let sorted = sort(vec![dropped("Owners", &[]), change, remove]).unwrap();

        assert_eq!(sorted.last().map(Action::kind), Some(ActionKind::DropTable));
    }

    #[test]
    fn test_index_follows_its_table_creation() {
        let index = Action::add_index("Cars", IndexDefinition::new(["name"]).into());
        let sorted = sort(vec![index, create("Cars", &[])]).unwrap();

        assert_eq!(sorted[0].kind(), ActionKind::CreateTable);
        assert_eq!(sorted[1].kind(), ActionKind::AddIndex);
    }

    #[test]
    fn test_self_reference_is_not_a_cycle() {
        let sorted = sort(vec![create("Nodes", &["Nodes"])]).unwrap();
        assert_eq!(sorted.len(), 1);
    }

    #[test]
    fn test_ties_broken_by_kind_then_input_order() {
        let sorted = sort(vec![
            Action::add_column("t", "b", ColumnSpec::new("Sequelize.STRING")),
            Action::remove_index("t", IndexDefinition::new(["a"]).into()),
            Action::add_column("t", "a", ColumnSpec::new("Sequelize.STRING")),
        ])
        .unwrap();

        let lines: Vec<String> = sorted.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "removeIndex [\"a\"] from table \"t\"",
                "addColumn \"b\" to table \"t\"",
                "addColumn \"a\" to table \"t\"",
            ]
        );
    }

    #[test]
    fn test_cycle_is_error() {
        let result = sort(vec![create("A", &["B"]), create("B", &["A"])]);

        match result {
            Err(PlanError::DependencyCycle { actions }) => {
                assert_eq!(actions.len(), 2);
                assert!(actions[0].starts_with("createTable \"A\""));
            }
            other => panic!("Expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_sort_is_deterministic() {
        let input = vec![
            create("Cars", &["CarBrands", "Owners"]),
            create("Owners", &[]),
            create("CarBrands", &[]),
        ];
        assert_eq!(sort(input.clone()).unwrap(), sort(input).unwrap());
    }
}
