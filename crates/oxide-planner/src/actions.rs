//! Schema actions and the deriver that produces them from diff entries.
//!
//! Each action is a single schema change against one table, annotated with
//! the tables it depends on so the sorter can order it.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

use crate::diff::{DiffEntry, DiffNode, DiffPath};
use crate::error::{PlanError, Result};
use crate::snapshot::{ColumnSpec, IndexSpec, Tables};

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Create a table with all of its columns.
    CreateTable {
        /// Table name.
        table: String,
        /// Columns in declaration order.
        columns: IndexMap<String, ColumnSpec>,
        /// Tables referenced by the columns.
        depends: Vec<String>,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
        /// Tables the dropped table referenced.
        depends: Vec<String>,
    },
    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Column definition.
        spec: ColumnSpec,
        /// The table itself plus any referenced table.
        depends: Vec<String>,
    },
    /// Remove a column.
    RemoveColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// The table itself.
        depends: Vec<String>,
    },
    /// Replace a column definition with its full target definition.
    ChangeColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Target column definition.
        spec: ColumnSpec,
        /// The table itself plus any referenced table.
        depends: Vec<String>,
    },
    /// Add an index.
    AddIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: IndexSpec,
        /// The table itself.
        depends: Vec<String>,
    },
    /// Remove an index.
    RemoveIndex {
        /// Table name.
        table: String,
        /// Index definition.
        index: IndexSpec,
        /// The table itself.
        depends: Vec<String>,
    },
}

/// Discriminant of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    /// See [`Action::CreateTable`].
    CreateTable,
    /// See [`Action::DropTable`].
    DropTable,
    /// See [`Action::AddColumn`].
    AddColumn,
    /// See [`Action::RemoveColumn`].
    RemoveColumn,
    /// See [`Action::ChangeColumn`].
    ChangeColumn,
    /// See [`Action::AddIndex`].
    AddIndex,
    /// See [`Action::RemoveIndex`].
    RemoveIndex,
}

impl ActionKind {
    /// Tie-break rank used when no dependency decides the order.
    ///
    /// Removals go first so names are free again, table drops go last so
    /// columns referencing them are already gone.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::RemoveIndex => 0,
            Self::RemoveColumn => 1,
            Self::CreateTable => 2,
            Self::AddColumn => 3,
            Self::ChangeColumn => 4,
            Self::AddIndex => 5,
            Self::DropTable => 6,
        }
    }
}

impl Action {
    /// Creates a table creation action. Dependencies come from the columns.
    #[must_use]
    pub fn create_table(table: impl Into<String>, columns: IndexMap<String, ColumnSpec>) -> Self {
        let depends = dedup(columns.values().filter_map(ColumnSpec::referenced_table));
        Self::CreateTable {
            table: table.into(),
            columns,
            depends,
        }
    }

    /// Creates a table drop action. Dependencies come from the old columns.
    #[must_use]
    pub fn drop_table(table: impl Into<String>, columns: &IndexMap<String, ColumnSpec>) -> Self {
        Self::DropTable {
            table: table.into(),
            depends: dedup(columns.values().filter_map(ColumnSpec::referenced_table)),
        }
    }

    /// Creates a column addition.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: impl Into<String>, spec: ColumnSpec) -> Self {
        let table = table.into();
        let depends = column_depends(&table, &spec);
        Self::AddColumn {
            table,
            column: column.into(),
            spec,
            depends,
        }
    }

    /// Creates a column removal. It depends only on its own table.
    #[must_use]
    pub fn remove_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        let table = table.into();
        Self::RemoveColumn {
            depends: vec![table.clone()],
            table,
            column: column.into(),
        }
    }

    /// Creates a column change carrying the full target definition.
    #[must_use]
    pub fn change_column(
        table: impl Into<String>,
        column: impl Into<String>,
        spec: ColumnSpec,
    ) -> Self {
        let table = table.into();
        let depends = column_depends(&table, &spec);
        Self::ChangeColumn {
            table,
            column: column.into(),
            spec,
            depends,
        }
    }

    /// Creates an index addition.
    #[must_use]
    pub fn add_index(table: impl Into<String>, index: IndexSpec) -> Self {
        let table = table.into();
        Self::AddIndex {
            depends: vec![table.clone()],
            table,
            index,
        }
    }

    /// Creates an index removal.
    #[must_use]
    pub fn remove_index(table: impl Into<String>, index: IndexSpec) -> Self {
        let table = table.into();
        Self::RemoveIndex {
            depends: vec![table.clone()],
            table,
            index,
        }
    }

    /// Table this action operates on.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::DropTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::RemoveColumn { table, .. }
            | Self::ChangeColumn { table, .. }
            | Self::AddIndex { table, .. }
            | Self::RemoveIndex { table, .. } => table,
        }
    }

    /// Tables this action depends on.
    #[must_use]
    pub fn depends(&self) -> &[String] {
        match self {
            Self::CreateTable { depends, .. }
            | Self::DropTable { depends, .. }
            | Self::AddColumn { depends, .. }
            | Self::RemoveColumn { depends, .. }
            | Self::ChangeColumn { depends, .. }
            | Self::AddIndex { depends, .. }
            | Self::RemoveIndex { depends, .. } => depends,
        }
    }

    /// Kind of this action.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateTable { .. } => ActionKind::CreateTable,
            Self::DropTable { .. } => ActionKind::DropTable,
            Self::AddColumn { .. } => ActionKind::AddColumn,
            Self::RemoveColumn { .. } => ActionKind::RemoveColumn,
            Self::ChangeColumn { .. } => ActionKind::ChangeColumn,
            Self::AddIndex { .. } => ActionKind::AddIndex,
            Self::RemoveIndex { .. } => ActionKind::RemoveIndex,
        }
    }
}

/// Human-readable summary line, e.g. `addColumn "x" to table "t"`.
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table, depends, .. } => {
                write!(f, "createTable \"{}\", deps: [{}]", table, depends.join(", "))
            }
            Self::DropTable { table, .. } => write!(f, "dropTable \"{}\"", table),
            Self::AddColumn { table, column, .. } => {
                write!(f, "addColumn \"{}\" to table \"{}\"", column, table)
            }
            Self::RemoveColumn { table, column, .. } => {
                write!(f, "removeColumn \"{}\" from table \"{}\"", column, table)
            }
            Self::ChangeColumn { table, column, .. } => {
                write!(f, "changeColumn \"{}\" on table \"{}\"", column, table)
            }
            Self::AddIndex { table, index, .. } => {
                write!(f, "addIndex {} to table \"{}\"", index_label(index), table)
            }
            Self::RemoveIndex { table, index, .. } => {
                write!(f, "removeIndex {} from table \"{}\"", index_label(index), table)
            }
        }
    }
}

/// Index name if it has one, the JSON field list otherwise.
fn index_label(index: &IndexSpec) -> String {
    match index.display_name() {
        Some(name) => name.to_string(),
        None => serde_json::to_string(&index.fields).unwrap_or_default(),
    }
}

fn dedup<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

fn column_depends(table: &str, spec: &ColumnSpec) -> Vec<String> {
    dedup(std::iter::once(table).chain(spec.referenced_table()))
}

/// Non-fatal finding reported alongside a derivation.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// An element was inserted into or removed from a sequence-valued
    /// attribute. No action is emitted for it.
    UnsupportedArrayChange {
        /// Dotted path of the sequence.
        path: String,
        /// Element index.
        index: usize,
        /// Removed element.
        lhs: Option<Value>,
        /// Inserted element.
        rhs: Option<Value>,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedArrayChange { path, index, .. } => write!(
                f,
                "[Not supported] Array model changes at {}[{}], check the result carefully",
                path, index
            ),
        }
    }
}

/// Output of [`derive`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Derivation {
    /// Actions in diff order, not yet sorted.
    pub actions: Vec<Action>,
    /// Findings that produced no action.
    pub diagnostics: Vec<Diagnostic>,
}

/// Translates diff entries from `old` to `new` into actions.
///
/// Several attribute changes on one column yield a single `ChangeColumn`
/// carrying the column's full definition from `new`.
pub fn derive(entries: &[DiffEntry], new: &Tables) -> Result<Derivation> {
    let mut derivation = Derivation::default();
    let mut changed_columns: HashSet<(String, String)> = HashSet::new();

    for entry in entries {
        match entry {
            DiffEntry::New { path, rhs } => match (path, rhs) {
                (DiffPath::Table { table }, DiffNode::Table(snapshot)) => {
                    derivation
                        .actions
                        .push(Action::create_table(table, snapshot.schema.clone()));
                    for index in snapshot.indexes.values() {
                        derivation
                            .actions
                            .push(Action::add_index(table, index.clone()));
                    }
                }
                (DiffPath::Column { table, column }, DiffNode::Column(spec)) => {
                    derivation
                        .actions
                        .push(Action::add_column(table, column, spec.clone()));
                }
                (DiffPath::Index { table, .. }, DiffNode::Index(index)) => {
                    derivation
                        .actions
                        .push(Action::add_index(table, index.clone()));
                }
                (DiffPath::ColumnAttribute { table, column, .. }, _) => {
                    push_change(&mut derivation, &mut changed_columns, new, table, column)?;
                }
                _ => return Err(PlanError::UnclassifiedDiff(format!("New {}", path))),
            },
            DiffEntry::Deleted { path, lhs } => match (path, lhs) {
                (DiffPath::Table { table }, DiffNode::Table(snapshot)) => {
                    derivation
                        .actions
                        .push(Action::drop_table(table, &snapshot.schema));
                }
                (DiffPath::Column { table, column }, DiffNode::Column(_)) => {
                    derivation
                        .actions
                        .push(Action::remove_column(table, column));
                }
                (DiffPath::Index { table, .. }, DiffNode::Index(index)) => {
                    derivation
                        .actions
                        .push(Action::remove_index(table, index.clone()));
                }
                (DiffPath::ColumnAttribute { table, column, .. }, _) => {
                    push_change(&mut derivation, &mut changed_columns, new, table, column)?;
                }
                _ => return Err(PlanError::UnclassifiedDiff(format!("Deleted {}", path))),
            },
            DiffEntry::Edited { path, .. } => match path {
                DiffPath::ColumnAttribute { table, column, .. } => {
                    push_change(&mut derivation, &mut changed_columns, new, table, column)?;
                }
                _ => return Err(PlanError::UnclassifiedDiff(format!("Edited {}", path))),
            },
            DiffEntry::ArrayChanged {
                path,
                index,
                lhs,
                rhs,
            } => {
                derivation
                    .diagnostics
                    .push(Diagnostic::UnsupportedArrayChange {
                        path: path.to_string(),
                        index: *index,
                        lhs: lhs.clone(),
                        rhs: rhs.clone(),
                    });
            }
        }
    }

    Ok(derivation)
}

fn push_change(
    derivation: &mut Derivation,
    seen: &mut HashSet<(String, String)>,
    new: &Tables,
    table: &str,
    column: &str,
) -> Result<()> {
    if !seen.insert((table.to_string(), column.to_string())) {
        return Ok(());
    }

    let spec = new
        .get(table)
        .and_then(|t| t.schema.get(column))
        .ok_or_else(|| PlanError::MissingColumn {
            table: table.to_string(),
            column: column.to_string(),
        })?;

    derivation
        .actions
        .push(Action::change_column(table, column, spec.clone()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::snapshot::{tables, DefaultValue, IndexDefinition, TableSnapshot};
    use serde_json::json;

    fn car_brands() -> TableSnapshot {
        TableSnapshot::new("CarBrands")
            .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key())
            .column("name", ColumnSpec::new("Sequelize.STRING"))
    }

    fn derive_between(old: &Tables, new: &Tables) -> Derivation {
        derive(&diff(old, new), new).unwrap()
    }

    #[test]
    fn test_new_table_yields_create_table() {
        let new = tables([car_brands()]);
        let result = derive_between(&Tables::new(), &new);

        assert_eq!(result.actions.len(), 1);
        match &result.actions[0] {
            Action::CreateTable {
                table,
                columns,
                depends,
            } => {
                assert_eq!(table, "CarBrands");
                assert_eq!(columns.len(), 2);
                assert!(depends.is_empty());
            }
            other => panic!("Expected CreateTable, got {:?}", other),
        }
    }

    #[test]
    fn test_new_table_with_indexes_adds_them() {
        let new = tables([car_brands().index(IndexDefinition::new(["name"]).name("brand_name"))]);
        let result = derive_between(&Tables::new(), &new);

        let kinds: Vec<ActionKind> = result.actions.iter().map(Action::kind).collect();
        assert_eq!(kinds, vec![ActionKind::CreateTable, ActionKind::AddIndex]);
    }

    #[test]
    fn test_create_table_depends_on_references() {
        let cars = TableSnapshot::new("Cars")
            .column("brandId", ColumnSpec::new("Sequelize.INTEGER").references("CarBrands", None))
            .column("altId", ColumnSpec::new("Sequelize.INTEGER").references("CarBrands", None));
        let action = Action::create_table("Cars", cars.schema);

        assert_eq!(action.depends(), &["CarBrands".to_string()]);
        assert_eq!(action.to_string(), "createTable \"Cars\", deps: [CarBrands]");
    }

    #[test]
    fn test_deleted_table_yields_drop_table() {
        let old = tables([car_brands()]);
        let result = derive_between(&old, &Tables::new());

        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].kind(), ActionKind::DropTable);
        assert_eq!(result.actions[0].to_string(), "dropTable \"CarBrands\"");
    }

    #[test]
    fn test_column_add_and_remove() {
        let old = tables([car_brands()]);
        let new = tables([TableSnapshot::new("CarBrands")
            .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key())
            .column("title", ColumnSpec::new("Sequelize.STRING"))]);

        let result = derive_between(&old, &new);
        let lines: Vec<String> = result.actions.iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            vec![
                "removeColumn \"name\" from table \"CarBrands\"",
                "addColumn \"title\" to table \"CarBrands\"",
            ]
        );
        assert_eq!(result.actions[1].depends(), &["CarBrands".to_string()]);
    }

    #[test]
    fn test_removed_reference_column_depends_on_own_table() {
        let cars = |owner: bool| {
            let mut table = TableSnapshot::new("Cars")
                .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key());
            if owner {
                table = table.column(
                    "ownerId",
                    ColumnSpec::new("Sequelize.INTEGER").references("Owners", Some("id")),
                );
            }
            table
        };
        let result = derive_between(&tables([cars(true)]), &tables([cars(false)]));

        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].kind(), ActionKind::RemoveColumn);
        assert_eq!(result.actions[0].depends(), &["Cars".to_string()]);
    }

    #[test]
    fn test_multiple_attribute_changes_collapse() {
        let old = tables([car_brands()]);
        let new = tables([TableSnapshot::new("CarBrands")
            .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key())
            .column(
                "name",
                ColumnSpec::new("Sequelize.TEXT")
                    .allow_null(false)
                    .default_value(DefaultValue::Literal(json!("none"))),
            )]);

        let result = derive_between(&old, &new);
        assert_eq!(result.actions.len(), 1);
        match &result.actions[0] {
            Action::ChangeColumn { column, spec, .. } => {
                assert_eq!(column, "name");
                assert_eq!(spec.type_expression, "Sequelize.TEXT");
                assert_eq!(spec.allow_null, Some(false));
            }
            other => panic!("Expected ChangeColumn, got {:?}", other),
        }
    }

    #[test]
    fn test_new_reference_change_depends_on_target() {
        let old = tables([car_brands()]);
        let new = tables([TableSnapshot::new("CarBrands")
            .column("id", ColumnSpec::new("Sequelize.INTEGER").primary_key())
            .column("name", ColumnSpec::new("Sequelize.STRING").references("Owners", Some("id")))]);

        let result = derive_between(&old, &new);
        assert_eq!(
            result.actions[0].depends(),
            &["CarBrands".to_string(), "Owners".to_string()]
        );
    }

    #[test]
    fn test_index_summary_uses_name_or_fields() {
        let named = Action::add_index("t", IndexDefinition::new(["a"]).name("idx_a").into());
        let unnamed = Action::remove_index("t", IndexDefinition::new(["a", "b"]).into());

        assert_eq!(named.to_string(), "addIndex idx_a to table \"t\"");
        assert_eq!(unnamed.to_string(), "removeIndex [\"a\",\"b\"] from table \"t\"");
    }

    #[test]
    fn test_array_change_is_diagnostic() {
        let old = tables([TableSnapshot::new("t").column(
            "tags",
            ColumnSpec::new("Sequelize.JSON").default_value(DefaultValue::Literal(json!([]))),
        )]);
        let new = tables([TableSnapshot::new("t").column(
            "tags",
            ColumnSpec::new("Sequelize.JSON").default_value(DefaultValue::Literal(json!(["x"]))),
        )]);

        let result = derive_between(&old, &new);
        assert!(result.actions.is_empty());
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].to_string().starts_with("[Not supported]"));
    }

    #[test]
    fn test_missing_column_is_error() {
        let entries = vec![DiffEntry::Edited {
            path: DiffPath::ColumnAttribute {
                table: "t".to_string(),
                column: "ghost".to_string(),
                attribute: vec!["type".to_string()],
            },
            lhs: json!("Sequelize.STRING"),
            rhs: json!("Sequelize.TEXT"),
        }];

        let result = derive(&entries, &Tables::new());
        assert!(matches!(result, Err(PlanError::MissingColumn { .. })));
    }

    #[test]
    fn test_unclassified_entry_is_error() {
        let entries = vec![DiffEntry::Edited {
            path: DiffPath::TableField {
                table: "t".to_string(),
                field: "tableName".to_string(),
            },
            lhs: json!("t"),
            rhs: json!("u"),
        }];

        let result = derive(&entries, &Tables::new());
        assert!(matches!(result, Err(PlanError::UnclassifiedDiff(_))));
    }
}
