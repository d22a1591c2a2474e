//! Renders sorted actions into engine-neutral operations.
//!
//! An [`Operation`] is a function name plus a parameter list. Parameters are
//! either data or raw engine expressions; raw expressions are emitted
//! verbatim when displayed and tagged as `{"$raw": ...}` when serialized.

use std::fmt;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;

use crate::actions::Action;
use crate::snapshot::{AttributeValue, ColumnSpec, DefaultValue, IndexSpec};

/// Name of a rendered operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationName {
    /// `createTable`
    CreateTable,
    /// `dropTable`
    DropTable,
    /// `addColumn`
    AddColumn,
    /// `removeColumn`
    RemoveColumn,
    /// `changeColumn`
    ChangeColumn,
    /// `addIndex`
    AddIndex,
    /// `removeIndex`
    RemoveIndex,
}

impl OperationName {
    /// Returns the operation name as used by migration runners.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateTable => "createTable",
            Self::DropTable => "dropTable",
            Self::AddColumn => "addColumn",
            Self::RemoveColumn => "removeColumn",
            Self::ChangeColumn => "changeColumn",
            Self::AddIndex => "addIndex",
            Self::RemoveIndex => "removeIndex",
        }
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single operation parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// A string literal.
    Str(String),
    /// A data literal.
    Literal(Value),
    /// An engine expression emitted verbatim.
    Raw(String),
    /// An ordered object whose values may themselves be raw.
    Object(Vec<(String, Param)>),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{}", Value::String(s.clone())),
            Self::Literal(value) => write!(f, "{}", value),
            Self::Raw(expr) => f.write_str(expr),
            Self::Object(entries) if entries.is_empty() => f.write_str("{}"),
            Self::Object(entries) => {
                f.write_str("{ ")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", Value::String(key.clone()), value)?;
                }
                f.write_str(" }")
            }
        }
    }
}

impl Serialize for Param {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Literal(value) => value.serialize(serializer),
            Self::Raw(expr) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$raw", expr)?;
                map.end()
            }
            Self::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

/// A rendered migration command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    /// Operation name.
    #[serde(rename = "fn")]
    pub name: OperationName,
    /// Positional parameters.
    pub params: Vec<Param>,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ fn: \"{}\", params: [", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", param)?;
        }
        f.write_str("] }")
    }
}

/// Rendered operations with one summary line per action.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedPlan {
    /// Operations in execution order.
    pub operations: Vec<Operation>,
    /// Summary lines, parallel to `operations`.
    pub summary: Vec<String>,
}

/// Renders already sorted actions.
#[must_use]
pub fn render(actions: &[Action]) -> RenderedPlan {
    let mut plan = RenderedPlan::default();
    for action in actions {
        plan.operations.push(render_action(action));
        plan.summary.push(action.to_string());
    }
    plan
}

/// Renders a single action.
#[must_use]
pub fn render_action(action: &Action) -> Operation {
    match action {
        Action::CreateTable { table, columns, .. } => Operation {
            name: OperationName::CreateTable,
            params: vec![
                Param::Str(table.clone()),
                Param::Object(
                    columns
                        .iter()
                        .map(|(name, spec)| (name.clone(), column_param(spec)))
                        .collect(),
                ),
                Param::Object(Vec::new()),
            ],
        },
        Action::DropTable { table, .. } => Operation {
            name: OperationName::DropTable,
            params: vec![Param::Str(table.clone())],
        },
        Action::AddColumn {
            table,
            column,
            spec,
            ..
        } => Operation {
            name: OperationName::AddColumn,
            params: vec![
                Param::Str(table.clone()),
                Param::Str(column.clone()),
                column_param(spec),
            ],
        },
        Action::RemoveColumn { table, column, .. } => Operation {
            name: OperationName::RemoveColumn,
            params: vec![Param::Str(table.clone()), Param::Str(column.clone())],
        },
        Action::ChangeColumn {
            table,
            column,
            spec,
            ..
        } => Operation {
            name: OperationName::ChangeColumn,
            params: vec![
                Param::Str(table.clone()),
                Param::Str(column.clone()),
                column_param(spec),
            ],
        },
        Action::AddIndex { table, index, .. } => Operation {
            name: OperationName::AddIndex,
            params: vec![
                Param::Str(table.clone()),
                fields_param(index),
                index_options_param(index),
            ],
        },
        Action::RemoveIndex { table, index, .. } => Operation {
            name: OperationName::RemoveIndex,
            params: vec![
                Param::Str(table.clone()),
                match index.display_name() {
                    Some(name) => Param::Str(name.to_string()),
                    None => fields_param(index),
                },
            ],
        },
    }
}

/// Column attributes in reverse insertion order. The type is raw, internal
/// defaults are raw, unsupported defaults are left out.
fn column_param(spec: &ColumnSpec) -> Param {
    let mut entries: Vec<(String, Param)> = spec
        .attributes()
        .into_iter()
        .filter_map(|(name, value)| {
            let param = match value {
                AttributeValue::Expression(expr) => Param::Raw(expr.to_string()),
                AttributeValue::Default(DefaultValue::Literal(v)) => Param::Literal(v.clone()),
                AttributeValue::Default(DefaultValue::Internal(expr)) => Param::Raw(expr.clone()),
                AttributeValue::Default(DefaultValue::NotSupported) => return None,
                AttributeValue::Data(v) => Param::Literal(v),
            };
            Some((name.to_string(), param))
        })
        .collect();
    entries.reverse();
    Param::Object(entries)
}

fn fields_param(index: &IndexSpec) -> Param {
    Param::Literal(Value::Array(
        index.fields.iter().cloned().map(Value::String).collect(),
    ))
}

fn index_options_param(index: &IndexSpec) -> Param {
    let mut entries = Vec::new();
    let options = &index.options;

    if let Some(ref name) = options.name {
        entries.push(("name".to_string(), Param::Str(name.clone())));
    }
    if let Some(ref index_type) = options.index_type {
        entries.push(("type".to_string(), Param::Str(index_type.clone())));
    }
    if let Some(ref using) = options.using {
        entries.push(("using".to_string(), Param::Str(using.clone())));
    }
    if let Some(ref parser) = options.parser {
        entries.push(("parser".to_string(), Param::Str(parser.clone())));
    }
    if let Some(ref operator) = index.operator {
        entries.push(("operator".to_string(), Param::Str(operator.clone())));
    }
    if let Some(concurrently) = index.concurrently {
        entries.push((
            "concurrently".to_string(),
            Param::Literal(Value::Bool(concurrently)),
        ));
    }
    if let Some(ref condition) = index.condition {
        entries.push(("where".to_string(), Param::Literal(condition.clone())));
    }

    Param::Object(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{IndexDefinition, TableSnapshot};
    use serde_json::json;

    #[test]
    fn test_create_table_params() {
        let table = TableSnapshot::new("CarBrands")
            .column(
                "id",
                ColumnSpec::new("Sequelize.INTEGER")
                    .primary_key()
                    .auto_increment(),
            )
            .column("name", ColumnSpec::new("Sequelize.STRING"));
        let op = render_action(&Action::create_table("CarBrands", table.schema));

        assert_eq!(op.name, OperationName::CreateTable);
        assert_eq!(op.params.len(), 3);
        assert_eq!(
            op.to_string(),
            "{ fn: \"createTable\", params: [\"CarBrands\", \
             { \"id\": { \"autoIncrement\": true, \"primaryKey\": true, \"type\": Sequelize.INTEGER }, \
             \"name\": { \"type\": Sequelize.STRING } }, {}] }"
        );
    }

    #[test]
    fn test_attributes_render_in_reverse_order() {
        let spec = ColumnSpec::new("Sequelize.DATE")
            .allow_null(false)
            .default_value(DefaultValue::Internal("Sequelize.fn('NOW')".to_string()));
        let op = render_action(&Action::add_column("t", "createdAt", spec));

        assert_eq!(
            op.params[2].to_string(),
            "{ \"allowNull\": false, \"type\": Sequelize.DATE, \"defaultValue\": Sequelize.fn('NOW') }"
        );
    }

    #[test]
    fn test_unsupported_default_is_omitted() {
        let spec = ColumnSpec::new("Sequelize.UUID").default_value(DefaultValue::NotSupported);
        let op = render_action(&Action::change_column("t", "id", spec));

        assert_eq!(op.params[2].to_string(), "{ \"type\": Sequelize.UUID }");
    }

    #[test]
    fn test_literal_default_is_data() {
        let spec = ColumnSpec::new("Sequelize.STRING").default_value(DefaultValue::Literal(json!("n/a")));
        let op = render_action(&Action::add_column("t", "label", spec));

        assert_eq!(
            op.params[2].to_string(),
            "{ \"type\": Sequelize.STRING, \"defaultValue\": \"n/a\" }"
        );
    }

    #[test]
    fn test_serialized_raw_is_tagged() {
        let op = render_action(&Action::add_column(
            "t",
            "n",
            ColumnSpec::new("Sequelize.INTEGER").allow_null(true),
        ));
        let json = serde_json::to_value(&op).unwrap();

        assert_eq!(
            json,
            json!({
                "fn": "addColumn",
                "params": ["t", "n", {"allowNull": true, "type": {"$raw": "Sequelize.INTEGER"}}]
            })
        );
    }

    #[test]
    fn test_add_index_params() {
        let index: IndexSpec = IndexDefinition::new(["location"])
            .name("geo")
            .using("GIST")
            .into();
        let op = render_action(&Action::add_index("Places", index));

        assert_eq!(
            op.to_string(),
            "{ fn: \"addIndex\", params: [\"Places\", [\"location\"], { \"name\": \"geo\", \"using\": \"GIST\" }] }"
        );
    }

    #[test]
    fn test_remove_index_by_name_or_fields() {
        let named = render_action(&Action::remove_index(
            "t",
            IndexDefinition::new(["a"]).name("idx_a").into(),
        ));
        let unnamed = render_action(&Action::remove_index("t", IndexDefinition::new(["a", "b"]).into()));

        assert_eq!(named.params[1], Param::Str("idx_a".to_string()));
        assert_eq!(unnamed.params[1], Param::Literal(json!(["a", "b"])));
    }

    #[test]
    fn test_render_keeps_summary_parallel() {
        let actions = vec![
            Action::remove_column("t", "old"),
            Action::drop_table("u", &Default::default()),
        ];
        let plan = render(&actions);

        assert_eq!(plan.operations.len(), 2);
        assert_eq!(
            plan.summary,
            vec!["removeColumn \"old\" from table \"t\"", "dropTable \"u\""]
        );
        assert_eq!(plan.operations[1].to_string(), "{ fn: \"dropTable\", params: [\"u\"] }");
    }
}
