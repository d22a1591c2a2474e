//! Structural differ.
//!
//! Walks two table maps side by side and reports every structural difference
//! as a [`DiffEntry`]. The walk is typed: a path is always one of the shapes
//! of [`DiffPath`], so the deriver can dispatch on it exhaustively.

use std::fmt;

use serde_json::Value;

use crate::snapshot::{ColumnSpec, IndexSpec, TableSnapshot, Tables};

/// Location of a difference inside the snapshot tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffPath {
    /// `[table]`
    Table {
        /// Table name.
        table: String,
    },
    /// `[table, field]` for scalar fields of the table itself.
    TableField {
        /// Table name.
        table: String,
        /// Field name.
        field: String,
    },
    /// `[table, "schema", column]`
    Column {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// `[table, "schema", column, attribute...]`
    ColumnAttribute {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Attribute name followed by nested keys or array indices.
        attribute: Vec<String>,
    },
    /// `[table, "indexes", key]`
    Index {
        /// Table name.
        table: String,
        /// Index content hash.
        key: String,
    },
    /// `[table, "indexes", key, attribute...]`
    IndexAttribute {
        /// Table name.
        table: String,
        /// Index content hash.
        key: String,
        /// Attribute name followed by nested keys or array indices.
        attribute: Vec<String>,
    },
}

impl DiffPath {
    /// Table the path starts at.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Table { table }
            | Self::TableField { table, .. }
            | Self::Column { table, .. }
            | Self::ColumnAttribute { table, .. }
            | Self::Index { table, .. }
            | Self::IndexAttribute { table, .. } => table,
        }
    }

    /// The path as a flat list of keys.
    #[must_use]
    pub fn segments(&self) -> Vec<String> {
        match self {
            Self::Table { table } => vec![table.clone()],
            Self::TableField { table, field } => vec![table.clone(), field.clone()],
            Self::Column { table, column } => {
                vec![table.clone(), "schema".to_string(), column.clone()]
            }
            Self::ColumnAttribute {
                table,
                column,
                attribute,
            } => {
                let mut segments = vec![table.clone(), "schema".to_string(), column.clone()];
                segments.extend(attribute.iter().cloned());
                segments
            }
            Self::Index { table, key } => vec![table.clone(), "indexes".to_string(), key.clone()],
            Self::IndexAttribute {
                table,
                key,
                attribute,
            } => {
                let mut segments = vec![table.clone(), "indexes".to_string(), key.clone()];
                segments.extend(attribute.iter().cloned());
                segments
            }
        }
    }
}

impl fmt::Display for DiffPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments().join("."))
    }
}

/// A whole node that appeared or disappeared.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffNode {
    /// A table.
    Table(TableSnapshot),
    /// A column.
    Column(ColumnSpec),
    /// An index.
    Index(IndexSpec),
    /// An attribute value.
    Value(Value),
}

/// Discriminant of a [`DiffEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Present only on the new side.
    New,
    /// Present only on the old side.
    Deleted,
    /// A scalar that differs between both sides.
    Edited,
    /// An element inserted into or removed from a sequence.
    ArrayChanged,
}

/// A single structural difference.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffEntry {
    /// Present only on the new side.
    New {
        /// Location.
        path: DiffPath,
        /// The new node.
        rhs: DiffNode,
    },
    /// Present only on the old side.
    Deleted {
        /// Location.
        path: DiffPath,
        /// The removed node.
        lhs: DiffNode,
    },
    /// A scalar leaf that differs.
    Edited {
        /// Location.
        path: DiffPath,
        /// Old value.
        lhs: Value,
        /// New value.
        rhs: Value,
    },
    /// A sequence element present on one side only.
    ArrayChanged {
        /// Location of the sequence.
        path: DiffPath,
        /// Element index.
        index: usize,
        /// Removed element.
        lhs: Option<Value>,
        /// Inserted element.
        rhs: Option<Value>,
    },
}

impl DiffEntry {
    /// Location of this entry.
    #[must_use]
    pub fn path(&self) -> &DiffPath {
        match self {
            Self::New { path, .. }
            | Self::Deleted { path, .. }
            | Self::Edited { path, .. }
            | Self::ArrayChanged { path, .. } => path,
        }
    }

    /// Kind of this entry.
    #[must_use]
    pub fn kind(&self) -> DiffKind {
        match self {
            Self::New { .. } => DiffKind::New,
            Self::Deleted { .. } => DiffKind::Deleted,
            Self::Edited { .. } => DiffKind::Edited,
            Self::ArrayChanged { .. } => DiffKind::ArrayChanged,
        }
    }
}

/// Owner of an attribute subtree, used to build attribute paths.
enum AttributeOwner<'a> {
    Column { table: &'a str, column: &'a str },
    Index { table: &'a str, key: &'a str },
}

impl AttributeOwner<'_> {
    fn path(&self, attribute: Vec<String>) -> DiffPath {
        match *self {
            Self::Column { table, column } => DiffPath::ColumnAttribute {
                table: table.to_string(),
                column: column.to_string(),
                attribute,
            },
            Self::Index { table, key } => DiffPath::IndexAttribute {
                table: table.to_string(),
                key: key.to_string(),
                attribute,
            },
        }
    }
}

/// Compares two table maps and returns every difference from `old` to `new`.
///
/// Tables present on one side only are reported as a single table-level
/// entry. Entries for shared tables come in `old` key order, followed by
/// tables that only exist in `new`.
#[must_use]
pub fn diff(old: &Tables, new: &Tables) -> Vec<DiffEntry> {
    let mut entries = Vec::new();

    for (name, old_table) in old {
        match new.get(name) {
            Some(new_table) => diff_table(name, old_table, new_table, &mut entries),
            None => entries.push(DiffEntry::Deleted {
                path: DiffPath::Table {
                    table: name.clone(),
                },
                lhs: DiffNode::Table(old_table.clone()),
            }),
        }
    }

    for (name, new_table) in new {
        if !old.contains_key(name) {
            entries.push(DiffEntry::New {
                path: DiffPath::Table {
                    table: name.clone(),
                },
                rhs: DiffNode::Table(new_table.clone()),
            });
        }
    }

    entries
}

fn diff_table(name: &str, old: &TableSnapshot, new: &TableSnapshot, out: &mut Vec<DiffEntry>) {
    if old.table_name != new.table_name {
        out.push(DiffEntry::Edited {
            path: DiffPath::TableField {
                table: name.to_string(),
                field: "tableName".to_string(),
            },
            lhs: Value::String(old.table_name.clone()),
            rhs: Value::String(new.table_name.clone()),
        });
    }

    // Columns
    for (column, old_spec) in &old.schema {
        match new.schema.get(column) {
            Some(new_spec) => diff_column(name, column, old_spec, new_spec, out),
            None => out.push(DiffEntry::Deleted {
                path: DiffPath::Column {
                    table: name.to_string(),
                    column: column.clone(),
                },
                lhs: DiffNode::Column(old_spec.clone()),
            }),
        }
    }
    for (column, new_spec) in &new.schema {
        if !old.schema.contains_key(column) {
            out.push(DiffEntry::New {
                path: DiffPath::Column {
                    table: name.to_string(),
                    column: column.clone(),
                },
                rhs: DiffNode::Column(new_spec.clone()),
            });
        }
    }

    // Indexes
    for (key, old_index) in &old.indexes {
        match new.indexes.get(key) {
            Some(new_index) => {
                let owner = AttributeOwner::Index { table: name, key };
                let lhs = serde_json::to_value(old_index).unwrap_or(Value::Null);
                let rhs = serde_json::to_value(new_index).unwrap_or(Value::Null);
                diff_object_fields(&owner, Vec::new(), &lhs, &rhs, out);
            }
            None => out.push(DiffEntry::Deleted {
                path: DiffPath::Index {
                    table: name.to_string(),
                    key: key.clone(),
                },
                lhs: DiffNode::Index(old_index.clone()),
            }),
        }
    }
    for (key, new_index) in &new.indexes {
        if !old.indexes.contains_key(key) {
            out.push(DiffEntry::New {
                path: DiffPath::Index {
                    table: name.to_string(),
                    key: key.clone(),
                },
                rhs: DiffNode::Index(new_index.clone()),
            });
        }
    }
}

fn diff_column(
    table: &str,
    column: &str,
    old: &ColumnSpec,
    new: &ColumnSpec,
    out: &mut Vec<DiffEntry>,
) {
    let owner = AttributeOwner::Column { table, column };
    let old_attrs = diff_surface(old);
    let new_attrs = diff_surface(new);

    for (name, lhs) in &old_attrs {
        let attribute = vec![(*name).to_string()];
        match new_attrs.iter().find(|(n, _)| n == name) {
            Some((_, rhs)) => diff_value(&owner, attribute, lhs, rhs, out),
            None => out.push(DiffEntry::Deleted {
                path: owner.path(attribute),
                lhs: DiffNode::Value(lhs.clone()),
            }),
        }
    }
    for (name, rhs) in &new_attrs {
        if !old_attrs.iter().any(|(n, _)| n == name) {
            out.push(DiffEntry::New {
                path: owner.path(vec![(*name).to_string()]),
                rhs: DiffNode::Value(rhs.clone()),
            });
        }
    }
}

/// Attributes that take part in diffing. Unsupported defaults are left out.
fn diff_surface(spec: &ColumnSpec) -> Vec<(&'static str, Value)> {
    spec.attributes()
        .into_iter()
        .filter_map(|(name, value)| value.diff_value().map(|v| (name, v)))
        .collect()
}

fn diff_value(
    owner: &AttributeOwner<'_>,
    path: Vec<String>,
    lhs: &Value,
    rhs: &Value,
    out: &mut Vec<DiffEntry>,
) {
    if lhs == rhs {
        return;
    }

    match (lhs, rhs) {
        (Value::Object(_), Value::Object(_)) => diff_object_fields(owner, path, lhs, rhs, out),
        (Value::Array(old_items), Value::Array(new_items)) => {
            let shared = old_items.len().min(new_items.len());
            for i in 0..shared {
                let mut item_path = path.clone();
                item_path.push(i.to_string());
                diff_value(owner, item_path, &old_items[i], &new_items[i], out);
            }
            for (i, item) in old_items.iter().enumerate().skip(shared) {
                out.push(DiffEntry::ArrayChanged {
                    path: owner.path(path.clone()),
                    index: i,
                    lhs: Some(item.clone()),
                    rhs: None,
                });
            }
            for (i, item) in new_items.iter().enumerate().skip(shared) {
                out.push(DiffEntry::ArrayChanged {
                    path: owner.path(path.clone()),
                    index: i,
                    lhs: None,
                    rhs: Some(item.clone()),
                });
            }
        }
        _ => out.push(DiffEntry::Edited {
            path: owner.path(path),
            lhs: lhs.clone(),
            rhs: rhs.clone(),
        }),
    }
}

fn diff_object_fields(
    owner: &AttributeOwner<'_>,
    path: Vec<String>,
    lhs: &Value,
    rhs: &Value,
    out: &mut Vec<DiffEntry>,
) {
    let (Some(old_map), Some(new_map)) = (lhs.as_object(), rhs.as_object()) else {
        return;
    };

    for (key, old_value) in old_map {
        let mut child = path.clone();
        child.push(key.clone());
        match new_map.get(key) {
            Some(new_value) => diff_value(owner, child, old_value, new_value, out),
            None => out.push(DiffEntry::Deleted {
                path: owner.path(child),
                lhs: DiffNode::Value(old_value.clone()),
            }),
        }
    }
    for (key, new_value) in new_map {
        if !old_map.contains_key(key) {
            let mut child = path.clone();
            child.push(key.clone());
            out.push(DiffEntry::New {
                path: owner.path(child),
                rhs: DiffNode::Value(new_value.clone()),
            });
        }
    }
}
