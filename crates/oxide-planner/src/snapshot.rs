//! Schema snapshot types.
//!
//! A snapshot describes the structure of every table at one point in time.
//! Two snapshots are compared by the [`diff`](crate::diff) module; the types
//! here carry no behavior beyond construction, hashing and attribute listing.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::naming::ColumnNamePolicy;

/// All tables of a snapshot, keyed by table name.
pub type Tables = BTreeMap<String, TableSnapshot>;

/// Foreign key target of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Referenced table.
    pub model: String,
    /// Referenced column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Default value of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum DefaultValue {
    /// A plain data value, rendered as a literal.
    Literal(Value),
    /// An engine expression such as `NOW()`, rendered verbatim.
    Internal(String),
    /// A default the snapshot builder could not represent. It takes no part
    /// in diffing or rendering.
    NotSupported,
}

impl DefaultValue {
    /// Value compared by the differ, `None` for unsupported defaults.
    #[must_use]
    pub fn diff_value(&self) -> Option<Value> {
        match self {
            Self::Literal(value) => Some(value.clone()),
            Self::Internal(expr) => {
                let mut map = serde_json::Map::new();
                map.insert("internal".to_string(), Value::Bool(true));
                map.insert("value".to_string(), Value::String(expr.clone()));
                Some(Value::Object(map))
            }
            Self::NotSupported => None,
        }
    }
}

/// Value of one set column attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue<'a> {
    /// An opaque engine expression (the column type).
    Expression(&'a str),
    /// The column default.
    Default(&'a DefaultValue),
    /// Any other attribute, as data.
    Data(Value),
}

impl AttributeValue<'_> {
    /// Value compared by the differ.
    #[must_use]
    pub fn diff_value(&self) -> Option<Value> {
        match self {
            Self::Expression(expr) => Some(Value::String((*expr).to_string())),
            Self::Default(default) => default.diff_value(),
            Self::Data(value) => Some(value.clone()),
        }
    }
}

/// Attributes of a single column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    /// Target column type, kept as an opaque engine expression.
    pub type_expression: String,
    /// Whether NULL is allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_null: Option<bool>,
    /// Whether the column is unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Whether the column is (part of) the primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<bool>,
    /// Whether the column auto-increments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_increment: Option<bool>,
    /// Whether the column is an identity column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_increment_identity: Option<bool>,
    /// Column comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Foreign key target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Reference>,
    /// ON UPDATE behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_update: Option<String>,
    /// ON DELETE behavior.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<String>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<DefaultValue>,
}

impl ColumnSpec {
    /// Creates a column of the given type with no other attribute set.
    #[must_use]
    pub fn new(type_expression: impl Into<String>) -> Self {
        Self {
            type_expression: type_expression.into(),
            ..Self::default()
        }
    }

    /// Sets whether NULL is allowed.
    #[must_use]
    pub fn allow_null(mut self, allow: bool) -> Self {
        self.allow_null = Some(allow);
        self
    }

    /// Marks the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = Some(true);
        self
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = Some(true);
        self
    }

    /// Marks the column as auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = Some(true);
        self
    }

    /// Sets the column comment.
    #[must_use]
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Makes the column a foreign key to `model`.
    #[must_use]
    pub fn references(mut self, model: impl Into<String>, key: Option<&str>) -> Self {
        self.references = Some(Reference {
            model: model.into(),
            key: key.map(str::to_string),
        });
        self
    }

    /// Sets the ON UPDATE behavior.
    #[must_use]
    pub fn on_update(mut self, action: impl Into<String>) -> Self {
        self.on_update = Some(action.into());
        self
    }

    /// Sets the ON DELETE behavior.
    #[must_use]
    pub fn on_delete(mut self, action: impl Into<String>) -> Self {
        self.on_delete = Some(action.into());
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Returns the referenced table, if this column is a foreign key.
    #[must_use]
    pub fn referenced_table(&self) -> Option<&str> {
        self.references.as_ref().map(|r| r.model.as_str())
    }

    /// Returns every set attribute in insertion order.
    ///
    /// The default comes first, then the type, then the remaining flags in a
    /// fixed order. Unset attributes are skipped.
    #[must_use]
    pub fn attributes(&self) -> Vec<(&'static str, AttributeValue<'_>)> {
        let mut attrs = Vec::new();

        if let Some(ref default) = self.default_value {
            attrs.push(("defaultValue", AttributeValue::Default(default)));
        }
        attrs.push(("type", AttributeValue::Expression(&self.type_expression)));

        let flags = [
            ("allowNull", self.allow_null),
            ("unique", self.unique),
            ("primaryKey", self.primary_key),
            ("autoIncrement", self.auto_increment),
            ("autoIncrementIdentity", self.auto_increment_identity),
        ];
        for (name, flag) in flags {
            if let Some(flag) = flag {
                attrs.push((name, AttributeValue::Data(Value::Bool(flag))));
            }
        }

        if let Some(ref comment) = self.comment {
            attrs.push(("comment", AttributeValue::Data(Value::String(comment.clone()))));
        }
        if let Some(ref reference) = self.references {
            let mut map = serde_json::Map::new();
            map.insert("model".to_string(), Value::String(reference.model.clone()));
            if let Some(ref key) = reference.key {
                map.insert("key".to_string(), Value::String(key.clone()));
            }
            attrs.push(("references", AttributeValue::Data(Value::Object(map))));
        }
        if let Some(ref action) = self.on_update {
            attrs.push(("onUpdate", AttributeValue::Data(Value::String(action.clone()))));
        }
        if let Some(ref action) = self.on_delete {
            attrs.push(("onDelete", AttributeValue::Data(Value::String(action.clone()))));
        }

        attrs
    }
}

/// Extra index options passed through to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Index type, e.g. `UNIQUE`, `FULLTEXT`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,
    /// Index method, e.g. `GIST`, `BTREE`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub using: Option<String>,
    /// Index name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Parser for FULLTEXT indexes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser: Option<String>,
}

impl IndexOptions {
    /// Returns true if no option is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index_type.is_none()
            && self.using.is_none()
            && self.name.is_none()
            && self.parser.is_none()
    }
}

/// A normalized index as stored in a snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether the index is unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Whether the index is created concurrently.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrently: Option<bool>,
    /// Indexed fields.
    pub fields: Vec<String>,
    /// Operator class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    /// Partial index condition.
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Value>,
    /// Engine options.
    #[serde(default)]
    pub options: IndexOptions,
}

impl IndexSpec {
    /// Content hash identifying this index inside a table snapshot.
    ///
    /// The hash covers every attribute, so two declarations of the same index
    /// share a key no matter where they appear in the model.
    #[must_use]
    pub fn key(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let hash = Sha256::digest(canonical.as_bytes());
        format!("{:x}", hash)
    }

    /// Index name if any, taken from the options first.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.options.name.as_deref().or(self.name.as_deref())
    }
}

/// An index as declared on a model, before normalization.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name.
    #[serde(default)]
    pub name: Option<String>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: Option<bool>,
    /// Whether the index is created concurrently.
    #[serde(default)]
    pub concurrently: Option<bool>,
    /// Indexed fields.
    pub fields: Vec<String>,
    /// Operator class.
    #[serde(default)]
    pub operator: Option<String>,
    /// Partial index condition.
    #[serde(rename = "where", default)]
    pub condition: Option<Value>,
    /// Index type.
    #[serde(rename = "type", default)]
    pub index_type: Option<String>,
    /// Index method.
    #[serde(default)]
    pub using: Option<String>,
    /// FULLTEXT parser.
    #[serde(default)]
    pub parser: Option<String>,
}

impl IndexDefinition {
    /// Creates a definition over the given fields.
    #[must_use]
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sets the index name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Marks the index as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = Some(true);
        self
    }

    /// Sets the index method.
    #[must_use]
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.using = Some(method.into());
        self
    }

    /// Sets the index type.
    #[must_use]
    pub fn index_type(mut self, index_type: impl Into<String>) -> Self {
        self.index_type = Some(index_type.into());
        self
    }

    /// Sets a partial index condition.
    #[must_use]
    pub fn condition(mut self, condition: Value) -> Self {
        self.condition = Some(condition);
        self
    }
}

impl From<IndexDefinition> for IndexSpec {
    fn from(def: IndexDefinition) -> Self {
        let mut options = IndexOptions {
            index_type: def.index_type,
            using: def.using,
            name: def.name.clone(),
            parser: None,
        };
        if def.unique == Some(true) {
            options.index_type = Some("UNIQUE".to_string());
        }
        if let Some(parser) = def.parser.filter(|p| !p.is_empty()) {
            options.parser = Some(parser);
        }

        Self {
            name: def.name,
            unique: def.unique,
            concurrently: def.concurrently,
            fields: def.fields,
            operator: def.operator,
            condition: def.condition,
            options,
        }
    }
}

/// Structure of a single table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    /// Table name.
    pub table_name: String,
    /// Columns in declaration order.
    pub schema: IndexMap<String, ColumnSpec>,
    /// Indexes keyed by [`IndexSpec::key`]. Keys read from JSON are
    /// discarded and recomputed from content.
    #[serde(default, deserialize_with = "deserialize_indexes")]
    pub indexes: BTreeMap<String, IndexSpec>,
}

fn deserialize_indexes<'de, D>(deserializer: D) -> Result<BTreeMap<String, IndexSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    let stored = BTreeMap::<String, IndexSpec>::deserialize(deserializer)?;
    Ok(stored
        .into_values()
        .map(|index| (index.key(), index))
        .collect())
}

impl TableSnapshot {
    /// Creates an empty table.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            schema: IndexMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, name: impl Into<String>, spec: ColumnSpec) -> Self {
        self.schema.insert(name.into(), spec);
        self
    }

    /// Adds an index under its content hash.
    #[must_use]
    pub fn index(mut self, index: impl Into<IndexSpec>) -> Self {
        let index = index.into();
        self.indexes.insert(index.key(), index);
        self
    }

    /// Returns a copy with every column key mapped through `policy`.
    #[must_use]
    pub fn with_column_policy(&self, policy: ColumnNamePolicy) -> Self {
        Self {
            table_name: self.table_name.clone(),
            schema: self
                .schema
                .iter()
                .map(|(name, spec)| (policy.apply(name), spec.clone()))
                .collect(),
            indexes: self.indexes.clone(),
        }
    }

    /// Tables referenced by any column, in column order, without duplicates.
    #[must_use]
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        for spec in self.schema.values() {
            if let Some(model) = spec.referenced_table() {
                if !tables.iter().any(|t| t == model) {
                    tables.push(model.to_string());
                }
            }
        }
        tables
    }
}

/// Builds a table map from a list of tables.
#[must_use]
pub fn tables<I>(items: I) -> Tables
where
    I: IntoIterator<Item = TableSnapshot>,
{
    items
        .into_iter()
        .map(|t| (t.table_name.clone(), t))
        .collect()
}
