//! Entity type descriptors.
//!
//! An [`EntityDef`] is the static, declarative description of one entity
//! type: where its rows live, whether it supports soft deletion, which
//! columns it exposes and how it relates to other types. Definitions are
//! either written in code with the builder methods or loaded from a
//! [`SchemaConfig`] document.

use serde::{Deserialize, Serialize};

use crate::association::Association;
use crate::constants::DEFAULT_PRIMARY_KEY;

/// Index of an entity type inside a built registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EntityTypeId(pub usize);

/// Primary key representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    #[default]
    Integer,
    Uuid,
}

/// Storage kind of an attribute column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
    Bool,
    Uuid,
    Timestamp,
}

impl From<KeyKind> for ColumnKind {
    fn from(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Integer => ColumnKind::Integer,
            KeyKind::Uuid => ColumnKind::Uuid,
        }
    }
}

/// Attribute column loaded into [`crate::Record::attributes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

/// Declarative description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDef {
    /// Type name, also written into polymorphic type columns
    pub name: String,
    pub table: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub key_kind: KeyKind,
    /// Whether rows are soft deleted; otherwise destroy removes the row
    #[serde(default)]
    pub soft_delete: bool,
    /// Overrides the configured destruction timestamp column
    #[serde(default)]
    pub destroyed_at_column: Option<String>,
    /// URL path segment for the HTTP layer; defaults to the table name
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub associations: Vec<Association>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            primary_key: default_primary_key(),
            key_kind: KeyKind::Integer,
            soft_delete: false,
            destroyed_at_column: None,
            resource: None,
            columns: Vec::new(),
            associations: Vec::new(),
        }
    }

    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    pub fn destroyed_at_column(mut self, column: impl Into<String>) -> Self {
        self.soft_delete = true;
        self.destroyed_at_column = Some(column.into());
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>, kind: KeyKind) -> Self {
        self.primary_key = column.into();
        self.key_kind = kind;
        self
    }

    pub fn resource(mut self, path: impl Into<String>) -> Self {
        self.resource = Some(path.into());
        self
    }

    pub fn column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.columns.push(Column {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn resource_path(&self) -> &str {
        self.resource.as_deref().unwrap_or(&self.table)
    }
}

/// Schema document listing every entity type of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    pub entities: Vec<EntityDef>,
}
