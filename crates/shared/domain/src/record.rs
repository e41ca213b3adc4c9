//! Record value type and its identifiers.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{EntityTypeId, KeyKind};
use crate::error::{DomainError, DomainResult};

/// Destruction timestamp. Doubles as the cascade correlation token.
pub type Timestamp = DateTime<Utc>;

/// Primary key value of a record, scoped to its entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Uuid(Uuid),
}

impl RecordId {
    /// Parse a textual id (e.g. a URL segment) for the given key kind.
    pub fn parse(kind: KeyKind, raw: &str) -> DomainResult<Self> {
        match kind {
            KeyKind::Integer => raw
                .parse::<i64>()
                .map(RecordId::Int)
                .map_err(|_| DomainError::invalid_id(raw)),
            KeyKind::Uuid => Uuid::parse_str(raw)
                .map(RecordId::Uuid)
                .map_err(|_| DomainError::invalid_id(raw)),
        }
    }

    pub fn kind(&self) -> KeyKind {
        match self {
            RecordId::Int(_) => KeyKind::Integer,
            RecordId::Uuid(_) => KeyKind::Uuid,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(id) => write!(f, "{}", id),
            RecordId::Uuid(id) => write!(f, "{}", id),
        }
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        RecordId::Int(id)
    }
}

impl From<Uuid> for RecordId {
    fn from(id: Uuid) -> Self {
        RecordId::Uuid(id)
    }
}

/// Identity of a record across entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub entity: EntityTypeId,
    pub id: RecordId,
}

/// Attribute value of a record column.
///
/// Strings always deserialize as `Text`; the column kind decides whether
/// they are stored as text, a uuid or a timestamp. `Uuid` and `Timestamp`
/// come from typed columns read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// Interpret the value as a foreign key.
    pub fn as_record_id(&self) -> Option<RecordId> {
        match self {
            AttrValue::Int(id) => Some(RecordId::Int(*id)),
            AttrValue::Uuid(id) => Some(RecordId::Uuid(*id)),
            AttrValue::Text(raw) => Uuid::parse_str(raw).ok().map(RecordId::Uuid),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }
}

impl From<RecordId> for AttrValue {
    fn from(id: RecordId) -> Self {
        match id {
            RecordId::Int(id) => AttrValue::Int(id),
            RecordId::Uuid(id) => AttrValue::Uuid(id),
        }
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<Uuid> for AttrValue {
    fn from(v: Uuid) -> Self {
        AttrValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(v: DateTime<Utc>) -> Self {
        AttrValue::Timestamp(v)
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

/// In-memory destruction bookkeeping, captured so a failed unit of work can
/// put the record back the way it found it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    destroyed_at: Option<Timestamp>,
    marked_for_destruction_at: Option<Timestamp>,
}

/// One row of one entity type.
///
/// `destroyed_at` of `None` means the record is active. A record that carries
/// a timestamp is never considered persisted, even when its row exists.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    #[serde(skip)]
    pub entity: EntityTypeId,
    pub id: RecordId,
    pub destroyed_at: Option<Timestamp>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttrValue>,
    #[serde(skip)]
    marked_for_destruction_at: Option<Timestamp>,
    #[serde(skip)]
    associations: BTreeMap<String, Vec<Record>>,
}

impl Record {
    /// Create an active record with no attributes loaded.
    pub fn new(entity: EntityTypeId, id: RecordId) -> Self {
        Self {
            entity,
            id,
            destroyed_at: None,
            attributes: BTreeMap::new(),
            marked_for_destruction_at: None,
            associations: BTreeMap::new(),
        }
    }

    pub fn with_destroyed_at(mut self, destroyed_at: Option<Timestamp>) -> Self {
        self.destroyed_at = destroyed_at;
        self
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            entity: self.entity,
            id: self.id,
        }
    }

    /// Attribute value, `None` when the column was not loaded.
    pub fn get(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed_at.is_some()
    }

    pub fn is_persisted(&self) -> bool {
        !self.is_destroyed()
    }

    /// Stage this record for destruction at `at` by a later autosave of its owner.
    pub fn mark_for_destruction(&mut self, at: Timestamp) {
        self.marked_for_destruction_at = Some(at);
    }

    pub fn marked_for_destruction_at(&self) -> Option<Timestamp> {
        self.marked_for_destruction_at
    }

    pub fn is_marked_for_destruction(&self) -> bool {
        self.marked_for_destruction_at.is_some()
    }

    pub fn clear_destruction_mark(&mut self) {
        self.marked_for_destruction_at = None;
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            destroyed_at: self.destroyed_at,
            marked_for_destruction_at: self.marked_for_destruction_at,
        }
    }

    pub fn rollback_to(&mut self, checkpoint: Checkpoint) {
        self.destroyed_at = checkpoint.destroyed_at;
        self.marked_for_destruction_at = checkpoint.marked_for_destruction_at;
    }

    // Association cache

    pub fn cached(&self, association: &str) -> Option<&[Record]> {
        self.associations.get(association).map(Vec::as_slice)
    }

    pub fn cached_mut(&mut self, association: &str) -> Option<&mut Vec<Record>> {
        self.associations.get_mut(association)
    }

    pub fn cache(&mut self, association: impl Into<String>, records: Vec<Record>) {
        self.associations.insert(association.into(), records);
    }

    /// Drop the cached targets of an association so the next read reloads them.
    pub fn invalidate(&mut self, association: &str) -> bool {
        self.associations.remove(association).is_some()
    }

    pub fn cached_associations(&self) -> impl Iterator<Item = &str> {
        self.associations.keys().map(String::as_str)
    }
}

/// Records compare by identity and stored state, never by cache contents.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.entity == other.entity
            && self.id == other.id
            && self.destroyed_at == other.destroyed_at
            && self.attributes == other.attributes
    }
}
