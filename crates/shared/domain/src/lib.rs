//! Domain layer - Records, entity descriptors and the association graph model.
//!
//! This crate contains the pure data model of the soft-delete engine with no
//! infrastructure dependencies. Storage, callbacks and cascading live in the
//! `engine` crate; this crate only describes what a record and a schema are.

pub mod association;
pub mod constants;
pub mod entity;
pub mod error;
pub mod record;

pub use association::{Association, AssociationKind, Target};
pub use constants::*;
pub use entity::{Column, ColumnKind, EntityDef, EntityTypeId, KeyKind, SchemaConfig};
pub use error::{DomainError, DomainResult};
pub use record::{AttrValue, Checkpoint, Record, RecordId, RecordKey, Timestamp};
