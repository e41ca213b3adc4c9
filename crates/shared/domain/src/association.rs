//! Association edges between entity types.
//!
//! An association is declared on its owner type and names the target type
//! by entity name. Only edges flagged `dependent` take part in cascades.

use serde::{Deserialize, Serialize};

/// Target of a `belongs_to` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Fixed entity type
    Entity(String),
    /// Entity type named at runtime by a column on the owner row
    Polymorphic { type_column: String },
}

/// Relationship shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssociationKind {
    /// Owner row holds `foreign_key` pointing at the target's primary key
    BelongsTo { target: Target, foreign_key: String },
    /// Target rows hold `foreign_key` pointing at the owner's primary key.
    /// With `as_type`, the target also stores the owner's type name there.
    HasOne {
        target: String,
        foreign_key: String,
        #[serde(default)]
        as_type: Option<String>,
    },
    HasMany {
        target: String,
        foreign_key: String,
        #[serde(default)]
        as_type: Option<String>,
    },
    /// Targets reached by following `through` on the owner, then `source`
    /// on the intermediate type
    HasManyThrough { through: String, source: String },
}

/// Declared association edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub name: String,
    #[serde(flatten)]
    pub kind: AssociationKind,
    /// Destroying the owner destroys the targets (`dependent: destroy`)
    #[serde(default)]
    pub dependent: bool,
    /// Denormalized counter maintained for this edge
    #[serde(default)]
    pub counter_cache: Option<String>,
}

impl Association {
    fn new(name: impl Into<String>, kind: AssociationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            dependent: false,
            counter_cache: None,
        }
    }

    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AssociationKind::BelongsTo {
                target: Target::Entity(target.into()),
                foreign_key: foreign_key.into(),
            },
        )
    }

    pub fn belongs_to_polymorphic(
        name: impl Into<String>,
        foreign_key: impl Into<String>,
        type_column: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AssociationKind::BelongsTo {
                target: Target::Polymorphic {
                    type_column: type_column.into(),
                },
                foreign_key: foreign_key.into(),
            },
        )
    }

    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AssociationKind::HasOne {
                target: target.into(),
                foreign_key: foreign_key.into(),
                as_type: None,
            },
        )
    }

    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AssociationKind::HasMany {
                target: target.into(),
                foreign_key: foreign_key.into(),
                as_type: None,
            },
        )
    }

    pub fn has_many_through(
        name: impl Into<String>,
        through: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AssociationKind::HasManyThrough {
                through: through.into(),
                source: source.into(),
            },
        )
    }

    /// Mark the edge as cascading.
    pub fn dependent(mut self) -> Self {
        self.dependent = true;
        self
    }

    pub fn counter_cache(mut self, column: impl Into<String>) -> Self {
        self.counter_cache = Some(column.into());
        self
    }

    /// Store the owner's type name in `type_column` on the target (`as:`).
    /// Has no effect on `belongs_to` and through edges.
    pub fn as_polymorphic(mut self, type_column: impl Into<String>) -> Self {
        match &mut self.kind {
            AssociationKind::HasOne { as_type, .. } | AssociationKind::HasMany { as_type, .. } => {
                *as_type = Some(type_column.into());
            }
            _ => {}
        }
        self
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            AssociationKind::HasMany { .. } | AssociationKind::HasManyThrough { .. }
        )
    }

    pub fn is_through(&self) -> bool {
        matches!(self.kind, AssociationKind::HasManyThrough { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            AssociationKind::BelongsTo { .. } => "belongs_to",
            AssociationKind::HasOne { .. } => "has_one",
            AssociationKind::HasMany { .. } => "has_many",
            AssociationKind::HasManyThrough { .. } => "has_many_through",
        }
    }
}
