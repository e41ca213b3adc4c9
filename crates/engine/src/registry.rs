//! Association graph registry.
//!
//! Entity types are registered once at startup and frozen into an arena
//! indexed by [`EntityTypeId`]. Building the registry resolves every edge to
//! concrete type ids, validates `through`/`source` references and computes
//! each type's cascade plan, so traversal never has to re-inspect
//! declarations at runtime.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use domain::{
    Association, AssociationKind, Column, ColumnKind, DomainError, DomainResult, EntityDef,
    EntityTypeId, KeyKind, SchemaConfig, Target, DEFAULT_DESTROYED_AT_COLUMN,
};

use common::EngineConfig;

use crate::callbacks::Callbacks;

/// Target of a resolved `belongs_to` edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BelongsToTarget {
    Fixed(EntityTypeId),
    /// Looked up by name from `type_column` at traversal time
    Polymorphic { type_column: String },
}

/// Edge with every name resolved against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    BelongsTo {
        target: BelongsToTarget,
        foreign_key: String,
    },
    /// `has_one` (`single`) or `has_many`
    Owned {
        target: EntityTypeId,
        foreign_key: String,
        as_type: Option<String>,
        single: bool,
    },
    Through {
        /// Index of the intermediate edge on the owner
        through: usize,
        intermediate: EntityTypeId,
        /// Index of the source edge on the intermediate type
        source: usize,
    },
}

/// Declared association plus its resolution.
#[derive(Debug, Clone)]
pub struct Edge {
    pub def: Association,
    pub resolved: Resolved,
    /// Owner-side counter this edge keeps in sync during cascades. `None` when
    /// the target's inverse `belongs_to` already maintains it.
    pub owner_counter: Option<String>,
}

impl Edge {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

/// One step of a cascade: the declared dependent edge and the edge actually
/// walked (differs for `has_many_through`, which walks its intermediate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeStep {
    pub edge: usize,
    pub via: usize,
}

/// Registered entity type.
pub struct EntityType {
    id: EntityTypeId,
    def: EntityDef,
    destroyed_at_column: Option<String>,
    edges: Vec<Edge>,
    cascade: Vec<CascadeStep>,
    callbacks: Vec<Arc<dyn Callbacks>>,
}

impl EntityType {
    pub fn id(&self) -> EntityTypeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn table(&self) -> &str {
        &self.def.table
    }

    pub fn primary_key(&self) -> &str {
        &self.def.primary_key
    }

    pub fn key_kind(&self) -> KeyKind {
        self.def.key_kind
    }

    pub fn resource_path(&self) -> &str {
        self.def.resource_path()
    }

    /// Attribute columns, including foreign keys added for `belongs_to` edges.
    pub fn columns(&self) -> &[Column] {
        &self.def.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.def.columns.iter().find(|c| c.name == name)
    }

    /// Soft-delete capability: `None` means destroy removes the row.
    pub fn destroyed_at_column(&self) -> Option<&str> {
        self.destroyed_at_column.as_deref()
    }

    pub fn is_soft_deletable(&self) -> bool {
        self.destroyed_at_column.is_some()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> &Edge {
        &self.edges[index]
    }

    pub fn edge_index(&self, name: &str) -> Option<usize> {
        self.edges.iter().position(|e| e.def.name == name)
    }

    /// Names of the associations whose cached targets go stale when the
    /// targets of edge `index` change: the edge itself and every through
    /// edge routed over it.
    pub fn dependent_caches(&self, index: usize) -> impl Iterator<Item = &str> {
        self.edges.iter().enumerate().filter_map(move |(i, edge)| {
            let routed = matches!(edge.resolved, Resolved::Through { through, .. } if through == index);
            (i == index || routed).then(|| edge.name())
        })
    }

    /// Cascade-flagged edges in declaration order.
    pub fn cascade_steps(&self) -> &[CascadeStep] {
        &self.cascade
    }

    pub fn callbacks(&self) -> &[Arc<dyn Callbacks>] {
        &self.callbacks
    }
}

impl fmt::Debug for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityType")
            .field("id", &self.id)
            .field("name", &self.def.name)
            .field("table", &self.def.table)
            .field("destroyed_at_column", &self.destroyed_at_column)
            .field("edges", &self.edges.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

/// Read-only arena of entity types.
#[derive(Debug)]
pub struct Registry {
    types: Vec<EntityType>,
    by_name: HashMap<String, EntityTypeId>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Build a registry from a schema document without callbacks.
    pub fn from_schema(schema: SchemaConfig, config: &EngineConfig) -> DomainResult<Self> {
        let mut builder = RegistryBuilder::new().destroyed_at_column(&config.destroyed_at_column);
        for def in schema.entities {
            builder = builder.entity(def);
        }
        builder.build()
    }

    pub fn get(&self, id: EntityTypeId) -> Option<&EntityType> {
        self.types.get(id.0)
    }

    pub fn entity(&self, id: EntityTypeId) -> DomainResult<&EntityType> {
        self.get(id)
            .ok_or_else(|| DomainError::unknown_entity(format!("#{}", id.0)))
    }

    pub fn lookup(&self, name: &str) -> DomainResult<&EntityType> {
        self.by_name
            .get(name)
            .map(|id| &self.types[id.0])
            .ok_or_else(|| DomainError::unknown_entity(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Collects entity definitions and callbacks, then resolves them.
pub struct RegistryBuilder {
    defs: Vec<EntityDef>,
    callbacks: Vec<(String, Arc<dyn Callbacks>)>,
    destroyed_at_column: String,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            defs: Vec::new(),
            callbacks: Vec::new(),
            destroyed_at_column: DEFAULT_DESTROYED_AT_COLUMN.to_string(),
        }
    }

    /// Column used by soft-deletable types that do not name their own.
    pub fn destroyed_at_column(mut self, column: impl Into<String>) -> Self {
        self.destroyed_at_column = column.into();
        self
    }

    pub fn entity(mut self, def: EntityDef) -> Self {
        self.defs.push(def);
        self
    }

    /// Register hooks for an entity type. Hooks run in registration order.
    pub fn callbacks(mut self, entity: impl Into<String>, hooks: Arc<dyn Callbacks>) -> Self {
        self.callbacks.push((entity.into(), hooks));
        self
    }

    pub fn build(self) -> DomainResult<Registry> {
        let RegistryBuilder {
            mut defs,
            callbacks,
            destroyed_at_column,
        } = self;

        let mut by_name = HashMap::with_capacity(defs.len());
        for (index, def) in defs.iter().enumerate() {
            if by_name.insert(def.name.clone(), EntityTypeId(index)).is_some() {
                return Err(DomainError::conflict(format!("Entity type {}", def.name)));
            }
        }

        add_foreign_key_columns(&mut defs, &by_name)?;

        let mut types = Vec::with_capacity(defs.len());
        for (index, def) in defs.iter().enumerate() {
            let edges = def
                .associations
                .iter()
                .map(|assoc| resolve_edge(def, assoc, &defs, &by_name))
                .collect::<DomainResult<Vec<_>>>()?;
            let cascade = cascade_plan(&edges);

            let destroyed_at_column = def.soft_delete.then(|| {
                def.destroyed_at_column
                    .clone()
                    .unwrap_or_else(|| destroyed_at_column.clone())
            });

            types.push(EntityType {
                id: EntityTypeId(index),
                def: def.clone(),
                destroyed_at_column,
                edges,
                cascade,
                callbacks: Vec::new(),
            });
        }

        mark_inverse_counters(&mut types);

        for (entity, hooks) in callbacks {
            let id = by_name
                .get(&entity)
                .ok_or_else(|| DomainError::unknown_entity(entity.as_str()))?;
            types[id.0].callbacks.push(hooks);
        }

        Ok(Registry { types, by_name })
    }
}

/// Foreign key and type columns are readable without being declared as
/// attributes: `belongs_to` adds them to the owner, `has_one`/`has_many` to
/// the target.
fn add_foreign_key_columns(
    defs: &mut [EntityDef],
    by_name: &HashMap<String, EntityTypeId>,
) -> DomainResult<()> {
    let mut extra: Vec<(usize, String, ColumnKind)> = Vec::new();
    // Polymorphic ids default to integers unless an owner declared its key kind.
    let mut fallback: Vec<(usize, String, ColumnKind)> = Vec::new();

    for (index, def) in defs.iter().enumerate() {
        for assoc in &def.associations {
            let unknown = |name: &str| {
                DomainError::schema(format!(
                    "{}.{} targets unknown entity {}",
                    def.name, assoc.name, name
                ))
            };
            match &assoc.kind {
                AssociationKind::BelongsTo {
                    target: Target::Entity(name),
                    foreign_key,
                } => {
                    let id = by_name.get(name).ok_or_else(|| unknown(name))?;
                    extra.push((index, foreign_key.clone(), defs[id.0].key_kind.into()));
                }
                AssociationKind::BelongsTo {
                    target: Target::Polymorphic { type_column },
                    foreign_key,
                } => {
                    fallback.push((index, foreign_key.clone(), ColumnKind::Integer));
                    extra.push((index, type_column.clone(), ColumnKind::Text));
                }
                AssociationKind::HasOne {
                    target,
                    foreign_key,
                    as_type,
                }
                | AssociationKind::HasMany {
                    target,
                    foreign_key,
                    as_type,
                } => {
                    let id = by_name.get(target).ok_or_else(|| unknown(target))?;
                    extra.push((id.0, foreign_key.clone(), def.key_kind.into()));
                    if let Some(type_column) = as_type {
                        extra.push((id.0, type_column.clone(), ColumnKind::Text));
                    }
                }
                AssociationKind::HasManyThrough { .. } => {}
            }
        }
    }

    for (index, name, kind) in extra.into_iter().chain(fallback) {
        let def = &mut defs[index];
        if !def.has_column(&name) {
            def.columns.push(Column { name, kind });
        }
    }
    Ok(())
}

fn resolve_edge(
    owner: &EntityDef,
    assoc: &Association,
    defs: &[EntityDef],
    by_name: &HashMap<String, EntityTypeId>,
) -> DomainResult<Edge> {
    let target_id = |name: &str| {
        by_name.get(name).copied().ok_or_else(|| {
            DomainError::schema(format!(
                "{}.{} targets unknown entity {}",
                owner.name, assoc.name, name
            ))
        })
    };

    let resolved = match &assoc.kind {
        AssociationKind::BelongsTo { target, foreign_key } => Resolved::BelongsTo {
            target: match target {
                Target::Entity(name) => BelongsToTarget::Fixed(target_id(name)?),
                Target::Polymorphic { type_column } => BelongsToTarget::Polymorphic {
                    type_column: type_column.clone(),
                },
            },
            foreign_key: foreign_key.clone(),
        },
        AssociationKind::HasOne {
            target,
            foreign_key,
            as_type,
        }
        | AssociationKind::HasMany {
            target,
            foreign_key,
            as_type,
        } => Resolved::Owned {
            target: target_id(target)?,
            foreign_key: foreign_key.clone(),
            as_type: as_type.clone(),
            single: matches!(assoc.kind, AssociationKind::HasOne { .. }),
        },
        AssociationKind::HasManyThrough { through, source } => {
            let through_index = owner
                .associations
                .iter()
                .position(|a| &a.name == through)
                .ok_or_else(|| DomainError::unknown_association(&owner.name, through))?;
            let intermediate = match &owner.associations[through_index].kind {
                AssociationKind::HasOne { target, .. } | AssociationKind::HasMany { target, .. } => {
                    target_id(target)?
                }
                _ => {
                    return Err(DomainError::schema(format!(
                        "{}.{} must go through a has_one or has_many association",
                        owner.name, assoc.name
                    )))
                }
            };
            let source_index = defs[intermediate.0]
                .associations
                .iter()
                .position(|a| &a.name == source)
                .ok_or_else(|| {
                    DomainError::unknown_association(&defs[intermediate.0].name, source)
                })?;
            if defs[intermediate.0].associations[source_index].is_through() {
                return Err(DomainError::schema(format!(
                    "{}.{}: source {} cannot itself be a through association",
                    owner.name, assoc.name, source
                )));
            }
            Resolved::Through {
                through: through_index,
                intermediate,
                source: source_index,
            }
        }
    };

    if assoc.counter_cache.is_some()
        && !matches!(
            assoc.kind,
            AssociationKind::BelongsTo { .. } | AssociationKind::HasMany { .. }
        )
    {
        return Err(DomainError::schema(format!(
            "{}.{}: counter_cache is only supported on belongs_to and has_many",
            owner.name, assoc.name
        )));
    }

    let owner_counter = match assoc.kind {
        AssociationKind::HasMany { .. } => assoc.counter_cache.clone(),
        _ => None,
    };

    Ok(Edge {
        def: assoc.clone(),
        resolved,
        owner_counter,
    })
}

/// Cascade-flagged edges in declaration order. A through edge cascades via its
/// intermediate edge, unless that edge cascades on its own.
fn cascade_plan(edges: &[Edge]) -> Vec<CascadeStep> {
    let mut plan: Vec<CascadeStep> = Vec::new();
    for (index, edge) in edges.iter().enumerate() {
        if !edge.def.dependent {
            continue;
        }
        let via = match edge.resolved {
            Resolved::Through { through, .. } => {
                if edges[through].def.dependent {
                    continue;
                }
                through
            }
            _ => index,
        };
        if plan.iter().any(|step| step.via == via) {
            continue;
        }
        plan.push(CascadeStep { edge: index, via });
    }
    plan
}

/// Drop owner-side counters of `has_many` edges whose target declares the
/// inverse `belongs_to` with the same counter column.
fn mark_inverse_counters(types: &mut [EntityType]) {
    let mut maintained = Vec::new();
    for owner in types.iter() {
        for (index, edge) in owner.edges.iter().enumerate() {
            let (Some(counter), Resolved::Owned {
                target,
                foreign_key,
                ..
            }) = (&edge.owner_counter, &edge.resolved)
            else {
                continue;
            };
            let inverse = types[target.0].edges.iter().any(|candidate| {
                matches!(
                    &candidate.resolved,
                    Resolved::BelongsTo {
                        target: BelongsToTarget::Fixed(t),
                        foreign_key: fk,
                    } if *t == owner.id && fk == foreign_key
                ) && candidate.def.counter_cache.as_ref() == Some(counter)
            });
            if inverse {
                maintained.push((owner.id, index));
            }
        }
    }
    for (owner, index) in maintained {
        types[owner.0].edges[index].owner_counter = None;
    }
}
