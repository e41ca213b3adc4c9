//! Target resolution for association edges.

use std::collections::HashSet;

use domain::{Record, RecordId, RecordKey, Timestamp};
use sea_orm::ConnectionTrait;
use tracing::warn;

use common::{AppError, AppResult};

use crate::registry::{BelongsToTarget, EntityType, Registry, Resolved};
use crate::scope::{Scope, Visibility};

/// Which targets a cascade step picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Filter {
    /// Live targets, for destroy
    Active,
    /// Targets destroyed at exactly this time, for restore
    DestroyedAt(Timestamp),
}

impl From<Filter> for Visibility {
    fn from(filter: Filter) -> Self {
        match filter {
            Filter::Active => Visibility::Active,
            Filter::DestroyedAt(at) => Visibility::Destroyed(Some(at)),
        }
    }
}

pub(crate) struct Targets<'r> {
    pub ty: &'r EntityType,
    pub records: Vec<Record>,
}

/// Records visited by one unit of work. Re-entering a record is a no-op, so
/// cyclic dependent graphs terminate.
#[derive(Debug, Default)]
pub(crate) struct Cascade {
    visited: HashSet<RecordKey>,
}

impl Cascade {
    /// Returns false when the record was already visited.
    pub fn enter(&mut self, key: RecordKey) -> bool {
        self.visited.insert(key)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }
}

/// Target type and id a `belongs_to` edge points at. `Ok(None)` when the
/// foreign key is null; an error when a polymorphic type cannot be resolved.
pub(crate) fn belongs_to_target<'r>(
    registry: &'r Registry,
    owner_ty: &EntityType,
    owner: &Record,
    target: &BelongsToTarget,
    foreign_key: &str,
    association: &str,
) -> AppResult<Option<(&'r EntityType, RecordId)>> {
    let Some(id) = owner.get(foreign_key).and_then(|v| v.as_record_id()) else {
        return Ok(None);
    };
    let ty = match target {
        BelongsToTarget::Fixed(target_id) => registry.entity(*target_id)?,
        BelongsToTarget::Polymorphic { type_column } => {
            let Some(name) = owner.get(type_column).and_then(|v| v.as_str()) else {
                return Ok(None);
            };
            registry.lookup(name).map_err(|_| {
                AppError::unresolvable(
                    owner_ty.name(),
                    association,
                    format!("unknown type {}", name),
                )
            })?
        }
    };
    if id.kind() != ty.key_kind() {
        return Err(AppError::unresolvable(
            owner_ty.name(),
            association,
            format!("{} key does not match {}", id, ty.name()),
        ));
    }
    Ok(Some((ty, id)))
}

/// Load the targets of one edge of `owner`.
///
/// Unresolvable targets are logged and skipped (`Ok(None)`), leaving sibling
/// edges untouched.
pub(crate) async fn load_targets<'r, C: ConnectionTrait>(
    registry: &'r Registry,
    conn: &C,
    owner_ty: &EntityType,
    owner: &Record,
    edge_index: usize,
    filter: Filter,
) -> AppResult<Option<Targets<'r>>> {
    if owner_ty.edge(edge_index).def.is_through() {
        load_through(registry, conn, owner_ty, owner, edge_index, filter).await
    } else {
        load_direct(registry, conn, owner_ty, owner, edge_index, filter).await
    }
}

async fn load_direct<'r, C: ConnectionTrait>(
    registry: &'r Registry,
    conn: &C,
    owner_ty: &EntityType,
    owner: &Record,
    edge_index: usize,
    filter: Filter,
) -> AppResult<Option<Targets<'r>>> {
    let edge = owner_ty.edge(edge_index);
    match &edge.resolved {
        Resolved::BelongsTo {
            target,
            foreign_key,
        } => {
            let resolved =
                belongs_to_target(registry, owner_ty, owner, target, foreign_key, edge.name());
            let (ty, id) = match resolved {
                Ok(Some(found)) => found,
                Ok(None) => return Ok(None),
                Err(err @ AppError::UnresolvableAssociation { .. }) => {
                    warn!(entity = owner_ty.name(), id = %owner.id, "Skipping association: {}", err);
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };
            let records = Scope::new(ty)
                .with_visibility(filter.into())
                .id(id)
                .all(conn)
                .await?;
            Ok(Some(Targets { ty, records }))
        }
        Resolved::Owned {
            target,
            foreign_key,
            as_type,
            single,
        } => {
            let ty = registry.entity(*target)?;
            let mut scope = Scope::new(ty)
                .with_visibility(filter.into())
                .filter_eq(foreign_key, owner.id)?
                .order_by_id();
            if let Some(type_column) = as_type {
                scope = scope.filter_eq(type_column, owner_ty.name())?;
            }
            if *single {
                scope = scope.limit(1);
            }
            let records = scope.all(conn).await?;
            Ok(Some(Targets { ty, records }))
        }
        Resolved::Through { .. } => Err(AppError::internal(format!(
            "{}.{} is a through association",
            owner_ty.name(),
            edge.name()
        ))),
    }
}

/// Follow the intermediate edge, then the source edge on each intermediate
/// record. Intermediate records are always the visible ones.
async fn load_through<'r, C: ConnectionTrait>(
    registry: &'r Registry,
    conn: &C,
    owner_ty: &EntityType,
    owner: &Record,
    edge_index: usize,
    filter: Filter,
) -> AppResult<Option<Targets<'r>>> {
    let Resolved::Through {
        through,
        intermediate,
        source,
    } = owner_ty.edge(edge_index).resolved
    else {
        return Err(AppError::internal(format!(
            "{}.{} is not a through association",
            owner_ty.name(),
            owner_ty.edge(edge_index).name()
        )));
    };

    let Some(joins) = load_direct(registry, conn, owner_ty, owner, through, Filter::Active).await?
    else {
        return Ok(None);
    };
    let intermediate_ty = registry.entity(intermediate)?;

    let mut target_ty = None;
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for join in &joins.records {
        let Some(found) = load_direct(registry, conn, intermediate_ty, join, source, filter).await?
        else {
            continue;
        };
        target_ty.get_or_insert(found.ty);
        records.extend(found.records.into_iter().filter(|r| seen.insert(r.key())));
    }

    Ok(target_ty.map(|ty| Targets { ty, records }))
}
