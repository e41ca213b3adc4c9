//! Soft-delete engine.
//!
//! [`Engine`] is the entry point for every record operation. Top-level
//! `destroy`/`restore` calls open one transaction for the whole cascade; the
//! `*_in` variants join a transaction the caller already holds.

mod destroy;
mod restore;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{AppError, AppResult, EngineConfig, OptionExt};
use domain::{AttrValue, DomainError, Record, RecordId, Timestamp};
use sea_orm::{ConnectionTrait, DatabaseTransaction, TransactionTrait};
use tracing::debug;

use crate::clock::{self, Clock, SystemClock};
use crate::infra::store;
use crate::registry::{EntityType, Registry};
use crate::scope::Scope;
use crate::traversal::{self, Filter};

/// Soft-delete and restore engine over a frozen [`Registry`].
#[derive(Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(registry: Registry, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current time at the configured precision.
    pub fn now(&self) -> Timestamp {
        self.truncate(self.clock.now())
    }

    fn truncate(&self, at: Timestamp) -> Timestamp {
        clock::truncate(at, self.config.timestamp_precision)
    }

    pub fn entity(&self, name: &str) -> AppResult<&EntityType> {
        Ok(self.registry.lookup(name)?)
    }

    fn entity_of(&self, record: &Record) -> AppResult<&EntityType> {
        Ok(self.registry.entity(record.entity)?)
    }

    /// Visible rows of `entity`.
    pub fn query(&self, entity: &str) -> AppResult<Scope<'_>> {
        Ok(Scope::new(self.entity(entity)?))
    }

    /// Visible record by id.
    pub async fn find<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity: &str,
        id: RecordId,
    ) -> AppResult<Record> {
        self.query(entity)?.id(id).one(conn).await?.ok_or_not_found()
    }

    /// Record by id, destroyed or not.
    pub async fn find_with_destroyed<C: ConnectionTrait>(
        &self,
        conn: &C,
        entity: &str,
        id: RecordId,
    ) -> AppResult<Record> {
        self.query(entity)?
            .unscoped()
            .id(id)
            .one(conn)
            .await?
            .ok_or_not_found()
    }

    /// Insert a record and bump the `belongs_to` counter caches it joins, in
    /// one transaction. A destruction timestamp among the attributes is
    /// written as well; such a record is never persisted.
    pub async fn create<C: TransactionTrait>(
        &self,
        db: &C,
        entity: &str,
        mut attributes: BTreeMap<String, AttrValue>,
    ) -> AppResult<Record> {
        let ty = self.entity(entity)?;
        let destroyed_at = match ty.destroyed_at_column().and_then(|c| attributes.remove(c)) {
            None | Some(AttrValue::Null) => None,
            Some(AttrValue::Timestamp(at)) => Some(at),
            Some(AttrValue::Text(raw)) if store::parse_timestamp(&raw).is_some() => {
                store::parse_timestamp(&raw)
            }
            Some(other) => {
                return Err(AppError::validation(format!(
                    "{} must be a timestamp, got {:?}",
                    ty.destroyed_at_column().unwrap_or_default(),
                    other
                )))
            }
        }
        .map(|at| self.truncate(at));

        let txn = db.begin().await?;
        let result = async {
            let record = store::insert(&txn, ty, &attributes, destroyed_at).await?;
            if !record.is_destroyed() {
                self.adjust_belongs_to_counters(&txn, ty, &record, 1).await?;
            }
            Ok::<_, AppError>(record)
        }
        .await;
        let record = finish(txn, result).await?;
        debug!(entity, id = %record.id, "Created record");
        Ok(record)
    }

    /// Fresh copy of `record` from storage, regardless of visibility.
    pub async fn reload<C: ConnectionTrait>(&self, conn: &C, record: &Record) -> AppResult<Record> {
        let ty = self.entity_of(record)?;
        Scope::new(ty)
            .unscoped()
            .id(record.id)
            .one(conn)
            .await?
            .ok_or_not_found()
    }

    /// Visible targets of an association, loaded once and cached on `owner`.
    pub async fn associated<'o, C: ConnectionTrait>(
        &self,
        conn: &C,
        owner: &'o mut Record,
        association: &str,
    ) -> AppResult<&'o mut Vec<Record>> {
        if owner.cached(association).is_none() {
            let ty = self.entity_of(owner)?;
            let index = ty
                .edge_index(association)
                .ok_or_else(|| DomainError::unknown_association(ty.name(), association))?;
            let records = traversal::load_targets(&self.registry, conn, ty, owner, index, Filter::Active)
                .await?
                .map(|targets| targets.records)
                .unwrap_or_default();
            owner.cache(association, records);
        }
        owner
            .cached_mut(association)
            .ok_or_else(|| AppError::internal(format!("association {} was not cached", association)))
    }

    /// Remove the row without callbacks or cascading.
    pub async fn delete<C: ConnectionTrait>(&self, conn: &C, record: &mut Record) -> AppResult<()> {
        let ty = self.entity_of(record)?;
        let affected = store::delete_row(conn, ty, record.id).await?;
        if affected == 0 {
            return Err(AppError::NotFound);
        }
        record.clear_destruction_mark();
        debug!(entity = ty.name(), id = %record.id, "Deleted record");
        Ok(())
    }
}

/// Commit on success, roll back on error.
async fn finish<T>(txn: DatabaseTransaction, result: AppResult<T>) -> AppResult<T> {
    match result {
        Ok(value) => {
            txn.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback().await {
                tracing::error!("Transaction rollback failed: {}", rollback_err);
            }
            Err(e)
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("entities", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}
