use common::{AppError, AppResult};
use domain::{Checkpoint, Record, Timestamp};
use futures::future::BoxFuture;
use sea_orm::{ConnectionTrait, DatabaseTransaction, TransactionTrait};
use tracing::{debug, info, warn};

use super::{finish, Engine};
use crate::callbacks::{self, Event, Operation};
use crate::infra::store;
use crate::registry::{EntityType, Resolved};
use crate::traversal::{self, Cascade, Filter};

impl Engine {
    /// Destroy `record` and its dependents in a new transaction.
    ///
    /// The timestamp is the one staged by [`Record::mark_for_destruction`],
    /// or the current time.
    pub async fn destroy<C: TransactionTrait>(&self, db: &C, record: &mut Record) -> AppResult<()> {
        let at = record
            .marked_for_destruction_at()
            .unwrap_or_else(|| self.clock.now());
        self.destroy_at(db, record, at).await
    }

    /// Destroy with an explicit timestamp.
    pub async fn destroy_at<C: TransactionTrait>(
        &self,
        db: &C,
        record: &mut Record,
        at: Timestamp,
    ) -> AppResult<()> {
        let txn = db.begin().await?;
        let result = self.destroy_in(&txn, record, at).await;
        finish(txn, result).await
    }

    /// Destroy inside a transaction owned by the caller.
    ///
    /// On error the in-memory state of `record` is put back; rolling back the
    /// transaction is up to the caller.
    pub async fn destroy_in(
        &self,
        txn: &DatabaseTransaction,
        record: &mut Record,
        at: Timestamp,
    ) -> AppResult<()> {
        let at = self.truncate(at);
        let checkpoint = record.checkpoint();
        let mut cascade = Cascade::default();

        match self.destroy_record(txn, record, at, &mut cascade).await {
            Ok(_) => {
                info!(
                    entity = self.entity_of(record)?.name(),
                    id = %record.id,
                    %at,
                    records = cascade.len(),
                    "Destroyed"
                );
                Ok(())
            }
            Err(e) => {
                record.rollback_to(checkpoint);
                Err(e)
            }
        }
    }

    /// Destroy every cached association record of `owner` that was marked
    /// for destruction, each at its own staged time, in one transaction.
    pub async fn autosave<C: TransactionTrait>(&self, db: &C, owner: &mut Record) -> AppResult<usize> {
        let txn = db.begin().await?;
        let mut touched = Vec::new();
        let result = self.destroy_marked(&txn, owner, &mut touched).await;

        if result.is_err() {
            for (association, index, checkpoint) in touched {
                if let Some(record) = owner
                    .cached_mut(&association)
                    .and_then(|records| records.get_mut(index))
                {
                    record.rollback_to(checkpoint);
                }
            }
        }
        finish(txn, result).await
    }

    async fn destroy_marked(
        &self,
        txn: &DatabaseTransaction,
        owner: &mut Record,
        touched: &mut Vec<(String, usize, Checkpoint)>,
    ) -> AppResult<usize> {
        let associations: Vec<String> = owner.cached_associations().map(str::to_owned).collect();
        for association in associations {
            let Some(records) = owner.cached_mut(&association) else {
                continue;
            };
            for (index, record) in records.iter_mut().enumerate() {
                let Some(at) = record.marked_for_destruction_at() else {
                    continue;
                };
                if record.is_destroyed() {
                    continue;
                }
                touched.push((association.clone(), index, record.checkpoint()));
                self.destroy_in(txn, record, at).await?;
            }
        }
        Ok(touched.len())
    }

    /// Run the destroy pipeline for one record. Returns false when the record
    /// was already visited by this unit of work.
    pub(super) fn destroy_record<'a>(
        &'a self,
        txn: &'a DatabaseTransaction,
        record: &'a mut Record,
        at: Timestamp,
        cascade: &'a mut Cascade,
    ) -> BoxFuture<'a, AppResult<bool>> {
        Box::pin(async move {
            if !cascade.enter(record.key()) {
                return Ok(false);
            }
            let ty = self.entity_of(record)?;

            let operation: Operation<'a> =
                Box::new(move |record: &'a mut Record| -> BoxFuture<'a, AppResult<&'a mut Record>> {
                    Box::pin(async move {
                        self.destroy_row(txn, ty, record, at, cascade).await?;
                        Ok(record)
                    })
                });
            callbacks::dispatch(Event::Destroy, ty.name(), ty.callbacks(), txn, record, operation)
                .await?;
            Ok(true)
        })
    }

    async fn destroy_row(
        &self,
        txn: &DatabaseTransaction,
        ty: &EntityType,
        record: &mut Record,
        at: Timestamp,
        cascade: &mut Cascade,
    ) -> AppResult<()> {
        for step in ty.cascade_steps() {
            let via = ty.edge(step.via);
            let Some(targets) =
                traversal::load_targets(&self.registry, txn, ty, record, step.via, Filter::Active)
                    .await?
            else {
                continue;
            };

            let mut destroyed = 0;
            for mut target in targets.records {
                debug!(
                    entity = targets.ty.name(),
                    id = %target.id,
                    via = %format!("{}.{}", ty.name(), via.name()),
                    "Cascading destroy"
                );
                if self.destroy_record(txn, &mut target, at, cascade).await? {
                    destroyed += 1;
                }
            }

            if let (Some(counter), true) = (&via.owner_counter, destroyed > 0) {
                store::adjust_counter(txn, ty, record.id, counter, -destroyed).await?;
            }
            for association in ty.dependent_caches(step.via) {
                record.invalidate(association);
            }
        }

        let affected = match ty.destroyed_at_column() {
            Some(column) => store::mark_destroyed(txn, ty, record.id, column, at).await?,
            None => store::delete_row(txn, ty, record.id).await?,
        };
        if affected != 1 {
            return Err(AppError::concurrent(ty.name(), record.id));
        }

        self.adjust_belongs_to_counters(txn, ty, record, -1).await?;

        record.destroyed_at = ty.destroyed_at_column().map(|_| at);
        record.clear_destruction_mark();
        Ok(())
    }

    /// Keep `belongs_to` counter caches in step with `record` leaving or
    /// rejoining the visible set.
    pub(super) async fn adjust_belongs_to_counters<C: ConnectionTrait>(
        &self,
        conn: &C,
        ty: &EntityType,
        record: &Record,
        delta: i64,
    ) -> AppResult<()> {
        for edge in ty.edges() {
            let (Some(counter), Resolved::BelongsTo {
                target,
                foreign_key,
            }) = (&edge.def.counter_cache, &edge.resolved)
            else {
                continue;
            };
            let owner = traversal::belongs_to_target(
                &self.registry,
                ty,
                record,
                target,
                foreign_key,
                edge.name(),
            );
            match owner {
                Ok(Some((owner_ty, owner_id))) => {
                    store::adjust_counter(conn, owner_ty, owner_id, counter, delta).await?;
                }
                Ok(None) => {}
                Err(err @ AppError::UnresolvableAssociation { .. }) => {
                    warn!(entity = ty.name(), id = %record.id, "Skipping counter cache: {}", err);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
