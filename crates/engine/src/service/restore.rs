use common::{AppError, AppResult};
use domain::Record;
use futures::future::BoxFuture;
use sea_orm::{DatabaseTransaction, TransactionTrait};
use tracing::{debug, info};

use super::{finish, Engine};
use crate::callbacks::{self, Event, Operation};
use crate::infra::store;
use crate::registry::EntityType;
use crate::traversal::{self, Cascade, Filter};

impl Engine {
    /// Restore `record` and every dependent destroyed by the same cascade,
    /// in a new transaction.
    pub async fn restore<C: TransactionTrait>(&self, db: &C, record: &mut Record) -> AppResult<()> {
        let txn = db.begin().await?;
        let result = self.restore_in(&txn, record).await;
        finish(txn, result).await
    }

    /// Alias of [`Engine::restore`].
    pub async fn undestroy<C: TransactionTrait>(&self, db: &C, record: &mut Record) -> AppResult<()> {
        self.restore(db, record).await
    }

    /// Restore inside a transaction owned by the caller.
    pub async fn restore_in(&self, txn: &DatabaseTransaction, record: &mut Record) -> AppResult<()> {
        let checkpoint = record.checkpoint();
        let mut cascade = Cascade::default();

        match self.restore_record(txn, record, &mut cascade).await {
            Ok(_) => {
                info!(
                    entity = self.entity_of(record)?.name(),
                    id = %record.id,
                    records = cascade.len(),
                    "Restored"
                );
                Ok(())
            }
            Err(e) => {
                record.rollback_to(checkpoint);
                Err(e)
            }
        }
    }

    fn restore_record<'a>(
        &'a self,
        txn: &'a DatabaseTransaction,
        record: &'a mut Record,
        cascade: &'a mut Cascade,
    ) -> BoxFuture<'a, AppResult<bool>> {
        Box::pin(async move {
            if !cascade.enter(record.key()) {
                return Ok(false);
            }
            let ty = self.entity_of(record)?;
            let Some(column) = ty.destroyed_at_column() else {
                return Err(AppError::validation(format!("{} cannot be restored", ty.name())));
            };

            let operation: Operation<'a> =
                Box::new(move |record: &'a mut Record| -> BoxFuture<'a, AppResult<&'a mut Record>> {
                    Box::pin(async move {
                        self.restore_row(txn, ty, column, record, cascade).await?;
                        Ok(record)
                    })
                });
            callbacks::dispatch(Event::Restore, ty.name(), ty.callbacks(), txn, record, operation)
                .await?;
            Ok(true)
        })
    }

    async fn restore_row(
        &self,
        txn: &DatabaseTransaction,
        ty: &EntityType,
        column: &str,
        record: &mut Record,
        cascade: &mut Cascade,
    ) -> AppResult<()> {
        // The stored value is the correlation token; the in-memory one may
        // carry more precision than the store kept.
        let Some(Some(previous)) = store::stored_destroyed_at(txn, ty, record.id, column).await?
        else {
            return Err(AppError::concurrent(ty.name(), record.id));
        };

        if store::clear_destroyed(txn, ty, record.id, column).await? != 1 {
            return Err(AppError::concurrent(ty.name(), record.id));
        }
        self.adjust_belongs_to_counters(txn, ty, record, 1).await?;
        record.destroyed_at = None;
        record.clear_destruction_mark();

        for step in ty.cascade_steps() {
            let via = ty.edge(step.via);
            let Some(targets) = traversal::load_targets(
                &self.registry,
                txn,
                ty,
                record,
                step.via,
                Filter::DestroyedAt(previous),
            )
            .await?
            else {
                continue;
            };

            let mut restored = 0;
            for mut target in targets.records {
                debug!(
                    entity = targets.ty.name(),
                    id = %target.id,
                    via = %format!("{}.{}", ty.name(), via.name()),
                    "Cascading restore"
                );
                if self.restore_record(txn, &mut target, cascade).await? {
                    restored += 1;
                }
            }

            if let (Some(counter), true) = (&via.owner_counter, restored > 0) {
                store::adjust_counter(txn, ty, record.id, counter, restored).await?;
            }
            for association in ty.dependent_caches(step.via) {
                record.invalidate(association);
            }
        }
        Ok(())
    }
}
