//! Destroy/restore hook pipeline.
//!
//! Hooks are registered per entity type and run in registration order.
//! Around hooks nest: the first registered hook is outermost and its
//! continuation ([`Next::run`]) covers every remaining around hook, all
//! before hooks, the operation itself and all after hooks.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, AppResult};
use domain::Record;
use futures::future::BoxFuture;
use sea_orm::DatabaseTransaction;

/// Lifecycle event a hook is invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Destroy,
    Restore,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Destroy => f.write_str("destroy"),
            Event::Restore => f.write_str("restore"),
        }
    }
}

/// Verdict of a before hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Abort the operation and roll back the unit of work
    Halt,
}

/// Hooks for one entity type. Every method defaults to a no-op.
///
/// Hooks receive the open transaction so their side effects commit or roll
/// back together with the cascade.
#[async_trait]
pub trait Callbacks: Send + Sync {
    async fn before_destroy(&self, txn: &DatabaseTransaction, record: &mut Record) -> AppResult<Flow> {
        let _ = (txn, record);
        Ok(Flow::Continue)
    }

    async fn around_destroy(&self, next: Next<'_>) -> AppResult<()> {
        next.run().await
    }

    async fn after_destroy(&self, txn: &DatabaseTransaction, record: &Record) -> AppResult<()> {
        let _ = (txn, record);
        Ok(())
    }

    async fn before_restore(&self, txn: &DatabaseTransaction, record: &mut Record) -> AppResult<Flow> {
        let _ = (txn, record);
        Ok(Flow::Continue)
    }

    async fn around_restore(&self, next: Next<'_>) -> AppResult<()> {
        next.run().await
    }

    async fn after_restore(&self, txn: &DatabaseTransaction, record: &Record) -> AppResult<()> {
        let _ = (txn, record);
        Ok(())
    }
}

/// Core operation wrapped by the pipeline. Hands the record back so after
/// hooks observe its final state.
pub type Operation<'a> =
    Box<dyn FnOnce(&'a mut Record) -> BoxFuture<'a, AppResult<&'a mut Record>> + Send + 'a>;

/// Continuation passed to around hooks.
pub struct Next<'a> {
    event: Event,
    entity: &'a str,
    hooks: &'a [Arc<dyn Callbacks>],
    /// Around hooks not yet entered
    remaining: &'a [Arc<dyn Callbacks>],
    txn: &'a DatabaseTransaction,
    record: &'a mut Record,
    operation: Operation<'a>,
}

impl<'a> Next<'a> {
    pub fn event(&self) -> Event {
        self.event
    }

    pub fn record(&self) -> &Record {
        self.record
    }

    pub fn transaction(&self) -> &DatabaseTransaction {
        self.txn
    }

    /// Run the rest of the pipeline. Not calling it skips the operation and
    /// its before and after hooks, and the operation fails as aborted.
    pub fn run(self) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            let remaining: &'a [Arc<dyn Callbacks>] = self.remaining;
            if let Some((outer, rest)) = remaining.split_first() {
                let next = Next {
                    remaining: rest,
                    ..self
                };
                return match next.event {
                    Event::Destroy => outer.around_destroy(next).await,
                    Event::Restore => outer.around_restore(next).await,
                };
            }

            let Next {
                event,
                entity,
                hooks,
                txn,
                record,
                operation,
                ..
            } = self;

            for hook in hooks {
                let flow = match event {
                    Event::Destroy => hook.before_destroy(txn, record).await?,
                    Event::Restore => hook.before_restore(txn, record).await?,
                };
                if flow == Flow::Halt {
                    tracing::info!(entity, id = %record.id, %event, "Halted by before hook");
                    return Err(AppError::aborted(entity, event.to_string()));
                }
            }

            let record = operation(record).await?;

            for hook in hooks {
                match event {
                    Event::Destroy => hook.after_destroy(txn, record).await?,
                    Event::Restore => hook.after_restore(txn, record).await?,
                }
            }
            Ok(())
        })
    }
}

/// Run `operation` on `record` wrapped in the hooks registered for its type.
///
/// An around hook that returns without continuing aborts the operation just
/// like a halting before hook.
pub fn dispatch<'a>(
    event: Event,
    entity: &'a str,
    hooks: &'a [Arc<dyn Callbacks>],
    txn: &'a DatabaseTransaction,
    record: &'a mut Record,
    operation: Operation<'a>,
) -> BoxFuture<'a, AppResult<()>> {
    let ran = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&ran);
    let operation: Operation<'a> = Box::new(
        move |record: &'a mut Record| -> BoxFuture<'a, AppResult<&'a mut Record>> {
            flag.store(true, Ordering::SeqCst);
            operation(record)
        },
    );

    Box::pin(async move {
        let id = record.id;
        Next {
            event,
            entity,
            hooks,
            remaining: hooks,
            txn,
            record,
            operation,
        }
        .run()
        .await?;

        if !ran.load(Ordering::SeqCst) {
            tracing::info!(entity, %id, %event, "Skipped by around hook");
            return Err(AppError::aborted(entity, event.to_string()));
        }
        Ok(())
    })
}
