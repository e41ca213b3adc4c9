//! Visibility-filtered query builder.
//!
//! Every [`Scope`] composes the default visibility filter into its statement:
//! destroyed rows of soft-deletable types are excluded unless the scope is
//! explicitly widened with [`Scope::unscoped`] or narrowed to the destroyed
//! set with [`Scope::destroyed`].

use domain::{AttrValue, ColumnKind, Record, RecordId, Timestamp};
use sea_orm::sea_query::{Alias, Expr, Order, SelectStatement, SimpleExpr};
use sea_orm::ConnectionTrait;

use common::{AppError, AppResult};

use crate::registry::EntityType;
use crate::infra::store;

/// Which rows a scope can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    /// Rows without a destruction timestamp
    #[default]
    Active,
    /// Every row
    All,
    /// Destroyed rows, optionally only those destroyed at exactly this time
    Destroyed(Option<Timestamp>),
}

#[derive(Debug, Clone)]
pub struct Scope<'r> {
    ty: &'r EntityType,
    visibility: Visibility,
    conditions: Vec<SimpleExpr>,
    ordered: bool,
    limit: Option<u64>,
}

impl<'r> Scope<'r> {
    pub fn new(ty: &'r EntityType) -> Self {
        Self {
            ty,
            visibility: Visibility::Active,
            conditions: Vec::new(),
            ordered: false,
            limit: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Include destroyed rows.
    pub fn unscoped(self) -> Self {
        self.with_visibility(Visibility::All)
    }

    /// Only destroyed rows; with `at`, only rows destroyed at exactly `at`.
    /// Always empty for types that are not soft-deletable.
    pub fn destroyed(self, at: Option<Timestamp>) -> Self {
        self.with_visibility(Visibility::Destroyed(at))
    }

    /// `column = value`, or `column IS NULL` for a null value.
    pub fn filter_eq(mut self, column: &str, value: impl Into<AttrValue>) -> AppResult<Self> {
        let value = value.into();
        let kind = if column == self.ty.primary_key() {
            ColumnKind::from(self.ty.key_kind())
        } else {
            self.ty
                .column(column)
                .map(|c| c.kind)
                .ok_or_else(|| {
                    AppError::validation(format!("{} has no column {}", self.ty.name(), column))
                })?
        };

        let col = Expr::col(Alias::new(column));
        self.conditions.push(if value.is_null() {
            col.is_null()
        } else {
            col.eq(store::bind(&value, kind, column)?)
        });
        Ok(self)
    }

    pub fn id(mut self, id: RecordId) -> Self {
        self.conditions.push(store::pk_eq(self.ty, id));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by_id(mut self) -> Self {
        self.ordered = true;
        self
    }

    fn visibility_condition(&self) -> Option<SimpleExpr> {
        let Some(column) = self.ty.destroyed_at_column() else {
            return match self.visibility {
                Visibility::Destroyed(_) => Some(Expr::val(1).eq(0)),
                _ => None,
            };
        };
        let col = Expr::col(Alias::new(column));
        match self.visibility {
            Visibility::Active => Some(col.is_null()),
            Visibility::All => None,
            Visibility::Destroyed(None) => Some(col.is_not_null()),
            Visibility::Destroyed(Some(at)) => Some(col.eq(at)),
        }
    }

    /// Statement this scope runs.
    pub fn statement(&self) -> SelectStatement {
        let mut stmt = store::select(self.ty);
        if let Some(condition) = self.visibility_condition() {
            stmt.and_where(condition);
        }
        for condition in &self.conditions {
            stmt.and_where(condition.clone());
        }
        if self.ordered {
            stmt.order_by(Alias::new(self.ty.primary_key()), Order::Asc);
        }
        if let Some(limit) = self.limit {
            stmt.limit(limit);
        }
        stmt
    }

    pub async fn all<C: ConnectionTrait>(&self, conn: &C) -> AppResult<Vec<Record>> {
        store::fetch_all(conn, self.ty, &self.statement()).await
    }

    pub async fn one<C: ConnectionTrait>(&self, conn: &C) -> AppResult<Option<Record>> {
        let mut stmt = self.statement();
        stmt.limit(1);
        store::fetch_one(conn, self.ty, &stmt).await
    }

    pub async fn count<C: ConnectionTrait>(&self, conn: &C) -> AppResult<u64> {
        let mut stmt = self.statement();
        stmt.clear_selects()
            .expr_as(Expr::col(Alias::new(self.ty.primary_key())).count(), Alias::new("count"))
            .clear_order_by()
            .reset_limit();
        let row = conn
            .query_one(conn.get_database_backend().build(&stmt))
            .await?;
        let count = match row {
            Some(row) => row.try_get::<i64>("", "count")?,
            None => 0,
        };
        u64::try_from(count).map_err(|_| AppError::internal(format!("negative row count {}", count)))
    }
}
