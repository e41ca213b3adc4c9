//! Storage contract on top of sea-orm.
//!
//! Every statement is built dynamically with sea-query from the registry's
//! table and column names and executed on whatever connection or transaction
//! the caller holds. Row writes are conditional single-row updates by primary
//! key; callers decide what an affected-row count other than one means.

use std::collections::BTreeMap;

use domain::{AttrValue, ColumnKind, KeyKind, Record, RecordId, Timestamp};
use sea_orm::sea_query::{Alias, Expr, Query, SelectStatement, SimpleExpr};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, QueryResult, Value};
use uuid::Uuid;

use common::{AppError, AppResult};

use crate::registry::EntityType;

/// Value bound for a column of `kind`. The column kind decides the SQL type;
/// `Null` becomes a typed SQL null and text is parsed for uuid and timestamp
/// columns. Values that do not fit the column are rejected.
pub(crate) fn bind(value: &AttrValue, kind: ColumnKind, column: &str) -> AppResult<Value> {
    let mismatch = || {
        AppError::validation(format!(
            "{} expects a {:?} value, got {:?}",
            column, kind, value
        ))
    };
    Ok(match (value, kind) {
        (AttrValue::Null, ColumnKind::Integer) => Option::<i64>::None.into(),
        (AttrValue::Null, ColumnKind::Float) => Option::<f64>::None.into(),
        (AttrValue::Null, ColumnKind::Text) => Option::<String>::None.into(),
        (AttrValue::Null, ColumnKind::Bool) => Option::<bool>::None.into(),
        (AttrValue::Null, ColumnKind::Uuid) => Option::<Uuid>::None.into(),
        (AttrValue::Null, ColumnKind::Timestamp) => Option::<Timestamp>::None.into(),

        (AttrValue::Int(v), ColumnKind::Integer) => (*v).into(),
        (AttrValue::Int(v), ColumnKind::Float) => (*v as f64).into(),
        (AttrValue::Float(v), ColumnKind::Float) => (*v).into(),
        (AttrValue::Bool(v), ColumnKind::Bool) => (*v).into(),

        (AttrValue::Text(v), ColumnKind::Text) => v.clone().into(),
        (AttrValue::Uuid(v), ColumnKind::Text) => v.to_string().into(),
        (AttrValue::Timestamp(v), ColumnKind::Text) => v.to_rfc3339().into(),

        (AttrValue::Uuid(v), ColumnKind::Uuid) => (*v).into(),
        (AttrValue::Text(v), ColumnKind::Uuid) => Uuid::parse_str(v).map_err(|_| mismatch())?.into(),

        (AttrValue::Timestamp(v), ColumnKind::Timestamp) => (*v).into(),
        (AttrValue::Text(v), ColumnKind::Timestamp) => parse_timestamp(v).ok_or_else(mismatch)?.into(),

        _ => return Err(mismatch()),
    })
}

/// RFC 3339 text as a UTC timestamp.
pub(crate) fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

pub(crate) fn id_value(id: RecordId) -> Value {
    match id {
        RecordId::Int(id) => id.into(),
        RecordId::Uuid(id) => id.into(),
    }
}

pub(crate) fn pk_eq(ty: &EntityType, id: RecordId) -> SimpleExpr {
    Expr::col(Alias::new(ty.primary_key())).eq(id_value(id))
}

/// `SELECT` of the primary key, destruction column and attribute columns.
pub(crate) fn select(ty: &EntityType) -> SelectStatement {
    let mut stmt = Query::select();
    stmt.from(Alias::new(ty.table()))
        .column(Alias::new(ty.primary_key()));
    if let Some(column) = ty.destroyed_at_column() {
        stmt.column(Alias::new(column));
    }
    for column in ty.columns() {
        stmt.column(Alias::new(column.name.as_str()));
    }
    stmt
}

fn read_id(ty: &EntityType, row: &QueryResult) -> AppResult<RecordId> {
    Ok(match ty.key_kind() {
        KeyKind::Integer => RecordId::Int(row.try_get::<i64>("", ty.primary_key())?),
        KeyKind::Uuid => RecordId::Uuid(row.try_get::<Uuid>("", ty.primary_key())?),
    })
}

fn read_attr(row: &QueryResult, name: &str, kind: ColumnKind) -> AppResult<AttrValue> {
    Ok(match kind {
        ColumnKind::Integer => row.try_get::<Option<i64>>("", name)?.into(),
        ColumnKind::Float => row.try_get::<Option<f64>>("", name)?.into(),
        ColumnKind::Text => row.try_get::<Option<String>>("", name)?.into(),
        ColumnKind::Bool => row.try_get::<Option<bool>>("", name)?.into(),
        ColumnKind::Uuid => row.try_get::<Option<Uuid>>("", name)?.into(),
        ColumnKind::Timestamp => row.try_get::<Option<Timestamp>>("", name)?.into(),
    })
}

pub(crate) fn record_from_row(ty: &EntityType, row: &QueryResult) -> AppResult<Record> {
    let destroyed_at = match ty.destroyed_at_column() {
        Some(column) => row.try_get::<Option<Timestamp>>("", column)?,
        None => None,
    };
    let mut record = Record::new(ty.id(), read_id(ty, row)?).with_destroyed_at(destroyed_at);
    for column in ty.columns() {
        record.set(column.name.as_str(), read_attr(row, &column.name, column.kind)?);
    }
    Ok(record)
}

pub(crate) async fn fetch_all<C: ConnectionTrait>(
    conn: &C,
    ty: &EntityType,
    stmt: &SelectStatement,
) -> AppResult<Vec<Record>> {
    let rows = conn
        .query_all(conn.get_database_backend().build(stmt))
        .await?;
    rows.iter().map(|row| record_from_row(ty, row)).collect()
}

pub(crate) async fn fetch_one<C: ConnectionTrait>(
    conn: &C,
    ty: &EntityType,
    stmt: &SelectStatement,
) -> AppResult<Option<Record>> {
    let row = conn
        .query_one(conn.get_database_backend().build(stmt))
        .await?;
    row.map(|row| record_from_row(ty, &row)).transpose()
}

/// Destruction timestamp as currently stored. `None` when the row is gone.
pub(crate) async fn stored_destroyed_at<C: ConnectionTrait>(
    conn: &C,
    ty: &EntityType,
    id: RecordId,
    column: &str,
) -> AppResult<Option<Option<Timestamp>>> {
    let stmt = Query::select()
        .column(Alias::new(column))
        .from(Alias::new(ty.table()))
        .and_where(pk_eq(ty, id))
        .to_owned();
    let row = conn
        .query_one(conn.get_database_backend().build(&stmt))
        .await?;
    Ok(match row {
        Some(row) => Some(row.try_get::<Option<Timestamp>>("", column)?),
        None => None,
    })
}

/// `UPDATE .. SET column = at WHERE pk = id AND column IS NULL`
pub(crate) async fn mark_destroyed<C: ConnectionTrait>(
    conn: &C,
    ty: &EntityType,
    id: RecordId,
    column: &str,
    at: Timestamp,
) -> AppResult<u64> {
    let stmt = Query::update()
        .table(Alias::new(ty.table()))
        .value(Alias::new(column), at)
        .and_where(pk_eq(ty, id))
        .and_where(Expr::col(Alias::new(column)).is_null())
        .to_owned();
    let result = conn.execute(conn.get_database_backend().build(&stmt)).await?;
    Ok(result.rows_affected())
}

/// `UPDATE .. SET column = NULL WHERE pk = id AND column IS NOT NULL`
pub(crate) async fn clear_destroyed<C: ConnectionTrait>(
    conn: &C,
    ty: &EntityType,
    id: RecordId,
    column: &str,
) -> AppResult<u64> {
    let stmt = Query::update()
        .table(Alias::new(ty.table()))
        .value(Alias::new(column), Option::<Timestamp>::None)
        .and_where(pk_eq(ty, id))
        .and_where(Expr::col(Alias::new(column)).is_not_null())
        .to_owned();
    let result = conn.execute(conn.get_database_backend().build(&stmt)).await?;
    Ok(result.rows_affected())
}

pub(crate) async fn delete_row<C: ConnectionTrait>(
    conn: &C,
    ty: &EntityType,
    id: RecordId,
) -> AppResult<u64> {
    let stmt = Query::delete()
        .from_table(Alias::new(ty.table()))
        .and_where(pk_eq(ty, id))
        .to_owned();
    let result = conn.execute(conn.get_database_backend().build(&stmt)).await?;
    Ok(result.rows_affected())
}

/// `UPDATE .. SET counter = counter + delta WHERE pk = id`
pub(crate) async fn adjust_counter<C: ConnectionTrait>(
    conn: &C,
    ty: &EntityType,
    id: RecordId,
    counter: &str,
    delta: i64,
) -> AppResult<u64> {
    let stmt = Query::update()
        .table(Alias::new(ty.table()))
        .value(Alias::new(counter), Expr::col(Alias::new(counter)).add(delta))
        .and_where(pk_eq(ty, id))
        .to_owned();
    let result = conn.execute(conn.get_database_backend().build(&stmt)).await?;
    Ok(result.rows_affected())
}

/// Insert one row and read it back.
///
/// Unknown attributes are rejected. UUID keys are generated when absent;
/// integer keys are left to the store.
pub(crate) async fn insert<C: ConnectionTrait>(
    conn: &C,
    ty: &EntityType,
    attributes: &BTreeMap<String, AttrValue>,
    destroyed_at: Option<Timestamp>,
) -> AppResult<Record> {
    let mut columns = Vec::new();
    let mut values: Vec<SimpleExpr> = Vec::new();

    match attributes.get(ty.primary_key()) {
        Some(value) => {
            columns.push(Alias::new(ty.primary_key()));
            values.push(bind(value, ty.key_kind().into(), ty.primary_key())?.into());
        }
        None if ty.key_kind() == KeyKind::Uuid => {
            columns.push(Alias::new(ty.primary_key()));
            values.push(Value::from(Uuid::new_v4()).into());
        }
        None => {}
    }

    for (name, value) in attributes {
        if name == ty.primary_key() {
            continue;
        }
        let column = ty.column(name).ok_or_else(|| {
            AppError::validation(format!("{} has no column {}", ty.name(), name))
        })?;
        columns.push(Alias::new(name.as_str()));
        values.push(bind(value, column.kind, name)?.into());
    }

    if let (Some(column), Some(at)) = (ty.destroyed_at_column(), destroyed_at) {
        columns.push(Alias::new(column));
        values.push(Value::from(at).into());
    }

    let mut stmt = Query::insert();
    stmt.into_table(Alias::new(ty.table()));
    if columns.is_empty() {
        stmt.or_default_values();
    } else {
        stmt.columns(columns)
            .values(values)
            .map_err(|e| AppError::internal(e.to_string()))?;
    }
    stmt.returning_all();

    let row = conn
        .query_one(conn.get_database_backend().build(&stmt))
        .await?
        .ok_or_else(|| AppError::internal(format!("insert into {} returned no row", ty.table())))?;
    record_from_row(ty, &row)
}
