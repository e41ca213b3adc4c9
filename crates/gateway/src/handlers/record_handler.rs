//! Record handlers, mounted once per registered entity type.

use std::collections::BTreeMap;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, put},
    Router,
};
use serde::Deserialize;

use common::AppResult;
use domain::{AttrValue, Record, RecordId, Timestamp};
use engine::EntityType;

use crate::state::AppState;

/// Entity type served by a nested router.
#[derive(Debug, Clone)]
pub struct Resource {
    pub entity: String,
}

/// Filter for the destroyed listing.
#[derive(Debug, Deserialize)]
pub struct DestroyedParams {
    /// Only records destroyed at exactly this time (RFC 3339)
    pub at: Option<Timestamp>,
}

/// Create routes for one entity type. Only soft-deletable types get a
/// restore route.
pub fn record_routes(ty: &EntityType) -> Router<AppState> {
    let mut router = Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/destroyed", get(list_destroyed))
        .route("/:id", get(get_record).delete(destroy_record));
    if ty.is_soft_deletable() {
        router = router.route("/:id/restore", put(restore_record));
    }
    router.layer(Extension(Resource {
        entity: ty.name().to_string(),
    }))
}

fn parse_id(state: &AppState, resource: &Resource, raw: &str) -> AppResult<RecordId> {
    let ty = state.engine.entity(&resource.entity)?;
    Ok(RecordId::parse(ty.key_kind(), raw)?)
}

/// List visible records
pub async fn list_records(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
) -> AppResult<Json<Vec<Record>>> {
    let records = state
        .engine
        .query(&resource.entity)?
        .order_by_id()
        .all(state.db())
        .await?;
    Ok(Json(records))
}

/// List destroyed records, optionally only one cascade's
pub async fn list_destroyed(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Query(params): Query<DestroyedParams>,
) -> AppResult<Json<Vec<Record>>> {
    let records = state
        .engine
        .query(&resource.entity)?
        .destroyed(params.at)
        .order_by_id()
        .all(state.db())
        .await?;
    Ok(Json(records))
}

/// Get a visible record by id
pub async fn get_record(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Path(id): Path<String>,
) -> AppResult<Json<Record>> {
    let id = parse_id(&state, &resource, &id)?;
    let record = state.engine.find(state.db(), &resource.entity, id).await?;
    Ok(Json(record))
}

/// Insert a record from a JSON object of column values
pub async fn create_record(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Json(attributes): Json<BTreeMap<String, AttrValue>>,
) -> AppResult<(StatusCode, Json<Record>)> {
    let record = state
        .engine
        .create(state.db(), &resource.entity, attributes)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Destroy a record and its dependents
pub async fn destroy_record(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    let id = parse_id(&state, &resource, &id)?;
    let mut record = state.engine.find(state.db(), &resource.entity, id).await?;

    state.engine.destroy(state.db(), &mut record).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Restore a destroyed record and the dependents destroyed with it
pub async fn restore_record(
    State(state): State<AppState>,
    Extension(resource): Extension<Resource>,
    Path(id): Path<String>,
) -> AppResult<Json<Record>> {
    let id = parse_id(&state, &resource, &id)?;
    let mut record = state
        .engine
        .find_with_destroyed(state.db(), &resource.entity, id)
        .await?;

    state.engine.restore(state.db(), &mut record).await?;

    Ok(Json(record))
}
