//! Route configuration.

use axum::Router;

use crate::handlers::{health_routes, record_routes};
use crate::state::AppState;

/// Create the main router: health check plus one nested router per
/// registered entity type, mounted at its resource path.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().nest("/health", health_routes());
    for ty in state.engine.registry().iter() {
        router = router.nest(&format!("/{}", ty.resource_path()), record_routes(ty));
    }
    router.with_state(state)
}
