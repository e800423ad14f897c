use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::database::Connector;
use crate::handlers;
use crate::middleware::{
    jwt_auth_middleware, optional_jwt_middleware, public_tenant_middleware,
    require_tenant_middleware,
};
use crate::state::AppState;

pub fn router<K: Connector>(state: AppState<K>) -> Router {
    Router::new()
        // Public
        .route("/health", get(handlers::health::health::<K>))
        .merge(public_routes(state.clone()))
        // Protected
        .merge(tenant_routes(state.clone()))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Public routes: an optional token, default tenant when there is none.
fn public_routes<K: Connector>(state: AppState<K>) -> Router<AppState<K>> {
    Router::new()
        .route("/public/tenant", get(handlers::tenant::show::<K>))
        // Layers run bottom-up: the token is decoded before the tenant is resolved.
        .layer(from_fn_with_state(state.clone(), public_tenant_middleware::<K>))
        .layer(from_fn_with_state(state, optional_jwt_middleware::<K>))
}

fn tenant_routes<K: Connector>(state: AppState<K>) -> Router<AppState<K>> {
    Router::new()
        .route("/api/tenant", get(handlers::tenant::show::<K>))
        .route("/api/tenant/pool", delete(handlers::tenant::reconnect::<K>))
        .layer(from_fn_with_state(state.clone(), require_tenant_middleware::<K>))
        .layer(from_fn_with_state(state, jwt_auth_middleware::<K>))
}
