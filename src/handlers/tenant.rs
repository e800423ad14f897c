use axum::extract::State;
use axum::Extension;
use serde::Serialize;

use crate::auth::AuthUser;
use crate::database::Connector;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;
use crate::tenant::{TenantContext, TenantDatabase};

#[derive(Debug, Serialize)]
pub struct TenantStatus {
    pub tenant: TenantContext,
    pub pooled: bool,
}

/// Resolved organisation of the caller, after making sure its database is
/// reachable.
pub async fn show<K: Connector>(
    State(state): State<AppState<K>>,
    db: TenantDatabase<K>,
) -> ApiResult<TenantStatus> {
    db.connection().await?;
    let tenant = db.tenant_info().clone();
    let pooled = state.pools.contains(&tenant.database_name).await;
    Ok(ApiResponse::success(TenantStatus { tenant, pooled }))
}

#[derive(Debug, Serialize)]
pub struct Reconnected {
    pub database_name: String,
    pub invalidated: bool,
}

/// Drop the caller's organisation pool so the next request reconnects.
/// The pool is shared by every user of the organisation: admins only.
pub async fn reconnect<K: Connector>(
    State(state): State<AppState<K>>,
    Extension(user): Extension<AuthUser>,
    db: TenantDatabase<K>,
) -> ApiResult<Reconnected> {
    if !user.is_admin() {
        tracing::warn!(user = %user.user_id, "Reconnect refused for non-admin user");
        return Err(ApiError::forbidden("Administrator role required"));
    }

    let database_name = db.tenant_info().database_name.clone();
    let invalidated = state.pools.invalidate(&database_name).await;
    tracing::info!(database = %database_name, invalidated, "Reconnect requested");
    Ok(ApiResponse::success(Reconnected {
        database_name,
        invalidated,
    }))
}
