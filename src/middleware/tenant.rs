//! Attaches the resolved `TenantContext` to each request and hands handlers a
//! `TenantDatabase` bound to it.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, Extensions},
    middleware::Next,
    response::Response,
};

use crate::auth::AuthUser;
use crate::database::Connector;
use crate::error::ApiError;
use crate::state::AppState;
use crate::tenant::{RequestIdentity, RouteAccess, TenantContext, TenantDatabase, TenantResolver};

/// Resolve the tenant for routes that require a signed-in user.
pub async fn require_tenant_middleware<K: Connector>(
    State(state): State<AppState<K>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    attach_tenant(&state.resolver, request, next, RouteAccess::Authenticated).await
}

/// Resolve the tenant for public routes, falling back to the default tenant
/// when the request carries no identity.
pub async fn public_tenant_middleware<K: Connector>(
    State(state): State<AppState<K>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    attach_tenant(&state.resolver, request, next, RouteAccess::Public).await
}

async fn attach_tenant(
    resolver: &TenantResolver,
    mut request: Request,
    next: Next,
    access: RouteAccess,
) -> Result<Response, ApiError> {
    let context = resolve_from_extensions(resolver, request.extensions(), access)?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn resolve_from_extensions(
    resolver: &TenantResolver,
    extensions: &Extensions,
    access: RouteAccess,
) -> Result<TenantContext, ApiError> {
    let identity = RequestIdentity {
        attached: extensions.get::<TenantContext>(),
        principal: extensions.get::<AuthUser>(),
    };
    Ok(resolver.resolve(&identity, access)?)
}

#[async_trait]
impl<K: Connector> FromRequestParts<AppState<K>> for TenantDatabase<K> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<K>,
    ) -> Result<Self, Self::Rejection> {
        // Without the tenant middleware in front, only an authenticated
        // principal is acceptable.
        let context =
            resolve_from_extensions(&state.resolver, &parts.extensions, RouteAccess::Authenticated)?;
        Ok(TenantDatabase::new(context, state.pools.clone()))
    }
}
