use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::AuthUser;
use crate::database::Connector;
use crate::error::ApiError;
use crate::state::AppState;

/// JWT authentication middleware that validates tokens and extracts user context
pub async fn jwt_auth_middleware<K: Connector>(
    State(state): State<AppState<K>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(request.headers())?
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))?;

    let claims = state.jwt.validate(&token)?;
    request.extensions_mut().insert(AuthUser::from(claims));

    Ok(next.run(request).await)
}

/// Like [`jwt_auth_middleware`] but lets requests without a token through.
/// A token that is present must still be valid.
pub async fn optional_jwt_middleware<K: Connector>(
    State(state): State<AppState<K>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = extract_jwt_from_headers(request.headers())? {
        let claims = state.jwt.validate(&token)?;
        request.extensions_mut().insert(AuthUser::from(claims));
    }

    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(auth_header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::unauthorized("Invalid Authorization header format"))?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if token.trim().is_empty() => Err(ApiError::unauthorized("Empty JWT token")),
        Some(token) => Ok(Some(token.trim().to_string())),
        None => Err(ApiError::unauthorized(
            "Authorization header must use Bearer token format",
        )),
    }
}
