use serde::{Deserialize, Serialize};

/// The organisation a request operates on. Resolved once per request and
/// never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub database_name: String,
    pub organisation_id: i32,
    pub organisation_name: String,
}

impl TenantContext {
    pub fn new(
        database_name: impl Into<String>,
        organisation_id: i32,
        organisation_name: impl Into<String>,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            organisation_id,
            organisation_name: organisation_name.into(),
        }
    }
}

/// Whether a route demands an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Missing identity is an error.
    Authenticated,
    /// Missing identity resolves to the default tenant.
    Public,
}
