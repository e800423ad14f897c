use thiserror::Error;

use crate::database::DatabaseError;

/// Failures of tenant resolution and tenant-scoped data access.
///
/// None of these ever degrade to another organisation's database.
#[derive(Debug, Error)]
pub enum TenantError {
    /// The credential lacks tenant fields: stale or malformed, not transient.
    #[error("Tenant information missing from credential ({missing}). Please sign in again.")]
    IdentityIncomplete { missing: &'static str },

    /// No known, active organisation uses this database.
    #[error("Access denied to organisation database '{0}'")]
    TenantNotFound(String),

    #[error("Database '{database}' is unavailable: {reason}")]
    TenantDatabaseUnavailable { database: String, reason: String },

    #[error("Query failed: {0}")]
    QueryFailed(#[from] DatabaseError),
}

impl TenantError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TenantError::TenantDatabaseUnavailable { .. })
    }
}
