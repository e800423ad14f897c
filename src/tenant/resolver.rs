use tracing::{debug, warn};

use crate::auth::AuthUser;
use crate::database::statement::is_valid_identifier;
use crate::tenant::{RouteAccess, TenantContext, TenantError};

/// Identity data already attached to a request by the time it is resolved.
/// Everything here has been verified upstream; resolution does no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdentity<'a> {
    /// Context attached by an upstream middleware.
    pub attached: Option<&'a TenantContext>,
    /// Principal decoded from the request credential.
    pub principal: Option<&'a AuthUser>,
}

impl<'a> RequestIdentity<'a> {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_principal(principal: &'a AuthUser) -> Self {
        Self {
            attached: None,
            principal: Some(principal),
        }
    }

    pub fn from_attached(context: &'a TenantContext) -> Self {
        Self {
            attached: Some(context),
            principal: None,
        }
    }
}

/// Produces the `TenantContext` for a request.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    default_tenant: TenantContext,
}

impl TenantResolver {
    /// `default_tenant` is used for public routes that carry no identity.
    pub fn new(default_tenant: TenantContext) -> Self {
        Self { default_tenant }
    }

    pub fn default_tenant(&self) -> &TenantContext {
        &self.default_tenant
    }

    /// Resolution order: attached context, then principal claims, then (public
    /// routes only) the default tenant. A principal with incomplete tenant
    /// fields is always an error, even on a public route.
    pub fn resolve(
        &self,
        identity: &RequestIdentity<'_>,
        access: RouteAccess,
    ) -> Result<TenantContext, TenantError> {
        if let Some(context) = identity.attached {
            if !is_valid_identifier(&context.database_name) {
                return Err(TenantError::IdentityIncomplete {
                    missing: "databaseName",
                });
            }
            debug!(
                database = %context.database_name,
                organisation_id = context.organisation_id,
                "Tenant context from upstream middleware"
            );
            return Ok(context.clone());
        }

        if let Some(principal) = identity.principal {
            let context = from_principal(principal).map_err(|e| {
                warn!(user = %principal.user_id, "Rejected credential: {}", e);
                e
            })?;
            debug!(
                database = %context.database_name,
                organisation_id = context.organisation_id,
                user = %principal.user_id,
                "Tenant context from credential"
            );
            return Ok(context);
        }

        match access {
            RouteAccess::Public => {
                warn!(
                    database = %self.default_tenant.database_name,
                    "No identity on public route, using default tenant"
                );
                Ok(self.default_tenant.clone())
            }
            RouteAccess::Authenticated => Err(TenantError::IdentityIncomplete {
                missing: "credential",
            }),
        }
    }
}

fn from_principal(principal: &AuthUser) -> Result<TenantContext, TenantError> {
    let database_name = principal
        .database_name
        .as_deref()
        .filter(|name| is_valid_identifier(name))
        .ok_or(TenantError::IdentityIncomplete {
            missing: "databaseName",
        })?;

    let organisation_id = principal
        .organisation_id
        .filter(|id| *id > 0)
        .ok_or(TenantError::IdentityIncomplete {
            missing: "organisationId",
        })?;

    let organisation_name = principal
        .organisation_name
        .as_deref()
        .ok_or(TenantError::IdentityIncomplete {
            missing: "organisationName",
        })?;

    Ok(TenantContext::new(database_name, organisation_id, organisation_name))
}
