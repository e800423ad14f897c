mod common;

use anyhow::Result;

use shipnology_tenancy::auth::AuthUser;
use shipnology_tenancy::tenant::{RequestIdentity, RouteAccess, TenantError, TenantResolver};

fn resolver() -> TenantResolver {
    TenantResolver::new(common::default_tenant())
}

fn principal(token: &str) -> Result<AuthUser> {
    Ok(AuthUser::from(common::keys().validate(token)?))
}

#[test]
fn token_claims_resolve_to_their_tenant() -> Result<()> {
    let user = principal(&common::token_for(&common::tenant_b()))?;

    for access in [RouteAccess::Authenticated, RouteAccess::Public] {
        let context = resolver().resolve(&RequestIdentity::from_principal(&user), access)?;
        assert_eq!(context, common::tenant_b());
    }
    Ok(())
}

#[test]
fn legacy_token_is_rejected_not_defaulted() -> Result<()> {
    let user = principal(&common::legacy_token())?;

    let err = resolver()
        .resolve(&RequestIdentity::from_principal(&user), RouteAccess::Public)
        .unwrap_err();
    assert!(matches!(
        err,
        TenantError::IdentityIncomplete { missing: "databaseName" }
    ));
    Ok(())
}

#[test]
fn attached_context_is_returned_unchanged() -> Result<()> {
    let attached = common::tenant_a();
    let context = resolver().resolve(
        &RequestIdentity::from_attached(&attached),
        RouteAccess::Authenticated,
    )?;
    assert_eq!(context, attached);
    Ok(())
}

#[test]
fn default_only_for_anonymous_public_routes() {
    let resolver = resolver();
    assert_eq!(
        resolver
            .resolve(&RequestIdentity::anonymous(), RouteAccess::Public)
            .ok(),
        Some(common::default_tenant())
    );
    assert!(resolver
        .resolve(&RequestIdentity::anonymous(), RouteAccess::Authenticated)
        .is_err());
}

#[test]
fn tampered_token_fails_validation() {
    let token = common::token_for(&common::tenant_a());
    let tampered = format!("{}x", token);
    assert!(common::keys().validate(&tampered).is_err());
}
