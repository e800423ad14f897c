mod common;

use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use common::MockConnector;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let response = app.clone().oneshot(builder.body(Body::empty())?).await?;

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = serde_json::from_slice(&bytes)?;
    Ok((status, body))
}

async fn get(app: &Router, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
    send(app, Method::GET, uri, token).await
}

#[tokio::test]
async fn health_reports_registry_and_pools() -> Result<()> {
    let app = common::router(common::manager(MockConnector::new(), TIMEOUT));

    let (status, body) = get(&app, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registry"], "ok");
    assert_eq!(body["data"]["active_pools"], 0);
    Ok(())
}

#[tokio::test]
async fn protected_route_requires_a_token() -> Result<()> {
    let connector = MockConnector::new();
    let app = common::router(common::manager(connector.clone(), TIMEOUT));

    let (status, body) = get(&app, "/api/tenant", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = get(&app, "/api/tenant", Some("not.a.jwt")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(connector.connects(), 0);
    Ok(())
}

#[tokio::test]
async fn token_without_tenant_fields_is_unauthorized() -> Result<()> {
    let connector = MockConnector::new();
    let app = common::router(common::manager(connector.clone(), TIMEOUT));
    let token = common::legacy_token();

    for uri in ["/api/tenant", "/public/tenant"] {
        let (status, body) = get(&app, uri, Some(&token)).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert!(body["message"]
            .as_str()
            .unwrap_or_default()
            .contains("sign in again"));
    }
    assert_eq!(connector.connects(), 0);
    Ok(())
}

#[tokio::test]
async fn authenticated_request_reaches_its_tenant() -> Result<()> {
    let connector = MockConnector::new();
    let pools = common::manager(connector.clone(), TIMEOUT);
    let app = common::router(pools.clone());
    let token = common::token_for(&common::tenant_a());

    let (status, body) = get(&app, "/api/tenant", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["tenant"]["databaseName"], "shipnology_a");
    assert_eq!(body["data"]["tenant"]["organisationId"], 7);
    assert_eq!(body["data"]["pooled"], true);

    get(&app, "/api/tenant", Some(&token)).await?;
    assert_eq!(connector.connects(), 1);
    assert!(pools.contains("shipnology_a").await);
    Ok(())
}

#[tokio::test]
async fn unknown_tenant_is_forbidden() -> Result<()> {
    let app = common::router(common::manager(MockConnector::new(), TIMEOUT));
    let ghost = shipnology_tenancy::tenant::TenantContext::new("shipnology_zz", 99, "Ghost");

    let (status, body) = get(&app, "/api/tenant", Some(&common::token_for(&ghost))).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
    Ok(())
}

#[tokio::test]
async fn unreachable_tenant_is_service_unavailable() -> Result<()> {
    let connector = MockConnector::new();
    connector.fail("shipnology_b");
    let app = common::router(common::manager(connector.clone(), TIMEOUT));
    let token = common::token_for(&common::tenant_b());

    let (status, body) = get(&app, "/api/tenant", Some(&token)).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "SERVICE_UNAVAILABLE");

    connector.recover("shipnology_b");
    let (status, _) = get(&app, "/api/tenant", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn public_route_falls_back_to_default_tenant() -> Result<()> {
    let app = common::router(common::manager(MockConnector::new(), TIMEOUT));

    let (status, body) = get(&app, "/public/tenant", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tenant"]["databaseName"], "velosi");

    let token = common::token_for(&common::tenant_b());
    let (status, body) = get(&app, "/public/tenant", Some(&token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tenant"]["databaseName"], "shipnology_b");
    Ok(())
}

#[tokio::test]
async fn reconnect_drops_only_the_callers_pool() -> Result<()> {
    let connector = MockConnector::new();
    let pools = common::manager(connector.clone(), TIMEOUT);
    let app = common::router(pools.clone());
    let token_a = common::admin_token_for(&common::tenant_a());

    get(&app, "/api/tenant", Some(&token_a)).await?;
    get(&app, "/api/tenant", Some(&common::token_for(&common::tenant_b()))).await?;

    let (status, body) = send(&app, Method::DELETE, "/api/tenant/pool", Some(&token_a)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["database_name"], "shipnology_a");
    assert_eq!(body["data"]["invalidated"], true);

    let created = connector.created();
    assert!(created.iter().any(|c| c.database() == "shipnology_a" && c.is_closed()));
    assert!(created.iter().all(|c| c.database() != "shipnology_b" || !c.is_closed()));
    assert!(!pools.contains("shipnology_a").await);
    assert!(pools.contains("shipnology_b").await);
    Ok(())
}

#[tokio::test]
async fn reconnect_requires_admin_role() -> Result<()> {
    let connector = MockConnector::new();
    let pools = common::manager(connector.clone(), TIMEOUT);
    let app = common::router(pools.clone());
    let token = common::token_for(&common::tenant_a());

    get(&app, "/api/tenant", Some(&token)).await?;

    let (status, body) = send(&app, Method::DELETE, "/api/tenant/pool", Some(&token)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    assert!(pools.contains("shipnology_a").await);
    assert!(connector.created().iter().all(|c| !c.is_closed()));
    Ok(())
}
