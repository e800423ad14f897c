//! Multi-tenant database routing for the Shipnology ERP backend.
//!
//! Every organisation owns a physical PostgreSQL database. Requests carry the
//! organisation in their token; [`tenant::TenantResolver`] turns that into a
//! [`tenant::TenantContext`], [`database::DatabaseManager`] maps the database
//! name to a shared pool (opened once, on first use) and
//! [`tenant::TenantDatabase`] gives services repositories and parameterised
//! queries bound to that pool.

pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;
pub mod tenant;
