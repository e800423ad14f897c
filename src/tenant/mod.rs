//! Tenant identity: resolving which organisation a request belongs to and
//! scoping data access to that organisation's database.

pub mod context;
pub mod error;
pub mod resolver;
pub mod scope;

pub use context::{RouteAccess, TenantContext};
pub use error::TenantError;
pub use resolver::{RequestIdentity, TenantResolver};
pub use scope::TenantDatabase;
