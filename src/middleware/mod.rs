pub mod auth;
pub mod response;
pub mod tenant;

pub use auth::{jwt_auth_middleware, optional_jwt_middleware};
pub use response::{ApiResponse, ApiResult};
pub use tenant::{public_tenant_middleware, require_tenant_middleware};
