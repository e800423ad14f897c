//! Shared application state for all routes.

use std::sync::Arc;

use crate::auth::JwtKeys;
use crate::database::{Connector, DatabaseManager};
use crate::tenant::TenantResolver;

pub struct AppState<K: Connector> {
    pub pools: Arc<DatabaseManager<K>>,
    pub resolver: Arc<TenantResolver>,
    pub jwt: Arc<JwtKeys>,
}

impl<K: Connector> AppState<K> {
    pub fn new(pools: Arc<DatabaseManager<K>>, resolver: TenantResolver, jwt: JwtKeys) -> Self {
        Self {
            pools,
            resolver: Arc::new(resolver),
            jwt: Arc::new(jwt),
        }
    }
}

// Manual impl: deriving would require `K: Clone`.
impl<K: Connector> Clone for AppState<K> {
    fn clone(&self) -> Self {
        Self {
            pools: Arc::clone(&self.pools),
            resolver: Arc::clone(&self.resolver),
            jwt: Arc::clone(&self.jwt),
        }
    }
}
