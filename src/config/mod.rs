use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::database::PoolOptions;
use crate::tenant::TenantContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub tenant: TenantConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Server URL; its path is replaced per tenant.
    pub url: Option<String>,
    /// Database holding the `organisations` table.
    pub registry_database: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,
    pub idle_timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub default_database: String,
    pub default_organisation_id: i32,
    pub default_organisation_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("REGISTRY_DATABASE") {
            self.database.registry_database = v;
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_MIN_CONNECTIONS") {
            self.database.min_connections = v.parse().unwrap_or(self.database.min_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_IDLE_TIMEOUT") {
            self.database.idle_timeout = v.parse().ok();
        }

        // Tenant overrides
        if let Ok(v) = env::var("TENANT_DEFAULT_DATABASE") {
            self.tenant.default_database = v;
        }
        if let Ok(v) = env::var("TENANT_DEFAULT_ORGANISATION_ID") {
            self.tenant.default_organisation_id =
                v.parse().unwrap_or(self.tenant.default_organisation_id);
        }
        if let Ok(v) = env::var("TENANT_DEFAULT_ORGANISATION_NAME") {
            self.tenant.default_organisation_name = v;
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                registry_database: "shipnology".to_string(),
                max_connections: 5,
                min_connections: 0,
                connection_timeout: 30,
                idle_timeout: Some(600),
            },
            tenant: TenantConfig::default(),
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24 * 7, // 1 week
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                registry_database: "shipnology".to_string(),
                max_connections: 10,
                min_connections: 1,
                connection_timeout: 10,
                idle_timeout: Some(600),
            },
            tenant: TenantConfig::default(),
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 24,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                registry_database: "shipnology".to_string(),
                max_connections: 20,
                min_connections: 1,
                connection_timeout: 5,
                idle_timeout: Some(300),
            },
            tenant: TenantConfig::default(),
            security: SecurityConfig {
                jwt_secret: String::new(),
                jwt_expiry_hours: 4,
            },
        }
    }
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            default_database: "velosi".to_string(),
            default_organisation_id: 1,
            default_organisation_name: "Velosi".to_string(),
        }
    }
}

impl TenantConfig {
    pub fn default_context(&self) -> TenantContext {
        TenantContext::new(
            self.default_database.clone(),
            self.default_organisation_id,
            self.default_organisation_name.clone(),
        )
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    pub fn pool_options(&self) -> PoolOptions {
        PoolOptions {
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            acquire_timeout: self.connect_timeout(),
            idle_timeout: self.idle_timeout.map(Duration::from_secs),
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
