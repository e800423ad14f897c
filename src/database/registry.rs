//! Tenant registry: which organisations exist and which database backs them.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::database::manager::DatabaseError;
use crate::database::models::organisation::OrganisationRow;
use crate::database::models::Organisation;

/// Source of truth consulted by the pool cache on a miss and by jobs that
/// iterate over all organisations. Never on the hot path once a tenant is warm.
#[async_trait]
pub trait TenantRegistry: Send + Sync + 'static {
    async fn find_by_database(&self, database_name: &str)
        -> Result<Option<Organisation>, DatabaseError>;

    async fn find_by_id(&self, id: i32) -> Result<Option<Organisation>, DatabaseError>;

    async fn list_organisations(&self) -> Result<Vec<Organisation>, DatabaseError>;

    /// Liveness of the registry's own storage.
    async fn health_check(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Registry backed by the `organisations` table of the main database.
///
/// That table has no host column: organisations read here always use the
/// host of the base URL. A per-organisation host override needs a registry
/// that fills `Organisation::host`, such as [`InMemoryRegistry`].
#[derive(Clone)]
pub struct PgTenantRegistry {
    pool: PgPool,
}

impl PgTenantRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TenantRegistry for PgTenantRegistry {
    async fn find_by_database(
        &self,
        database_name: &str,
    ) -> Result<Option<Organisation>, DatabaseError> {
        let row = sqlx::query_as::<_, OrganisationRow>(
            "SELECT id, nom, database_name, statut
             FROM organisations
             WHERE database_name = $1",
        )
        .bind(database_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Organisation::try_from).transpose()
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Organisation>, DatabaseError> {
        let row = sqlx::query_as::<_, OrganisationRow>(
            "SELECT id, nom, database_name, statut
             FROM organisations
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Organisation::try_from).transpose()
    }

    async fn list_organisations(&self) -> Result<Vec<Organisation>, DatabaseError> {
        let rows = sqlx::query_as::<_, OrganisationRow>(
            "SELECT id, nom, database_name, statut
             FROM organisations
             WHERE database_name IS NOT NULL
             ORDER BY nom",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(valid_organisations(rows))
    }

    /// Pings the registry database to ensure connectivity
    async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// A row that doesn't convert (unknown status code) is skipped so one bad
/// record can't hide every other tenant.
fn valid_organisations(rows: Vec<OrganisationRow>) -> Vec<Organisation> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            match Organisation::try_from(row) {
                Ok(organisation) => Some(organisation),
                Err(e) => {
                    warn!(organisation_id = id, "Skipping organisation: {}", e);
                    None
                }
            }
        })
        .collect()
}

/// Registry held in memory, for embedding and tests.
#[derive(Default)]
pub struct InMemoryRegistry {
    by_database: RwLock<HashMap<String, Organisation>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(organisations: impl IntoIterator<Item = Organisation>) -> Self {
        let registry = Self::new();
        for org in organisations {
            registry.insert(org);
        }
        registry
    }

    /// Insert or replace the organisation registered for its database name.
    pub fn insert(&self, organisation: Organisation) {
        let mut map = self.by_database.write().unwrap_or_else(|e| e.into_inner());
        map.insert(organisation.database_name.clone(), organisation);
    }

    pub fn remove(&self, database_name: &str) -> Option<Organisation> {
        let mut map = self.by_database.write().unwrap_or_else(|e| e.into_inner());
        map.remove(database_name)
    }

    fn snapshot(&self) -> Vec<Organisation> {
        let map = self.by_database.read().unwrap_or_else(|e| e.into_inner());
        map.values().cloned().collect()
    }
}

#[async_trait]
impl TenantRegistry for InMemoryRegistry {
    async fn find_by_database(
        &self,
        database_name: &str,
    ) -> Result<Option<Organisation>, DatabaseError> {
        let map = self.by_database.read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(database_name).cloned())
    }

    async fn find_by_id(&self, id: i32) -> Result<Option<Organisation>, DatabaseError> {
        Ok(self.snapshot().into_iter().find(|o| o.id == id))
    }

    async fn list_organisations(&self) -> Result<Vec<Organisation>, DatabaseError> {
        let mut organisations = self.snapshot();
        organisations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(organisations)
    }
}
