use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::debug;

use crate::database::{
    Connector, DatabaseManager, Entity, Organisation, Repository, Rows, Statement,
    TenantConnection,
};
use crate::tenant::{TenantContext, TenantError};

/// Data access for one request, bound to that request's organisation.
///
/// The pool is fetched from the `DatabaseManager` on first use and pinned for
/// the rest of the scope, so every call in a request hits the same handle even
/// if the cache entry is invalidated in between.
pub struct TenantDatabase<K: Connector> {
    context: TenantContext,
    pools: Arc<DatabaseManager<K>>,
    connection: OnceCell<K::Connection>,
}

impl<K: Connector> TenantDatabase<K> {
    pub fn new(context: TenantContext, pools: Arc<DatabaseManager<K>>) -> Self {
        Self {
            context,
            pools,
            connection: OnceCell::new(),
        }
    }

    /// Scope for a job acting on behalf of an organisation outside any
    /// request, e.g. a scheduler iterating over all tenants.
    pub fn for_organisation(organisation: &Organisation, pools: Arc<DatabaseManager<K>>) -> Self {
        let context = TenantContext::new(
            organisation.database_name.clone(),
            organisation.id,
            organisation.name.clone(),
        );
        Self::new(context, pools)
    }

    pub fn tenant_info(&self) -> &TenantContext {
        &self.context
    }

    /// The organisation's pool, opened lazily on first use.
    pub async fn connection(&self) -> Result<&K::Connection, TenantError> {
        self.connection
            .get_or_try_init(|| self.pools.get(&self.context.database_name))
            .await
    }

    pub async fn repository<E: Entity>(&self) -> Result<Repository<E, K::Connection>, TenantError> {
        let connection = self.connection().await?.clone();
        debug!(
            table = E::TABLE,
            database = %self.context.database_name,
            "Repository handle"
        );
        Ok(Repository::new(connection)?)
    }

    /// Run a parameterised statement and return its rows.
    pub async fn raw_query(&self, statement: Statement) -> Result<Rows, TenantError> {
        statement.validate()?;
        let connection = self.connection().await?;
        debug!(
            database = %self.context.database_name,
            params = statement.params().len(),
            "SQL: {}",
            preview(statement.sql())
        );
        Ok(connection.fetch_rows(&statement).await?)
    }

    /// Run a parameterised statement and return the number of affected rows.
    pub async fn raw_execute(&self, statement: Statement) -> Result<u64, TenantError> {
        statement.validate()?;
        let connection = self.connection().await?;
        debug!(
            database = %self.context.database_name,
            params = statement.params().len(),
            "SQL: {}",
            preview(statement.sql())
        );
        Ok(connection.execute(&statement).await?)
    }
}

fn preview(sql: &str) -> &str {
    match sql.char_indices().nth(100) {
        Some((end, _)) => &sql[..end],
        None => sql,
    }
}
