use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::database::connection::{ConnectionParams, Connector, TenantConnection};
use crate::database::models::Organisation;
use crate::database::registry::TenantRegistry;
use crate::database::statement::is_valid_identifier;
use crate::tenant::TenantError;

/// Errors from the database layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid statement: {0}")]
    InvalidStatement(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Failed to decode row: {0}")]
    Decode(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Settings shared by every tenant connection.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Server URL holding the shared host and credentials. Its path is
    /// replaced by each tenant's database name.
    pub base_url: Url,
    /// Upper bound for one initialisation: registry lookup, connect and ping.
    pub connect_timeout: Duration,
}

impl ManagerSettings {
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, DatabaseError> {
        let base_url = Url::parse(base_url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        Ok(Self {
            base_url,
            connect_timeout,
        })
    }
}

/// Why a single initialisation flight failed. Shared by every waiter, hence
/// `Clone` and free of the underlying driver error.
#[derive(Debug, Clone)]
enum InitFailure {
    NotFound,
    Unavailable(String),
}

impl InitFailure {
    fn into_error(self, database_name: &str) -> TenantError {
        match self {
            InitFailure::NotFound => TenantError::TenantNotFound(database_name.to_string()),
            InitFailure::Unavailable(reason) => TenantError::TenantDatabaseUnavailable {
                database: database_name.to_string(),
                reason,
            },
        }
    }
}

/// What a flight reports once its task has updated the slot map.
#[derive(Clone)]
enum FlightOutcome<C> {
    Ready(C),
    Failed(InitFailure),
    /// The slot was invalidated or drained while connecting. The flight has
    /// already closed its handle.
    Superseded,
}

type InitFlight<C> = Shared<BoxFuture<'static, FlightOutcome<C>>>;
type SlotMap<C> = Arc<RwLock<HashMap<String, Slot<C>>>>;

enum Slot<C> {
    Pending { flight: u64, init: InitFlight<C> },
    Ready { connection: C },
}

/// Process-wide cache of tenant database handles keyed by database name.
///
/// Hits only take the shared read lock. A miss installs a pending slot and
/// spawns one initialisation task for that key; every concurrent caller
/// awaits the same task, so one database is never opened twice and unrelated
/// tenants never wait on each other. The task owns its timeout and settles
/// the slot itself, whether or not anyone is still waiting. The lock is never
/// held across I/O.
pub struct DatabaseManager<K: Connector> {
    connector: Arc<K>,
    registry: Arc<dyn TenantRegistry>,
    settings: ManagerSettings,
    slots: SlotMap<K::Connection>,
    next_flight: AtomicU64,
    closed: AtomicBool,
}

impl<K: Connector> DatabaseManager<K> {
    pub fn new(connector: K, registry: Arc<dyn TenantRegistry>, settings: ManagerSettings) -> Self {
        Self {
            connector: Arc::new(connector),
            registry,
            settings,
            slots: Arc::new(RwLock::new(HashMap::new())),
            next_flight: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<dyn TenantRegistry> {
        &self.registry
    }

    /// Get existing connection or create a new one lazily
    pub async fn get(&self, database_name: &str) -> Result<K::Connection, TenantError> {
        if !is_valid_identifier(database_name) {
            warn!(database = database_name, "Rejected invalid tenant database name");
            return Err(TenantError::TenantNotFound(database_name.to_string()));
        }

        loop {
            let init = match self.lookup(database_name).await {
                Lookup::Ready(connection) => return Ok(connection),
                Lookup::Pending(init) => init,
                Lookup::Closed => {
                    warn!(database = database_name, "Connection requested after shutdown");
                    return Err(TenantError::TenantDatabaseUnavailable {
                        database: database_name.to_string(),
                        reason: "connection manager is shut down".to_string(),
                    });
                }
            };

            match init.await {
                FlightOutcome::Ready(connection) => return Ok(connection),
                FlightOutcome::Failed(failure) => return Err(failure.into_error(database_name)),
                FlightOutcome::Superseded => {
                    debug!(database = database_name, "Flight invalidated, retrying");
                }
            }
        }
    }

    async fn lookup(&self, database_name: &str) -> Lookup<K::Connection> {
        // Fast path: try read lock
        {
            let slots = self.slots.read().await;
            match slots.get(database_name) {
                Some(Slot::Ready { connection }) => return Lookup::Ready(connection.clone()),
                Some(Slot::Pending { init, .. }) => return Lookup::Pending(init.clone()),
                None => {}
            }
        }

        let mut slots = self.slots.write().await;
        match slots.get(database_name) {
            Some(Slot::Ready { connection }) => Lookup::Ready(connection.clone()),
            Some(Slot::Pending { init, .. }) => Lookup::Pending(init.clone()),
            // Checked under the write lock so nothing is added after close_all drained.
            None if self.closed.load(Ordering::SeqCst) => Lookup::Closed,
            None => {
                let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
                let init = self.start_flight(database_name, flight);
                slots.insert(
                    database_name.to_string(),
                    Slot::Pending {
                        flight,
                        init: init.clone(),
                    },
                );
                debug!(database = database_name, flight, "Started connection flight");
                Lookup::Pending(init)
            }
        }
    }

    fn start_flight(&self, database_name: &str, flight: u64) -> InitFlight<K::Connection> {
        let connector = Arc::clone(&self.connector);
        let registry = Arc::clone(&self.registry);
        let slots = Arc::clone(&self.slots);
        let base_url = self.settings.base_url.clone();
        let timeout = self.settings.connect_timeout;
        let name = database_name.to_string();

        let task = tokio::spawn(async move {
            let establish = establish(&*connector, &*registry, &base_url, &name);
            let result = match tokio::time::timeout(timeout, establish).await {
                Ok(result) => result,
                Err(_) => {
                    error!(
                        database = %name,
                        timeout_ms = timeout.as_millis() as u64,
                        "Timed out establishing tenant database connection"
                    );
                    Err(InitFailure::Unavailable(format!(
                        "timed out after {}ms",
                        timeout.as_millis()
                    )))
                }
            };
            settle(&slots, &name, flight, result).await
        });

        let slots = Arc::clone(&self.slots);
        let name = database_name.to_string();
        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(database = %name, "Tenant connection task failed: {}", e);
                    discard(&slots, &name, flight).await;
                    FlightOutcome::Failed(InitFailure::Unavailable(
                        "connection task failed".to_string(),
                    ))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Close and evict a cached connection. Holders of the old handle keep
    /// it; new callers get a freshly created one.
    pub async fn invalidate(&self, database_name: &str) -> bool {
        let removed = self.slots.write().await.remove(database_name);

        match removed {
            Some(Slot::Ready { connection }) => {
                connection.close().await;
                info!(database = database_name, "Invalidated tenant database pool");
                true
            }
            Some(Slot::Pending { init, .. }) => {
                // The flight finds its slot gone and closes its own handle.
                init.await;
                info!(database = database_name, "Invalidated pending tenant connection");
                true
            }
            None => false,
        }
    }

    /// Database names with a ready pool.
    pub async fn list_active(&self) -> BTreeSet<String> {
        self.slots
            .read()
            .await
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready { .. }))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn contains(&self, database_name: &str) -> bool {
        matches!(
            self.slots.read().await.get(database_name),
            Some(Slot::Ready { .. })
        )
    }

    /// Whether `close_all` has run. A closed manager opens nothing new.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every organisation the registry reports as active, for jobs that
    /// iterate over all tenants.
    pub async fn active_organisations(&self) -> Result<Vec<Organisation>, TenantError> {
        let organisations = self.registry.list_organisations().await.map_err(|e| {
            error!("Failed to list organisations: {}", e);
            TenantError::QueryFailed(e)
        })?;
        Ok(organisations.into_iter().filter(|o| o.is_active()).collect())
    }

    /// Close and remove all pools (e.g., on shutdown). Pending flights are
    /// awaited so their handles get closed too; later `get` calls fail.
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let drained: Vec<_> = self.slots.write().await.drain().collect();
        for (name, slot) in drained {
            match slot {
                Slot::Ready { connection } => {
                    connection.close().await;
                    info!("Closed database pool: {}", name);
                }
                Slot::Pending { init, .. } => {
                    init.await;
                    info!("Settled pending database pool: {}", name);
                }
            }
        }
    }
}

enum Lookup<C> {
    Ready(C),
    Pending(InitFlight<C>),
    Closed,
}

/// Record a flight's result in the slot map, unless the slot was invalidated
/// or drained meanwhile, in which case a fresh handle is closed here.
async fn settle<C: TenantConnection>(
    slots: &SlotMap<C>,
    database_name: &str,
    flight: u64,
    result: Result<C, InitFailure>,
) -> FlightOutcome<C> {
    let mut map = slots.write().await;
    let owned = matches!(
        map.get(database_name),
        Some(Slot::Pending { flight: current, .. }) if *current == flight
    );

    match result {
        Ok(connection) if owned => {
            map.insert(
                database_name.to_string(),
                Slot::Ready {
                    connection: connection.clone(),
                },
            );
            info!(database = database_name, "Cached tenant database pool");
            FlightOutcome::Ready(connection)
        }
        Ok(connection) => {
            drop(map);
            connection.close().await;
            debug!(database = database_name, flight, "Closed pool of a superseded flight");
            FlightOutcome::Superseded
        }
        Err(failure) => {
            if owned {
                map.remove(database_name);
            }
            FlightOutcome::Failed(failure)
        }
    }
}

/// Drop a failed flight's slot so the next caller starts clean.
async fn discard<C>(slots: &SlotMap<C>, database_name: &str, flight: u64) {
    let mut map = slots.write().await;
    if matches!(
        map.get(database_name),
        Some(Slot::Pending { flight: current, .. }) if *current == flight
    ) {
        map.remove(database_name);
    }
}

/// Registry check, parameter construction, connect and liveness ping.
async fn establish<K: Connector>(
    connector: &K,
    registry: &dyn TenantRegistry,
    base_url: &Url,
    database_name: &str,
) -> Result<K::Connection, InitFailure> {
    let organisation = registry
        .find_by_database(database_name)
        .await
        .map_err(|e| {
            error!(database = database_name, "Tenant registry lookup failed: {}", e);
            InitFailure::Unavailable(format!("registry lookup failed: {}", e))
        })?;

    let organisation = match organisation {
        Some(org) if org.is_active() => org,
        Some(org) => {
            warn!(
                database = database_name,
                organisation_id = org.id,
                status = ?org.status,
                "Organisation is not active"
            );
            return Err(InitFailure::NotFound);
        }
        None => {
            warn!(database = database_name, "No organisation registered for database");
            return Err(InitFailure::NotFound);
        }
    };

    let params = ConnectionParams::for_database(base_url, database_name, organisation.host.as_deref())
        .map_err(|e| InitFailure::Unavailable(e.to_string()))?;

    let connection = connector.connect(&params).await.map_err(|e| {
        error!(database = database_name, "Failed to connect to tenant database: {}", e);
        InitFailure::Unavailable(e.to_string())
    })?;

    if let Err(e) = connection.ping().await {
        error!(database = database_name, "Tenant database failed liveness check: {}", e);
        connection.close().await;
        return Err(InitFailure::Unavailable(e.to_string()));
    }

    Ok(connection)
}
