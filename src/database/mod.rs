pub mod connection;
pub mod manager;
pub mod models;
pub mod registry;
pub mod repository;
pub mod statement;

pub use connection::{ConnectionParams, Connector, PgConnector, PoolOptions, TenantConnection};
pub use manager::{DatabaseError, DatabaseManager, ManagerSettings};
pub use models::{Organisation, OrganisationStatus};
pub use registry::{InMemoryRegistry, PgTenantRegistry, TenantRegistry};
pub use repository::{Entity, Repository};
pub use statement::{Row, Rows, Statement};
