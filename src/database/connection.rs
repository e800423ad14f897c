//! Connection seam between the pool cache and the physical databases.
//!
//! `Connector` opens a handle for one organisation database; `TenantConnection`
//! is what the façade runs statements against. Production uses `PgConnector`
//! and `sqlx::PgPool`; tests plug in their own implementations.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::types::{BigDecimal, Uuid};
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};
use tracing::{debug, info};
use url::Url;

use crate::database::manager::DatabaseError;
use crate::database::statement::{Row, Rows, Statement};

/// Parameters needed to open one organisation database.
///
/// Host and credentials are shared by every tenant; only the database name
/// (and optionally the host) differs.
#[derive(Clone)]
pub struct ConnectionParams {
    url: Url,
    database_name: String,
}

impl ConnectionParams {
    /// Derive parameters from the base URL by swapping its path for
    /// `database_name`, keeping credentials and query options intact.
    pub fn for_database(
        base: &Url,
        database_name: &str,
        host: Option<&str>,
    ) -> Result<Self, DatabaseError> {
        let mut url = base.clone();
        url.set_path(&format!("/{}", database_name));
        if let Some(host) = host {
            url.set_host(Some(host))
                .map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        }
        Ok(Self {
            url,
            database_name: database_name.to_string(),
        })
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn host(&self) -> Option<&str> {
        self.url.host_str()
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

// The URL carries the shared password, keep it out of logs.
impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.url.host_str())
            .field("port", &self.url.port())
            .field("user", &self.url.username())
            .field("database_name", &self.database_name)
            .finish()
    }
}

/// A live handle to one organisation database, shared by every request for
/// that tenant. Implementations must be cheap to clone and safe for
/// concurrent use.
#[async_trait]
pub trait TenantConnection: Clone + Send + Sync + 'static {
    /// Round trip proving the handle is usable.
    async fn ping(&self) -> Result<(), DatabaseError>;

    async fn fetch_rows(&self, statement: &Statement) -> Result<Rows, DatabaseError>;

    /// Returns the number of affected rows.
    async fn execute(&self, statement: &Statement) -> Result<u64, DatabaseError>;

    /// Stop handing out new connections. Work already in flight may finish.
    async fn close(&self);
}

/// Opens tenant connections from connection parameters.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: TenantConnection;

    async fn connect(&self, params: &ConnectionParams) -> Result<Self::Connection, DatabaseError>;
}

/// Sizing applied to every tenant pool.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Opens one `PgPool` per organisation database.
#[derive(Debug, Clone, Default)]
pub struct PgConnector {
    options: PoolOptions,
}

impl PgConnector {
    pub fn new(options: PoolOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Connection = PgPool;

    async fn connect(&self, params: &ConnectionParams) -> Result<PgPool, DatabaseError> {
        debug!(?params, "Opening tenant pool");

        let pool = PgPoolOptions::new()
            .max_connections(self.options.max_connections)
            .min_connections(self.options.min_connections)
            .acquire_timeout(self.options.acquire_timeout)
            .idle_timeout(self.options.idle_timeout)
            .connect(params.url())
            .await?;

        info!(
            database = params.database_name(),
            max_connections = self.options.max_connections,
            "Created database pool"
        );
        Ok(pool)
    }
}

#[async_trait]
impl TenantConnection for PgPool {
    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(self).await?;
        Ok(())
    }

    async fn fetch_rows(&self, statement: &Statement) -> Result<Rows, DatabaseError> {
        let mut q = sqlx::query(statement.sql());
        for p in statement.params() {
            q = bind_param(q, p);
        }
        let rows = q.fetch_all(self).await?;
        rows.iter().map(row_to_json).collect()
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, DatabaseError> {
        let mut q = sqlx::query(statement.sql());
        for p in statement.params() {
            q = bind_param(q, p);
        }
        let result = q.execute(self).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        PgPool::close(self).await;
    }
}

fn row_to_json(row: &PgRow) -> Result<Row, DatabaseError> {
    let mut map = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_column(row, i)?);
    }
    Ok(map)
}

/// How a PostgreSQL column type is rendered as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// NUMERIC/DECIMAL, rendered as a string to keep every digit.
    Numeric,
    Text,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    TextArray,
    Int4Array,
    Int8Array,
    UuidArray,
}

fn column_kind(type_name: &str) -> Option<ColumnKind> {
    let kind = match type_name {
        "BOOL" => ColumnKind::Bool,
        "INT2" => ColumnKind::Int2,
        "INT4" => ColumnKind::Int4,
        "INT8" => ColumnKind::Int8,
        "FLOAT4" => ColumnKind::Float4,
        "FLOAT8" => ColumnKind::Float8,
        "NUMERIC" => ColumnKind::Numeric,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ColumnKind::Text,
        "JSON" | "JSONB" => ColumnKind::Json,
        "UUID" => ColumnKind::Uuid,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "TIMESTAMPTZ" => ColumnKind::TimestampTz,
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => ColumnKind::TextArray,
        "INT4[]" => ColumnKind::Int4Array,
        "INT8[]" => ColumnKind::Int8Array,
        "UUID[]" => ColumnKind::UuidArray,
        _ => return None,
    };
    Some(kind)
}

fn unsupported_column(column: &str, type_name: &str) -> DatabaseError {
    DatabaseError::Decode(format!(
        "column '{}' has unsupported type {}",
        column, type_name
    ))
}

/// Decode one column into JSON according to its declared type. Types with no
/// JSON rendering are an error, never a silent null.
fn decode_column(row: &PgRow, i: usize) -> Result<Value, DatabaseError> {
    let column = row.column(i);
    let type_name = column.type_info().name();
    let kind = column_kind(type_name).ok_or_else(|| unsupported_column(column.name(), type_name))?;

    fn json<T: Into<Value>>(v: Option<T>) -> Value {
        v.map(Into::into).unwrap_or(Value::Null)
    }

    let value = match kind {
        ColumnKind::Bool => json(row.try_get::<Option<bool>, _>(i)?),
        ColumnKind::Int2 => json(row.try_get::<Option<i16>, _>(i)?),
        ColumnKind::Int4 => json(row.try_get::<Option<i32>, _>(i)?),
        ColumnKind::Int8 => json(row.try_get::<Option<i64>, _>(i)?),
        ColumnKind::Float4 => json(row.try_get::<Option<f32>, _>(i)?.map(f64::from)),
        ColumnKind::Float8 => json(row.try_get::<Option<f64>, _>(i)?),
        ColumnKind::Numeric => json(
            row.try_get::<Option<BigDecimal>, _>(i)?
                .map(|d| d.to_string()),
        ),
        ColumnKind::Text => json(row.try_get::<Option<String>, _>(i)?),
        ColumnKind::Json => row.try_get::<Option<Value>, _>(i)?.unwrap_or(Value::Null),
        ColumnKind::Uuid => json(row.try_get::<Option<Uuid>, _>(i)?.map(|u| u.to_string())),
        ColumnKind::Date => json(
            row.try_get::<Option<chrono::NaiveDate>, _>(i)?
                .map(|t| t.to_string()),
        ),
        ColumnKind::Time => json(
            row.try_get::<Option<chrono::NaiveTime>, _>(i)?
                .map(|t| t.to_string()),
        ),
        ColumnKind::Timestamp => json(
            row.try_get::<Option<chrono::NaiveDateTime>, _>(i)?
                .map(|t| t.to_string()),
        ),
        ColumnKind::TimestampTz => json(
            row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i)?
                .map(|t| t.to_rfc3339()),
        ),
        ColumnKind::TextArray => json(row.try_get::<Option<Vec<String>>, _>(i)?),
        ColumnKind::Int4Array => json(row.try_get::<Option<Vec<i32>>, _>(i)?),
        ColumnKind::Int8Array => json(row.try_get::<Option<Vec<i64>>, _>(i)?),
        ColumnKind::UuidArray => json(
            row.try_get::<Option<Vec<Uuid>>, _>(i)?
                .map(|ids| ids.iter().map(Uuid::to_string).collect::<Vec<_>>()),
        ),
    };
    Ok(value)
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        // Arrays and objects travel as jsonb.
        Value::Array(_) | Value::Object(_) => q.bind(v),
    }
}
