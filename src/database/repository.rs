use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::database::connection::TenantConnection;
use crate::database::manager::DatabaseError;
use crate::database::statement::{is_valid_identifier, quote_identifier, Row, Statement};

/// A record kind stored in every organisation database.
pub trait Entity: DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;
    const PRIMARY_KEY: &'static str = "id";
}

/// Typed access to one entity table on one tenant's connection.
pub struct Repository<T, C> {
    table: String,
    primary_key: String,
    connection: C,
    _phantom: std::marker::PhantomData<fn() -> T>,
}

impl<T, C> Repository<T, C>
where
    T: Entity,
    C: TenantConnection,
{
    pub fn new(connection: C) -> Result<Self, DatabaseError> {
        for name in [T::TABLE, T::PRIMARY_KEY] {
            if !is_valid_identifier(name) {
                return Err(DatabaseError::InvalidIdentifier(name.to_string()));
            }
        }
        Ok(Self {
            table: quote_identifier(T::TABLE),
            primary_key: quote_identifier(T::PRIMARY_KEY),
            connection,
            _phantom: std::marker::PhantomData,
        })
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub async fn select_any(&self, limit: Option<i64>) -> Result<Vec<T>, DatabaseError> {
        let statement = match limit {
            Some(limit) => Statement::trusted(format!(
                "SELECT * FROM {} ORDER BY {} LIMIT $1",
                self.table, self.primary_key
            ))
            .bind(limit),
            None => Statement::trusted(format!(
                "SELECT * FROM {} ORDER BY {}",
                self.table, self.primary_key
            )),
        };
        self.fetch(statement).await
    }

    pub async fn select_one(&self, id: impl Into<Value>) -> Result<Option<T>, DatabaseError> {
        let statement = Statement::trusted(format!(
            "SELECT * FROM {} WHERE {} = $1",
            self.table, self.primary_key
        ))
        .bind(id);
        Ok(self.fetch(statement).await?.into_iter().next())
    }

    /// Rows where `column` equals `value`. The column name is checked, the
    /// value is bound.
    pub async fn select_by(
        &self,
        column: &str,
        value: impl Into<Value>,
    ) -> Result<Vec<T>, DatabaseError> {
        if !is_valid_identifier(column) {
            return Err(DatabaseError::InvalidIdentifier(column.to_string()));
        }
        let statement = Statement::trusted(format!(
            "SELECT * FROM {} WHERE {} = $1 ORDER BY {}",
            self.table,
            quote_identifier(column),
            self.primary_key
        ))
        .bind(value);
        self.fetch(statement).await
    }

    pub async fn count(&self) -> Result<i64, DatabaseError> {
        let statement = Statement::trusted(format!("SELECT COUNT(*) AS count FROM {}", self.table));
        let rows = self.connection.fetch_rows(&statement).await?;
        rows.first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_i64)
            .ok_or_else(|| DatabaseError::Decode("count query returned no value".to_string()))
    }

    async fn fetch(&self, statement: Statement) -> Result<Vec<T>, DatabaseError> {
        statement.validate()?;
        let rows = self.connection.fetch_rows(&statement).await?;
        rows.into_iter().map(decode_row).collect()
    }
}

fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T, DatabaseError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| DatabaseError::Decode(e.to_string()))
}
