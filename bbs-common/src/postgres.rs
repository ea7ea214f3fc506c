use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as _, TypeInfo};
use tracing::{info, info_span, Instrument};

use crate::database::{
    ConnectMode, ConnectionOptions, ConnectionSlot, ConnectionState, Database, DatabaseError,
    ExecResult, Row, Value,
};
use crate::shutdown::ShutdownSignal;
use crate::supervision::{establish, HealthMonitor};

/// [`Database`] backed by a sqlx Postgres pool.
///
/// The pool is opened lazily, so opening it proves nothing: `connect` always
/// follows it with a probe.
pub struct PgDatabase {
    connection_string: String,
    addr: String,
    mode: ConnectMode,
    monitor: HealthMonitor,
    max_connections: u32,
    acquire_timeout: Duration,
    slot: ConnectionSlot<PgPool>,
}

impl PgDatabase {
    pub fn new(
        options: &ConnectionOptions,
        mode: ConnectMode,
        monitor: HealthMonitor,
    ) -> Result<Self, DatabaseError> {
        let connection_string = options
            .connection_string()
            .map_err(|error| DatabaseError::Transport(sqlx::Error::Configuration(error.into())))?;

        Ok(Self {
            connection_string,
            addr: options.addr.clone(),
            mode,
            monitor,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            slot: ConnectionSlot::new(),
        })
    }

    pub fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Bounds how long a probe or statement waits for a connection.
    pub fn acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    fn open(&self) -> Result<PgPool, DatabaseError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy(&self.connection_string)?;
        Ok(pool)
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn connect(&self, shutdown: &ShutdownSignal) -> Result<(), DatabaseError> {
        let pool = self.open()?;
        establish(
            self,
            &self.slot,
            pool,
            self.mode,
            &self.monitor,
            shutdown,
            |pool: PgPool| async move { pool.close().await },
        )
        .instrument(info_span!("database", addr = %self.addr))
        .await
    }

    async fn query(&self, statement: &str, args: &[Value]) -> Result<Vec<Row>, DatabaseError> {
        let pool = self.slot.get()?;
        let rows = bind_all(sqlx::query(statement), args)
            .fetch_all(&pool)
            .await?;
        rows.iter().map(decode_row).collect()
    }

    async fn execute(
        &self,
        statement: &str,
        args: &[Value],
    ) -> Result<ExecResult, DatabaseError> {
        let pool = self.slot.get()?;
        let result = bind_all(sqlx::query(statement), args)
            .execute(&pool)
            .await?;
        Ok(ExecResult {
            rows_affected: result.rows_affected(),
        })
    }

    async fn disconnect(&self) -> Result<(), DatabaseError> {
        let pool = self.slot.take()?;
        pool.close().await;
        info!(addr = %self.addr, "disconnected from the database");
        Ok(())
    }

    async fn probe(&self) -> Result<(), DatabaseError> {
        let pool = self.slot.get()?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.slot.state()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(None::<String>),
            Value::Bool(value) => query.bind(*value),
            Value::Int(value) => query.bind(*value),
            Value::Float(value) => query.bind(*value),
            Value::Text(value) => query.bind(value.as_str()),
        };
    }
    query
}

/// Decode a row column by column. Columns of types without a dedicated variant
/// are read as text.
fn decode_row(row: &PgRow) -> Result<Row, DatabaseError> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
            "INT2" => row
                .try_get::<Option<i16>, _>(index)?
                .map(|v| Value::Int(v.into())),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)?
                .map(|v| Value::Int(v.into())),
            "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(index)?
                .map(|v| Value::Float(v.into())),
            "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::Float),
            _ => row.try_get::<Option<String>, _>(index)?.map(Value::Text),
        };
        decoded.push(column.name(), value);
    }
    Ok(decoded)
}
