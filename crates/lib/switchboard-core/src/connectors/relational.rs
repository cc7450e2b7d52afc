//! PostgreSQL connector.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{
    Column as _,
    Decode,
    Executor as _,
    Postgres,
    Row as _,
    Statement as _,
    Transaction,
    Type,
    TypeInfo as _,
    ValueRef as _,
};
use tracing::warn;

use crate::connectors::{BackendFuture, Connector, Probe};
use crate::fault::{BackendId, Fault};
use crate::value::{Row, Value, render_row_with};

/// Connection settings for PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
        }
    }
}

/// Result of one relational statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementOutcome {
    Rows { columns: Vec<String>, rows: Vec<Row> },
    Completed { rows_affected: u64 },
}

impl StatementOutcome {
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Completed { rows_affected } => {
                format!("Statement executed successfully; {rows_affected} row(s) affected.")
            }
            Self::Rows { rows, .. } if rows.is_empty() => "Query returned 0 row(s).".to_string(),
            Self::Rows { columns, rows } => {
                let lines = rows
                    .iter()
                    .map(|row| render_row_with(row, columns))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("Query returned {} row(s):\n{lines}", rows.len())
            }
        }
    }
}

/// Source of per-invocation transactions on a shared handle.
pub trait RelationalSession: Probe {
    fn begin(&self) -> BackendFuture<'_, Box<dyn RelationalTransaction>>;
}

/// One transaction, used by exactly one invocation.
pub trait RelationalTransaction: Send {
    /// Result column names the statement would produce, empty for none.
    fn columns<'a>(&'a mut self, statement: &'a str) -> BackendFuture<'a, Vec<String>>;
    fn fetch<'a>(&'a mut self, statement: &'a str) -> BackendFuture<'a, Vec<Row>>;
    fn execute<'a>(&'a mut self, statement: &'a str) -> BackendFuture<'a, u64>;
    fn commit(self: Box<Self>) -> BackendFuture<'static, ()>;
    fn rollback(self: Box<Self>) -> BackendFuture<'static, ()>;
}

/// `sqlx` pool backed session source.
pub struct PostgresSession {
    pool: PgPool,
}

impl PostgresSession {
    /// Connects the pool.
    ///
    /// # Errors
    /// Returns a fault if the first connection cannot be established.
    pub async fn open(settings: &PostgresSettings, timeout: Duration) -> Result<Self, Fault> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(&settings.user)
            .password(&settings.password)
            .database(&settings.database);
        let pool = PgPoolOptions::new()
            .acquire_timeout(timeout)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }
}

impl Probe for PostgresSession {
    fn probe(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }
}

impl RelationalSession for PostgresSession {
    fn begin(&self) -> BackendFuture<'_, Box<dyn RelationalTransaction>> {
        Box::pin(async move {
            let tx = self.pool.begin().await?;
            Ok(Box::new(PostgresTransaction { tx }) as Box<dyn RelationalTransaction>)
        })
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl RelationalTransaction for PostgresTransaction {
    fn columns<'a>(&'a mut self, statement: &'a str) -> BackendFuture<'a, Vec<String>> {
        Box::pin(async move {
            let prepared = (&mut *self.tx).prepare(statement).await?;
            Ok(prepared
                .columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect())
        })
    }

    fn fetch<'a>(&'a mut self, statement: &'a str) -> BackendFuture<'a, Vec<Row>> {
        Box::pin(async move {
            let rows = sqlx::query(statement).fetch_all(&mut *self.tx).await?;
            Ok(rows.iter().map(decode_row).collect())
        })
    }

    fn execute<'a>(&'a mut self, statement: &'a str) -> BackendFuture<'a, u64> {
        Box::pin(async move {
            let result = sqlx::query(statement).execute(&mut *self.tx).await?;
            Ok(result.rows_affected())
        })
    }

    fn commit(self: Box<Self>) -> BackendFuture<'static, ()> {
        Box::pin(async move {
            self.tx.commit().await?;
            Ok(())
        })
    }

    fn rollback(self: Box<Self>) -> BackendFuture<'static, ()> {
        Box::pin(async move {
            self.tx.rollback().await?;
            Ok(())
        })
    }
}

fn decode_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .map(|column| {
            let value = decode_column(row, column.ordinal(), column.type_info().name());
            (column.name().to_string(), value)
        })
        .collect()
}

/// Scalar Postgres types the decoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Json,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Bytes,
    Text,
}

/// Decoding strategy for one result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Scalar(Scalar),
    Array(Scalar),
    /// Decoded as text if the driver allows it.
    Other,
}

fn scalar_kind(type_name: &str) -> Option<Scalar> {
    let scalar = match type_name {
        "BOOL" => Scalar::Bool,
        "INT2" => Scalar::Int2,
        "INT4" => Scalar::Int4,
        "INT8" => Scalar::Int8,
        "FLOAT4" => Scalar::Float4,
        "FLOAT8" => Scalar::Float8,
        "NUMERIC" => Scalar::Numeric,
        "JSON" | "JSONB" => Scalar::Json,
        "UUID" => Scalar::Uuid,
        "DATE" => Scalar::Date,
        "TIME" => Scalar::Time,
        "TIMESTAMP" => Scalar::Timestamp,
        "TIMESTAMPTZ" => Scalar::TimestampTz,
        "INTERVAL" => Scalar::Interval,
        "BYTEA" => Scalar::Bytes,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" => Scalar::Text,
        _ => return None,
    };
    Some(scalar)
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name.strip_suffix("[]") {
        Some(element) => scalar_kind(element).map_or(ColumnKind::Other, ColumnKind::Array),
        None => scalar_kind(type_name).map_or(ColumnKind::Other, ColumnKind::Scalar),
    }
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Value {
    match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(_) => {}
        Err(_) => return Value::Null,
    }

    let decoded = match column_kind(type_name) {
        ColumnKind::Scalar(scalar) => decode_scalar(row, index, scalar),
        ColumnKind::Array(scalar) => decode_array(row, index, scalar),
        ColumnKind::Other => decode_as(row, index, Value::Text),
    };
    decoded.unwrap_or_else(|_| Value::Text(format!("<{type_name}>")))
}

fn decode_as<T>(row: &PgRow, index: usize, convert: impl FnOnce(T) -> Value) -> Result<Value, sqlx::Error>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<T, _>(index).map(convert)
}

fn decode_list<T>(row: &PgRow, index: usize, convert: impl Fn(T) -> Value) -> Result<Value, sqlx::Error>
where
    Vec<Option<T>>: for<'r> Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get::<Vec<Option<T>>, _>(index).map(|items| {
        Value::List(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, &convert))
                .collect(),
        )
    })
}

fn decode_scalar(row: &PgRow, index: usize, scalar: Scalar) -> Result<Value, sqlx::Error> {
    match scalar {
        Scalar::Bool => decode_as(row, index, Value::Bool),
        Scalar::Int2 => decode_as(row, index, |v: i16| Value::Int(v.into())),
        Scalar::Int4 => decode_as(row, index, |v: i32| Value::Int(v.into())),
        Scalar::Int8 => decode_as(row, index, Value::Int),
        Scalar::Float4 => decode_as(row, index, |v: f32| Value::Float(v.into())),
        Scalar::Float8 => decode_as(row, index, Value::Float),
        Scalar::Numeric => decode_as(row, index, numeric),
        Scalar::Json => decode_as::<serde_json::Value>(row, index, Value::from),
        Scalar::Uuid => decode_as(row, index, |v: uuid::Uuid| Value::Text(v.to_string())),
        Scalar::Date => decode_as(row, index, |v: NaiveDate| Value::Text(v.to_string())),
        Scalar::Time => decode_as(row, index, |v: NaiveTime| Value::Text(v.to_string())),
        Scalar::Timestamp => decode_as(row, index, |v: NaiveDateTime| Value::Text(v.to_string())),
        Scalar::TimestampTz => decode_as(row, index, |v: DateTime<Utc>| Value::Text(v.to_rfc3339())),
        Scalar::Interval => decode_as(row, index, |v: PgInterval| {
            Value::Text(format_interval(v.months, v.days, v.microseconds))
        }),
        Scalar::Bytes => decode_as(row, index, |v: Vec<u8>| Value::Text(format_bytes(&v))),
        Scalar::Text => decode_as(row, index, Value::Text),
    }
}

fn decode_array(row: &PgRow, index: usize, scalar: Scalar) -> Result<Value, sqlx::Error> {
    match scalar {
        Scalar::Bool => decode_list(row, index, Value::Bool),
        Scalar::Int2 => decode_list(row, index, |v: i16| Value::Int(v.into())),
        Scalar::Int4 => decode_list(row, index, |v: i32| Value::Int(v.into())),
        Scalar::Int8 => decode_list(row, index, Value::Int),
        Scalar::Float4 => decode_list(row, index, |v: f32| Value::Float(v.into())),
        Scalar::Float8 => decode_list(row, index, Value::Float),
        Scalar::Numeric => decode_list(row, index, numeric),
        Scalar::Uuid => decode_list(row, index, |v: uuid::Uuid| Value::Text(v.to_string())),
        Scalar::Date => decode_list(row, index, |v: NaiveDate| Value::Text(v.to_string())),
        Scalar::Time => decode_list(row, index, |v: NaiveTime| Value::Text(v.to_string())),
        Scalar::Timestamp => decode_list(row, index, |v: NaiveDateTime| Value::Text(v.to_string())),
        Scalar::TimestampTz => decode_list(row, index, |v: DateTime<Utc>| Value::Text(v.to_rfc3339())),
        Scalar::Interval => decode_list(row, index, |v: PgInterval| {
            Value::Text(format_interval(v.months, v.days, v.microseconds))
        }),
        Scalar::Text => decode_list(row, index, Value::Text),
        Scalar::Json => decode_list::<serde_json::Value>(row, index, Value::from),
        Scalar::Bytes => decode_list(row, index, |v: Vec<u8>| Value::Text(format_bytes(&v))),
    }
}

fn numeric(value: BigDecimal) -> Value {
    Value::Number(value.to_string())
}

/// Formats an interval the way `psql` prints it, e.g. `1 year 2 mons 3 days 04:05:06`.
fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    fn unit(parts: &mut Vec<String>, amount: i64, singular: &str, plural: &str) {
        if amount != 0 {
            let name = if amount.abs() == 1 { singular } else { plural };
            parts.push(format!("{amount} {name}"));
        }
    }

    let mut parts = Vec::new();
    unit(&mut parts, i64::from(months / 12), "year", "years");
    unit(&mut parts, i64::from(months % 12), "mon", "mons");
    unit(&mut parts, i64::from(days), "day", "days");

    if microseconds != 0 || parts.is_empty() {
        let sign = if microseconds < 0 { "-" } else { "" };
        let total = microseconds.unsigned_abs();
        let seconds = total / 1_000_000;
        let fraction = total % 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            seconds / 3600,
            seconds / 60 % 60,
            seconds % 60
        );
        if fraction > 0 {
            let digits = format!("{fraction:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    parts.join(" ")
}

/// Hex form used by Postgres for `bytea`.
fn format_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Connector for SQL statements.
#[derive(Clone)]
pub struct RelationalConnector {
    inner: Connector<dyn RelationalSession>,
}

impl RelationalConnector {
    /// Connects and probes the pool; failures leave the connector unavailable.
    pub async fn connect(settings: &PostgresSettings, timeout: Duration) -> Self {
        let opened = PostgresSession::open(settings, timeout)
            .await
            .map(|session| Arc::new(session) as Arc<dyn RelationalSession>);
        Self::establish(opened, timeout).await
    }

    /// Probes an already opened session.
    pub async fn establish(
        opened: Result<Arc<dyn RelationalSession>, Fault>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Connector::establish(BackendId::PostgreSql, opened, timeout).await,
        }
    }

    #[must_use]
    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            inner: Connector::unavailable(BackendId::PostgreSql, detail),
        }
    }

    #[must_use]
    pub const fn connector(&self) -> &Connector<dyn RelationalSession> {
        &self.inner
    }

    /// Runs one statement in its own transaction.
    ///
    /// Statements without result columns are executed and committed. A fault
    /// at any step rolls the transaction back so the shared handle stays usable.
    ///
    /// # Errors
    /// Returns `BackendUnavailable` when not connected, otherwise the driver fault.
    pub async fn run_statement(&self, statement: &str) -> Result<StatementOutcome, Fault> {
        let session = self.inner.handle()?;
        let mut tx = session.begin().await?;
        match run_in_transaction(tx.as_mut(), statement).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(fault) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "rollback after failed statement also failed");
                }
                Err(fault)
            }
        }
    }
}

async fn run_in_transaction(
    tx: &mut dyn RelationalTransaction,
    statement: &str,
) -> Result<StatementOutcome, Fault> {
    let columns = tx.columns(statement).await?;
    if columns.is_empty() {
        let rows_affected = tx.execute(statement).await?;
        return Ok(StatementOutcome::Completed { rows_affected });
    }
    let rows = tx.fetch(statement).await?;
    Ok(StatementOutcome::Rows { columns, rows })
}
