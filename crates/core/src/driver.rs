use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::query_job::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("driver not found: {0}")]
    UnknownDriver(String),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("failed to load schemas: {0}")]
    Schema(String),
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("operation cancelled")]
    Cancelled,
    #[error("session is closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

/// A single scalar value as returned by a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::UInt(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
    pub row_count: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaInfo {
    pub name: String,
    pub tables: Vec<TableInfo>,
}

#[async_trait]
pub trait DbSession: fmt::Debug + Send + Sync {
    /// Runs `sql`, returning at most `limit` rows starting at `offset`.
    /// Implementations check `cancel` between rows.
    async fn query(
        &self,
        sql: &str,
        limit: usize,
        offset: usize,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, DriverError>;

    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>, DriverError>;

    async fn ping(&self) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;

    fn set_timeout(&self, timeout: Duration);
}

#[async_trait]
pub trait DbDriver: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn default_port(&self) -> u16;

    async fn connect(&self, config: &ConnConfig) -> Result<Arc<dyn DbSession>, DriverError>;
}

/// Drivers available to the application, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<String, Arc<dyn DbDriver>>,
}

impl DriverRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, driver: Arc<dyn DbDriver>) {
        self.drivers.insert(driver.name().to_string(), driver);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn DbDriver>, DriverError> {
        self.drivers
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::UnknownDriver(name.to_string()))
    }

    /// Registered names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.drivers.keys().cloned().collect()
    }

    #[must_use]
    pub fn default_port(&self, name: &str) -> Option<u16> {
        self.drivers.get(name).map(|driver| driver.default_port())
    }
}
