use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Pool, Row, Value};
use quarry_core::driver::{
    Cell, ConnConfig, DbDriver, DbSession, DriverError, QueryResult, SchemaInfo, TableInfo,
};
use quarry_core::query_job::CancellationToken;

pub const DRIVER_NAME: &str = "mysql";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_SCHEMAS: [&str; 4] = ["information_schema", "mysql", "performance_schema", "sys"];

#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDriver;

#[async_trait]
impl DbDriver for MysqlDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn default_port(&self) -> u16 {
        DEFAULT_PORT
    }

    async fn connect(&self, config: &ConnConfig) -> Result<Arc<dyn DbSession>, DriverError> {
        let pool = Pool::new(opts_from_config(config));
        let verify = async {
            let mut conn = pool.get_conn().await.map_err(to_connect_error)?;
            conn.ping().await.map_err(to_connect_error)
        };
        let verified = tokio::time::timeout(DEFAULT_TIMEOUT, verify).await;
        match verified {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = pool.disconnect().await;
                return Err(err);
            }
            Err(_) => {
                let _ = pool.disconnect().await;
                return Err(DriverError::Timeout(DEFAULT_TIMEOUT));
            }
        }

        info!("connected to mysql at {}:{}", config.host, config.port);
        Ok(Arc::new(MysqlSession::new(pool)))
    }
}

/// A pooled MySQL session. Every operation is bounded by the session timeout.
#[derive(Debug)]
pub struct MysqlSession {
    pool: Pool,
    timeout_ms: AtomicU64,
    closed: AtomicBool,
}

impl MysqlSession {
    #[must_use]
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            timeout_ms: AtomicU64::new(duration_to_millis(DEFAULT_TIMEOUT)),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::SeqCst))
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DriverError::Closed)
        } else {
            Ok(())
        }
    }

    async fn within<T>(
        &self,
        operation: impl Future<Output = Result<T, DriverError>>,
    ) -> Result<T, DriverError> {
        self.ensure_open()?;
        let limit = self.timeout();
        tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| DriverError::Timeout(limit))?
    }

    async fn fetch_page(
        &self,
        sql: &str,
        limit: usize,
        offset: usize,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, DriverError> {
        let mut conn = self.pool.get_conn().await.map_err(to_query_error)?;
        let mut result = conn.query_iter(sql).await.map_err(to_query_error)?;
        let columns = result
            .columns_ref()
            .iter()
            .map(|column| column.name_str().into_owned())
            .collect::<Vec<_>>();

        if columns.is_empty() {
            let affected = result.affected_rows();
            result.drop_result().await.map_err(to_query_error)?;
            return Ok(QueryResult {
                columns,
                rows: Vec::new(),
                row_count: usize::try_from(affected).unwrap_or(usize::MAX),
                has_more: false,
            });
        }

        let mut rows = Vec::new();
        let mut skipped = 0;
        let mut has_more = false;
        while let Some(row) = result.next().await.map_err(to_query_error)? {
            if cancel.is_cancelled() {
                return Err(DriverError::Cancelled);
            }
            if skipped < offset {
                skipped += 1;
                continue;
            }
            if rows.len() == limit {
                has_more = true;
                break;
            }
            rows.push(row_to_cells(&row));
        }

        debug!("fetched {} row(s) at offset {offset}", rows.len());
        Ok(QueryResult {
            row_count: rows.len(),
            columns,
            rows,
            has_more,
        })
    }

    async fn fetch_schemas(&self) -> Result<Vec<SchemaInfo>, DriverError> {
        let mut conn = self.pool.get_conn().await.map_err(to_schema_error)?;
        let rows = conn
            .query_map(
                "SELECT s.SCHEMA_NAME, t.TABLE_NAME \
                 FROM information_schema.SCHEMATA s \
                 LEFT JOIN information_schema.TABLES t \
                   ON t.TABLE_SCHEMA = s.SCHEMA_NAME AND t.TABLE_TYPE = 'BASE TABLE' \
                 ORDER BY s.SCHEMA_NAME, t.TABLE_NAME",
                |(schema, table): (String, Option<String>)| (schema, table),
            )
            .await
            .map_err(to_schema_error)?;
        Ok(group_schema_rows(rows))
    }
}

#[async_trait]
impl DbSession for MysqlSession {
    async fn query(
        &self,
        sql: &str,
        limit: usize,
        offset: usize,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, DriverError> {
        self.within(self.fetch_page(sql, limit, offset, cancel)).await
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>, DriverError> {
        self.within(self.fetch_schemas()).await
    }

    async fn ping(&self) -> Result<(), DriverError> {
        self.within(async {
            let mut conn = self.pool.get_conn().await.map_err(to_connect_error)?;
            conn.ping().await.map_err(to_connect_error)
        })
        .await
    }

    async fn close(&self) -> Result<(), DriverError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|err| DriverError::Connect(err.to_string()))
    }

    fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(duration_to_millis(timeout), Ordering::SeqCst);
    }
}

fn opts_from_config(config: &ConnConfig) -> OptsBuilder {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port);

    if let Some(username) = non_empty(&config.username) {
        builder = builder.user(Some(username.to_string()));
    }
    if !config.password.is_empty() {
        builder = builder.pass(Some(config.password.clone()));
    }
    if let Some(database) = non_empty(&config.database) {
        builder = builder.db_name(Some(database.to_string()));
    }

    builder
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Folds `(schema, table)` pairs, already sorted by schema, into schema
/// entries, dropping the server's own schemas.
fn group_schema_rows(rows: Vec<(String, Option<String>)>) -> Vec<SchemaInfo> {
    let mut schemas: Vec<SchemaInfo> = Vec::new();
    for (schema, table) in rows {
        if SYSTEM_SCHEMAS.contains(&schema.as_str()) {
            continue;
        }
        if schemas.last().map(|last| last.name.as_str()) != Some(schema.as_str()) {
            schemas.push(SchemaInfo {
                name: schema.clone(),
                tables: Vec::new(),
            });
        }
        if let (Some(table), Some(entry)) = (table, schemas.last_mut()) {
            entry.tables.push(TableInfo {
                schema,
                name: table,
            });
        }
    }
    schemas
}

fn row_to_cells(row: &Row) -> Vec<Cell> {
    (0..row.len())
        .map(|index| row.as_ref(index).map_or(Cell::Null, mysql_value_to_cell))
        .collect()
}

fn mysql_value_to_cell(value: &Value) -> Cell {
    match value {
        Value::NULL => Cell::Null,
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Cell::Text(text.to_string()),
            Err(_) => Cell::Bytes(bytes.clone()),
        },
        Value::Int(value) => Cell::Int(*value),
        Value::UInt(value) => Cell::UInt(*value),
        Value::Float(value) => Cell::Float(f64::from(*value)),
        Value::Double(value) => Cell::Float(*value),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let date = format!("{year:04}-{month:02}-{day:02}");
            Cell::Text(if (*hour, *minute, *second, *micros) == (0, 0, 0, 0) {
                date
            } else if *micros == 0 {
                format!("{date} {hour:02}:{minute:02}:{second:02}")
            } else {
                format!("{date} {hour:02}:{minute:02}:{second:02}.{micros:06}")
            })
        }
        Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if *is_negative { "-" } else { "" };
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            Cell::Text(if *micros == 0 {
                format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}")
            } else {
                format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}.{micros:06}")
            })
        }
    }
}

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn to_connect_error(error: mysql_async::Error) -> DriverError {
    DriverError::Connect(error.to_string())
}

fn to_schema_error(error: mysql_async::Error) -> DriverError {
    DriverError::Schema(error.to_string())
}

fn to_query_error(error: mysql_async::Error) -> DriverError {
    DriverError::Query(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use mysql_async::{Opts, Value};
    use quarry_core::driver::{Cell, ConnConfig};

    use super::{duration_to_millis, group_schema_rows, mysql_value_to_cell, opts_from_config};

    #[test]
    fn value_conversion_keeps_types() {
        assert_eq!(mysql_value_to_cell(&Value::NULL), Cell::Null);
        assert_eq!(
            mysql_value_to_cell(&Value::Bytes(b"hello".to_vec())),
            Cell::Text("hello".to_string())
        );
        assert_eq!(
            mysql_value_to_cell(&Value::Bytes(vec![0xff, 0xfe])),
            Cell::Bytes(vec![0xff, 0xfe])
        );
        assert_eq!(mysql_value_to_cell(&Value::Int(-8)), Cell::Int(-8));
        assert_eq!(mysql_value_to_cell(&Value::UInt(8)), Cell::UInt(8));
    }

    #[test]
    fn dates_and_times_render_without_empty_fractions() {
        assert_eq!(
            mysql_value_to_cell(&Value::Date(2024, 3, 9, 0, 0, 0, 0)),
            Cell::Text("2024-03-09".to_string())
        );
        assert_eq!(
            mysql_value_to_cell(&Value::Date(2024, 3, 9, 7, 5, 1, 0)),
            Cell::Text("2024-03-09 07:05:01".to_string())
        );
        assert_eq!(
            mysql_value_to_cell(&Value::Time(true, 1, 2, 3, 4, 0)),
            Cell::Text("-26:03:04".to_string())
        );
    }

    #[test]
    fn schema_rows_group_by_schema_and_skip_system_schemas() {
        let rows = vec![
            ("app".to_string(), Some("orders".to_string())),
            ("app".to_string(), Some("users".to_string())),
            ("empty".to_string(), None),
            ("mysql".to_string(), Some("user".to_string())),
            ("sys".to_string(), None),
        ];
        let schemas = group_schema_rows(rows);
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0].name, "app");
        assert_eq!(
            schemas[0]
                .tables
                .iter()
                .map(|table| table.name.as_str())
                .collect::<Vec<_>>(),
            vec!["orders", "users"]
        );
        assert_eq!(schemas[0].tables[0].schema, "app");
        assert!(schemas[1].tables.is_empty());
    }

    #[test]
    fn blank_optional_fields_are_left_unset() {
        let config = ConnConfig {
            host: "127.0.0.1".to_string(),
            port: 3307,
            username: String::new(),
            password: String::new(),
            database: " ".to_string(),
        };
        let opts = Opts::from(opts_from_config(&config));
        assert_eq!(opts.ip_or_hostname(), "127.0.0.1");
        assert_eq!(opts.tcp_port(), 3307);
        assert_eq!(opts.user(), None);
        assert_eq!(opts.pass(), None);
        assert_eq!(opts.db_name(), None);
    }

    #[test]
    fn filled_fields_are_trimmed_into_the_options() {
        let config = ConnConfig {
            host: "db.internal".to_string(),
            port: 3306,
            username: " app ".to_string(),
            password: " pw ".to_string(),
            database: "shop".to_string(),
        };
        let opts = Opts::from(opts_from_config(&config));
        assert_eq!(opts.user(), Some("app"));
        assert_eq!(opts.pass(), Some(" pw "));
        assert_eq!(opts.db_name(), Some("shop"));
    }

    #[test]
    fn oversized_timeouts_saturate() {
        assert_eq!(duration_to_millis(Duration::from_secs(2)), 2000);
        assert_eq!(duration_to_millis(Duration::MAX), u64::MAX);
    }
}
