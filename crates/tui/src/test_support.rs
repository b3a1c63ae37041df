use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry_core::driver::{
    Cell, ConnConfig, DbDriver, DbSession, DriverError, DriverRegistry, QueryResult, SchemaInfo,
    TableInfo,
};
use quarry_core::query_job::CancellationToken;
use quarry_core::settings::Settings;
use quarry_core::store::{ConnectionStore, SavedConnection, StoreDocument, StoreError};

use crate::workspace::Workspace;

#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    document: StoreDocument,
    pub(crate) password: Option<String>,
}

impl ConnectionStore for MemoryStore {
    fn load(&mut self) -> Result<&StoreDocument, StoreError> {
        Ok(&self.document)
    }

    fn save(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn add(&mut self, connection: SavedConnection) -> Result<(), StoreError> {
        self.document.connections.push(connection);
        Ok(())
    }

    fn update(&mut self, connection: SavedConnection) -> Result<(), StoreError> {
        let existing = self
            .document
            .connections
            .iter_mut()
            .find(|saved| saved.id == connection.id)
            .ok_or_else(|| StoreError::NotFound(connection.id.clone()))?;
        *existing = connection;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        let before = self.document.connections.len();
        self.document.connections.retain(|saved| saved.id != id);
        if self.document.connections.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn list(&self) -> &[SavedConnection] {
        &self.document.connections
    }

    fn change_password(&mut self, password: &str) -> Result<(), StoreError> {
        self.password = Some(password.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeSession;

#[async_trait]
impl DbSession for FakeSession {
    async fn query(
        &self,
        _sql: &str,
        _limit: usize,
        _offset: usize,
        _cancel: &CancellationToken,
    ) -> Result<QueryResult, DriverError> {
        Ok(QueryResult {
            columns: vec!["1".to_string()],
            rows: vec![vec![Cell::Int(1)]],
            row_count: 1,
            has_more: false,
        })
    }

    async fn list_schemas(&self) -> Result<Vec<SchemaInfo>, DriverError> {
        Ok(vec![SchemaInfo {
            name: "app".to_string(),
            tables: vec![TableInfo {
                schema: "app".to_string(),
                name: "users".to_string(),
            }],
        }])
    }

    async fn ping(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }

    fn set_timeout(&self, _timeout: Duration) {}
}

#[derive(Debug, Default)]
pub(crate) struct FakeDriver;

#[async_trait]
impl DbDriver for FakeDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn default_port(&self) -> u16 {
        3306
    }

    async fn connect(&self, _config: &ConnConfig) -> Result<Arc<dyn DbSession>, DriverError> {
        Ok(Arc::new(FakeSession))
    }
}

pub(crate) fn workspace_with(names: &[&str]) -> Workspace {
    let mut store = MemoryStore::default();
    for name in names {
        store
            .add(SavedConnection::new(*name, "mysql", "127.0.0.1", 3306))
            .expect("memory store accepts connections");
    }
    let mut drivers = DriverRegistry::new();
    drivers.register(Arc::new(FakeDriver));
    Workspace::new(Box::new(store), drivers, Settings::default())
}
