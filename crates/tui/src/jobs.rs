use std::sync::Arc;
use std::time::Instant;

use log::{debug, warn};
use quarry_adapters::export::export_rows_to_csv;
use quarry_core::clipboard::ClipboardReader;
use quarry_core::driver::DriverError;
use tokio::time::timeout;

use crate::workspace::{AppEvent, Effect};

/// Runs one effect to completion and returns the event that reports it, if
/// any. Nothing here touches controller state.
pub async fn perform(effect: Effect, clipboard: Arc<dyn ClipboardReader>) -> Option<AppEvent> {
    match effect {
        Effect::Connect {
            job_id,
            connection_id,
            driver,
            config,
            timeout: limit,
        } => {
            debug!("{job_id}: connecting with {}", driver.name());
            let connecting = driver.connect(&config);
            let connected = match limit {
                Some(limit) => match timeout(limit, connecting).await {
                    Ok(connected) => connected,
                    Err(_) => Err(DriverError::Timeout(limit)),
                },
                None => connecting.await,
            };
            let result = connected
                .map(|session| {
                    if let Some(limit) = limit {
                        session.set_timeout(limit);
                    }
                    session
                })
                .map_err(|err| err.to_string());
            Some(AppEvent::Connected {
                job_id,
                connection_id,
                result,
            })
        }
        Effect::LoadSchemas {
            tab_id,
            job_id,
            session,
        } => {
            let result = session.list_schemas().await.map_err(|err| err.to_string());
            Some(AppEvent::SchemasLoaded {
                tab_id,
                job_id,
                result,
            })
        }
        Effect::RunQuery {
            tab_id,
            job_id,
            session,
            sql,
            limit,
            offset,
            cancel,
        } => {
            let started = Instant::now();
            let result = session
                .query(&sql, limit, offset, &cancel)
                .await
                .map_err(|err| err.to_string());
            let elapsed = started.elapsed();
            debug!("{job_id}: finished in {elapsed:?}");
            Some(AppEvent::QueryFinished {
                tab_id,
                job_id,
                elapsed,
                result,
            })
        }
        Effect::ReadClipboard { tab_id } => {
            let result = clipboard.read_text().await.map_err(|err| err.to_string());
            Some(AppEvent::ClipboardRead { tab_id, result })
        }
        Effect::ExportCsv {
            tab_id,
            path,
            columns,
            rows,
        } => {
            let written = tokio::task::spawn_blocking(move || {
                export_rows_to_csv(&path, &columns, &rows)
                    .map(|count| (count, path))
                    .map_err(|err| err.to_string())
            })
            .await;
            let result = written.unwrap_or_else(|err| Err(format!("export task failed: {err}")));
            Some(AppEvent::Exported { tab_id, result })
        }
        Effect::CloseSession {
            connection_id,
            session,
        } => {
            if let Err(err) = session.close().await {
                warn!("failed to close session for {connection_id}: {err}");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use quarry_core::clipboard::{ClipboardError, ClipboardReader};
    use quarry_core::driver::{Cell, ConnConfig, DbDriver, DbSession, DriverError};
    use quarry_core::query_job::{CancellationToken, JobIdGenerator};

    use super::perform;
    use crate::panes::TabId;
    use crate::test_support::{FakeDriver, FakeSession};
    use crate::workspace::{AppEvent, Effect};

    #[derive(Debug)]
    struct StaticClipboard(Result<String, ClipboardError>);

    #[async_trait]
    impl ClipboardReader for StaticClipboard {
        async fn read_text(&self) -> Result<String, ClipboardError> {
            self.0.clone()
        }
    }

    #[derive(Debug)]
    struct HangingDriver;

    #[async_trait]
    impl DbDriver for HangingDriver {
        fn name(&self) -> &'static str {
            "hanging"
        }

        fn default_port(&self) -> u16 {
            1
        }

        async fn connect(&self, _config: &ConnConfig) -> Result<Arc<dyn DbSession>, DriverError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(DriverError::Connect("too late".to_string()))
        }
    }

    fn clipboard() -> Arc<dyn ClipboardReader> {
        Arc::new(StaticClipboard(Ok("SELECT 2".to_string())))
    }

    fn config() -> ConnConfig {
        ConnConfig {
            host: "127.0.0.1".to_string(),
            port: 3306,
            username: String::new(),
            password: String::new(),
            database: String::new(),
        }
    }

    #[tokio::test]
    async fn query_effect_reports_rows_and_elapsed_time() {
        let mut ids = JobIdGenerator::new();
        let job_id = ids.next_id();
        let event = perform(
            Effect::RunQuery {
                tab_id: TabId(1),
                job_id,
                session: Arc::new(FakeSession),
                sql: "SELECT 1".to_string(),
                limit: 100,
                offset: 0,
                cancel: CancellationToken::new(),
            },
            clipboard(),
        )
        .await;

        match event {
            Some(AppEvent::QueryFinished {
                tab_id,
                job_id: finished,
                result,
                ..
            }) => {
                assert_eq!(tab_id, TabId(1));
                assert_eq!(finished, job_id);
                let result = result.expect("fake session answers");
                assert_eq!(result.rows, vec![vec![Cell::Int(1)]]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn connect_effect_yields_a_session() {
        let mut ids = JobIdGenerator::new();
        let event = perform(
            Effect::Connect {
                job_id: ids.next_id(),
                connection_id: "c1".to_string(),
                driver: Arc::new(FakeDriver),
                config: config(),
                timeout: Some(Duration::from_secs(1)),
            },
            clipboard(),
        )
        .await;

        assert!(matches!(
            event,
            Some(AppEvent::Connected { ref connection_id, result: Ok(_), .. }) if connection_id == "c1"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn connect_effect_gives_up_after_the_timeout() {
        let mut ids = JobIdGenerator::new();
        let event = perform(
            Effect::Connect {
                job_id: ids.next_id(),
                connection_id: "c1".to_string(),
                driver: Arc::new(HangingDriver),
                config: config(),
                timeout: Some(Duration::from_millis(50)),
            },
            clipboard(),
        )
        .await;

        match event {
            Some(AppEvent::Connected {
                result: Err(message),
                ..
            }) => assert!(message.contains("timed out"), "{message}"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn clipboard_errors_are_reported_as_text() {
        let reader: Arc<dyn ClipboardReader> =
            Arc::new(StaticClipboard(Err(ClipboardError::Unavailable)));
        let event = perform(Effect::ReadClipboard { tab_id: TabId(3) }, reader).await;

        assert!(matches!(
            event,
            Some(AppEvent::ClipboardRead { tab_id: TabId(3), result: Err(ref message) })
                if message.contains("no clipboard tool")
        ));
    }

    #[tokio::test]
    async fn export_effect_writes_csv_file() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("out.csv");
        let event = perform(
            Effect::ExportCsv {
                tab_id: TabId(1),
                path: path.clone(),
                columns: vec!["id".to_string()],
                rows: vec![vec![Cell::Int(7)]],
            },
            clipboard(),
        )
        .await;

        match event {
            Some(AppEvent::Exported {
                result: Ok((rows, written)),
                ..
            }) => {
                assert_eq!(rows, 1);
                assert_eq!(written, path);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let content = fs::read_to_string(&path).expect("export should exist");
        assert_eq!(content, "id\n7\n");
    }

    #[tokio::test]
    async fn closing_a_session_reports_nothing() {
        let event = perform(
            Effect::CloseSession {
                connection_id: "c1".to_string(),
                session: Arc::new(FakeSession),
            },
            clipboard(),
        )
        .await;
        assert!(event.is_none());
    }
}
