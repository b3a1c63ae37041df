use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::debug;
use quarry_core::driver::{DbSession, QueryResult, SchemaInfo};
use quarry_core::query_job::{FetchMode, JobId, QueryJob};
use quarry_core::results_grid::ResultsGrid;
use quarry_core::store::SavedConnection;
use quarry_core::text_buffer::TextBuffer;
use quarry_core::tree::{NodePayload, Tree, TreeNode};

use crate::keys::{is_ctrl, printable};

/// Row cap of the query generated for an activated table.
pub const TABLE_PREVIEW_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Schema,
    Editor,
    Results,
}

impl Pane {
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Schema => Self::Editor,
            Self::Editor => Self::Results,
            Self::Results => Self::Schema,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Schema => "Schema",
            Self::Editor => "Editor",
            Self::Results => "Results",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    Idle,
    Info(String),
    Running,
    Cancelled,
    Error(String),
    Completed { row_count: usize, elapsed: Duration },
}

/// Bottom line of a tab: connection info on the left, the latest outcome
/// on the right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    connection_info: String,
    message: StatusMessage,
}

impl StatusLine {
    #[must_use]
    pub fn new(connection_info: impl Into<String>) -> Self {
        Self {
            connection_info: connection_info.into(),
            message: StatusMessage::Idle,
        }
    }

    #[must_use]
    pub fn connection_info(&self) -> &str {
        &self.connection_info
    }

    pub fn set_connection_info(&mut self, info: impl Into<String>) {
        self.connection_info = info.into();
    }

    #[must_use]
    pub fn message(&self) -> &StatusMessage {
        &self.message
    }

    pub fn set(&mut self, message: StatusMessage) {
        self.message = message;
    }

    #[must_use]
    pub fn right_text(&self) -> String {
        match &self.message {
            StatusMessage::Idle => String::new(),
            StatusMessage::Info(message) => message.clone(),
            StatusMessage::Running => "Running... (Ctrl+C to cancel)".to_string(),
            StatusMessage::Cancelled => "Query cancelled".to_string(),
            StatusMessage::Error(message) => format!("Error: {message}"),
            StatusMessage::Completed { row_count, elapsed } => {
                format!("✓ {row_count} rows in {}", format_elapsed(*elapsed))
            }
        }
    }
}

#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    if elapsed < Duration::from_millis(1) {
        format!("{}µs", elapsed.as_micros())
    } else if elapsed < Duration::from_secs(1) {
        format!("{:.1}ms", elapsed.as_secs_f64() * 1000.0)
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

/// Builds one collapsed node per schema with its tables as leaves.
#[must_use]
pub fn schema_nodes(schemas: &[SchemaInfo]) -> Vec<TreeNode> {
    schemas
        .iter()
        .map(|schema| {
            let tables = schema
                .tables
                .iter()
                .map(|table| {
                    TreeNode::new(
                        format!("table:{}.{}", schema.name, table.name),
                        table.name.clone(),
                        NodePayload::Table {
                            schema: schema.name.clone(),
                            name: table.name.clone(),
                        },
                    )
                })
                .collect();
            TreeNode::new(
                format!("schema:{}", schema.name),
                schema.name.clone(),
                NodePayload::Schema(schema.name.clone()),
            )
            .with_children(tables)
        })
        .collect()
}

#[must_use]
pub fn table_preview_sql(schema: &str, table: &str) -> String {
    format!(
        "SELECT * FROM {}.{} LIMIT {TABLE_PREVIEW_LIMIT}",
        quote_identifier(schema),
        quote_identifier(table)
    )
}

/// Backtick-quotes a MySQL identifier, doubling embedded backticks.
fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Why a query could not be started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRejection {
    AlreadyRunning,
    EmptyEditor,
    NothingToLoad,
}

/// Per-tab composition of the schema tree, editor, results and status.
#[derive(Debug)]
pub struct PaneCollection {
    focus: Pane,
    tree: Tree,
    editor: TextBuffer,
    results: ResultsGrid,
    status: StatusLine,
    job: Option<QueryJob>,
    schema_job: Option<JobId>,
    schemas_loaded: bool,
    last_sql: Option<String>,
}

impl PaneCollection {
    #[must_use]
    pub fn new(connection_info: impl Into<String>) -> Self {
        Self {
            focus: Pane::Editor,
            tree: Tree::default(),
            editor: TextBuffer::new(),
            results: ResultsGrid::new(),
            status: StatusLine::new(connection_info),
            job: None,
            schema_job: None,
            schemas_loaded: false,
            last_sql: None,
        }
    }

    #[must_use]
    pub fn focus(&self) -> Pane {
        self.focus
    }

    pub fn set_focus(&mut self, pane: Pane) {
        self.focus = pane;
    }

    pub fn cycle_focus(&mut self) {
        self.focus = self.focus.next();
        debug!("pane focus -> {}", self.focus.name());
    }

    #[must_use]
    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    #[must_use]
    pub fn editor(&self) -> &TextBuffer {
        &self.editor
    }

    #[must_use]
    pub fn results(&self) -> &ResultsGrid {
        &self.results
    }

    #[must_use]
    pub fn status(&self) -> &StatusLine {
        &self.status
    }

    pub fn set_status(&mut self, message: StatusMessage) {
        self.status.set(message);
    }

    pub fn set_connection_info(&mut self, info: impl Into<String>) {
        self.status.set_connection_info(info);
    }

    #[must_use]
    pub fn job(&self) -> Option<&QueryJob> {
        self.job.as_ref()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.job.is_some()
    }

    #[must_use]
    pub fn schemas_loaded(&self) -> bool {
        self.schemas_loaded
    }

    #[must_use]
    pub fn schema_loading(&self) -> bool {
        self.schema_job.is_some()
    }

    /// Pushes the row counts of each pane's content area.
    pub fn set_viewport(&mut self, schema_rows: usize, editor_rows: usize, results_rows: usize) {
        self.tree.set_viewport_height(schema_rows);
        self.editor.set_viewport_height(editor_rows);
        self.results.set_viewport_height(results_rows);
    }

    pub fn begin_schema_load(&mut self, job_id: JobId) {
        self.schema_job = Some(job_id);
    }

    /// Applies a schema listing if it answers the latest load. A failure
    /// leaves the current tree untouched.
    pub fn finish_schema_load(
        &mut self,
        job_id: JobId,
        result: Result<Vec<SchemaInfo>, String>,
    ) -> bool {
        if self.schema_job != Some(job_id) {
            return false;
        }
        self.schema_job = None;
        match result {
            Ok(schemas) => self.set_schemas(&schemas),
            Err(message) => self.status.set(StatusMessage::Error(message)),
        }
        true
    }

    pub fn set_schemas(&mut self, schemas: &[SchemaInfo]) {
        self.tree.set_roots(schema_nodes(schemas));
        self.schemas_loaded = true;
    }

    /// SQL for a new query from the editor contents.
    pub fn prepare_execute(&self) -> Result<String, QueryRejection> {
        if self.is_running() {
            return Err(QueryRejection::AlreadyRunning);
        }
        let sql = self.editor.content();
        if sql.trim().is_empty() {
            return Err(QueryRejection::EmptyEditor);
        }
        Ok(sql.trim().to_string())
    }

    /// SQL and offset for fetching the next page of the current result.
    pub fn prepare_load_more(&self) -> Result<(String, usize), QueryRejection> {
        if self.is_running() {
            return Err(QueryRejection::AlreadyRunning);
        }
        match &self.last_sql {
            Some(sql) if self.results.has_more() => Ok((sql.clone(), self.results.fetched_rows())),
            _ => Err(QueryRejection::NothingToLoad),
        }
    }

    pub fn begin_query(&mut self, job: QueryJob) {
        self.status.set(StatusMessage::Running);
        self.job = Some(job);
    }

    /// Signals the running job and forgets it. Returns the cancelled id.
    pub fn cancel_query(&mut self) -> Option<JobId> {
        let job = self.job.take()?;
        job.cancel();
        self.status.set(StatusMessage::Cancelled);
        Some(job.id)
    }

    /// Applies a completion if it belongs to the running job.
    pub fn finish_query(
        &mut self,
        job_id: JobId,
        elapsed: Duration,
        result: Result<QueryResult, String>,
    ) -> bool {
        if self.job.as_ref().map(|job| job.id) != Some(job_id) {
            return false;
        }
        let Some(job) = self.job.take() else {
            return false;
        };
        match result {
            Ok(result) => {
                match job.mode {
                    FetchMode::Replace => {
                        self.results.set_result(result);
                        self.last_sql = Some(job.sql);
                    }
                    FetchMode::Append => self.results.append_result(result),
                }
                self.status.set(StatusMessage::Completed {
                    row_count: self.results.row_count(),
                    elapsed,
                });
            }
            Err(message) => self.status.set(StatusMessage::Error(message)),
        }
        true
    }

    /// Routes a key to the focused pane.
    pub fn handle_key(&mut self, key: KeyEvent) {
        match self.focus {
            Pane::Schema => self.handle_schema_key(key),
            Pane::Editor => self.handle_editor_key(key),
            Pane::Results => self.handle_results_key(key),
        }
    }

    pub fn handle_paste(&mut self, text: &str) {
        self.editor.insert_text(text);
        self.focus = Pane::Editor;
    }

    fn handle_schema_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.tree.move_up(),
            KeyCode::Down | KeyCode::Char('j') => self.tree.move_down(),
            KeyCode::Right | KeyCode::Char('l') => self.tree.expand(),
            KeyCode::Left | KeyCode::Char('h') => self.tree.collapse(),
            KeyCode::Char(' ') => self.tree.toggle(),
            KeyCode::Enter => {
                let table = match self.tree.selected().map(|node| &node.payload) {
                    Some(NodePayload::Table { schema, name }) => Some((schema.clone(), name.clone())),
                    _ => None,
                };
                match table {
                    Some((schema, name)) => self.activate_table(&schema, &name),
                    None => self.tree.toggle(),
                }
            }
            _ => {}
        }
    }

    fn activate_table(&mut self, schema: &str, table: &str) {
        self.editor.set_content(&table_preview_sql(schema, table));
        self.editor.move_end();
        self.focus = Pane::Editor;
        debug!("activated table {schema}.{table}");
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        if is_ctrl(&key, 'u')
            || (key.code == KeyCode::Backspace && key.modifiers.contains(KeyModifiers::ALT))
        {
            self.editor.kill_to_line_start();
            return;
        }
        if is_ctrl(&key, 'k') {
            self.editor.kill_to_line_end();
            return;
        }

        match key.code {
            KeyCode::Up => self.editor.move_up(),
            KeyCode::Down => self.editor.move_down(),
            KeyCode::Left => self.editor.move_left(),
            KeyCode::Right => self.editor.move_right(),
            KeyCode::Home => self.editor.move_home(),
            KeyCode::End => self.editor.move_end(),
            KeyCode::Enter => self.editor.split_line(),
            KeyCode::Backspace => self.editor.backspace(),
            _ => {
                if let Some(ch) = printable(&key) {
                    self.editor.insert_char(ch);
                }
            }
        }
    }

    fn handle_results_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.results.move_up(),
            KeyCode::Down | KeyCode::Char('j') => self.results.move_down(),
            KeyCode::PageUp => self.results.page_up(),
            KeyCode::PageDown => self.results.page_down(),
            KeyCode::Home => self.results.move_home(),
            KeyCode::End => self.results.move_end(),
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TabId(pub u64);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tab-{}", self.0)
    }
}

/// One connected session and its panes.
#[derive(Debug)]
pub struct Tab {
    pub id: TabId,
    pub connection: SavedConnection,
    pub session: Arc<dyn DbSession>,
    pub panes: PaneCollection,
}

impl Tab {
    #[must_use]
    pub fn new(id: TabId, connection: SavedConnection, session: Arc<dyn DbSession>) -> Self {
        let info = connection_info(&connection);
        Self {
            id,
            connection,
            session,
            panes: PaneCollection::new(info),
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.connection.name
    }
}

#[must_use]
pub fn connection_info(connection: &SavedConnection) -> String {
    if connection.database.is_empty() {
        format!("{} @ {}:{}", connection.name, connection.host, connection.port)
    } else {
        format!(
            "{} @ {}:{}/{}",
            connection.name, connection.host, connection.port, connection.database
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use quarry_core::driver::{Cell, QueryResult, SchemaInfo, TableInfo};
    use quarry_core::query_job::{FetchMode, JobIdGenerator, QueryJob};

    use super::{
        format_elapsed, table_preview_sql, Pane, PaneCollection, QueryRejection, StatusMessage,
    };

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn schemas() -> Vec<SchemaInfo> {
        vec![
            SchemaInfo {
                name: "app".to_string(),
                tables: vec![
                    TableInfo {
                        schema: "app".to_string(),
                        name: "users".to_string(),
                    },
                    TableInfo {
                        schema: "app".to_string(),
                        name: "orders".to_string(),
                    },
                ],
            },
            SchemaInfo {
                name: "audit".to_string(),
                tables: vec![TableInfo {
                    schema: "audit".to_string(),
                    name: "events".to_string(),
                }],
            },
        ]
    }

    fn one_row() -> QueryResult {
        QueryResult {
            columns: vec!["1".to_string()],
            rows: vec![vec![Cell::Int(1)]],
            row_count: 1,
            has_more: false,
        }
    }

    #[test]
    fn focus_cycles_schema_editor_results() {
        let mut panes = PaneCollection::new("dev @ localhost:3306");
        assert_eq!(panes.focus(), Pane::Editor);
        panes.cycle_focus();
        assert_eq!(panes.focus(), Pane::Results);
        panes.cycle_focus();
        assert_eq!(panes.focus(), Pane::Schema);
        panes.cycle_focus();
        assert_eq!(panes.focus(), Pane::Editor);
    }

    #[test]
    fn schemas_start_collapsed_and_expand_by_table_count() {
        let mut panes = PaneCollection::new("dev");
        panes.set_schemas(&schemas());
        assert_eq!(panes.tree().visible_len(), 2);

        panes.set_focus(Pane::Schema);
        panes.handle_key(key(KeyCode::Right));
        assert_eq!(panes.tree().visible_len(), 4);
    }

    #[test]
    fn activating_a_table_fills_the_editor() {
        let mut panes = PaneCollection::new("dev");
        panes.set_schemas(&schemas());
        panes.set_focus(Pane::Schema);
        panes.handle_key(key(KeyCode::Enter));
        panes.handle_key(key(KeyCode::Down));
        panes.handle_key(key(KeyCode::Enter));

        assert_eq!(panes.focus(), Pane::Editor);
        assert_eq!(
            panes.editor().content(),
            "SELECT * FROM `app`.`users` LIMIT 100"
        );
    }

    #[test]
    fn preview_sql_quotes_awkward_identifiers() {
        assert_eq!(
            table_preview_sql("my-db", "order`s"),
            "SELECT * FROM `my-db`.`order``s` LIMIT 100"
        );
    }

    #[test]
    fn failed_schema_load_keeps_the_tree() {
        let mut ids = JobIdGenerator::new();
        let mut panes = PaneCollection::new("dev");
        panes.set_schemas(&schemas());

        let refresh = ids.next_id();
        panes.begin_schema_load(refresh);
        assert!(panes.finish_schema_load(refresh, Err("timeout".to_string())));
        assert_eq!(panes.tree().visible_len(), 2);
        assert_eq!(panes.status().right_text(), "Error: timeout");
    }

    #[test]
    fn second_execute_is_rejected_while_running() {
        let mut ids = JobIdGenerator::new();
        let mut panes = PaneCollection::new("dev");
        assert_eq!(panes.prepare_execute(), Err(QueryRejection::EmptyEditor));

        panes.handle_paste("SELECT 1");
        let sql = panes.prepare_execute().expect("editor has sql");
        panes.begin_query(QueryJob::start(ids.next_id(), sql, FetchMode::Replace));
        assert_eq!(panes.prepare_execute(), Err(QueryRejection::AlreadyRunning));
        assert_eq!(
            panes.status().right_text(),
            "Running... (Ctrl+C to cancel)"
        );
    }

    #[test]
    fn cancelled_job_completion_is_discarded() {
        let mut ids = JobIdGenerator::new();
        let mut panes = PaneCollection::new("dev");
        let job = QueryJob::start(ids.next_id(), "SELECT 1", FetchMode::Replace);
        let job_id = job.id;
        let token = job.cancellation.clone();
        panes.begin_query(job);

        assert_eq!(panes.cancel_query(), Some(job_id));
        assert!(token.is_cancelled());
        assert!(!panes.is_running());
        assert!(!panes.finish_query(job_id, Duration::from_millis(3), Ok(one_row())));
        assert_eq!(panes.status().message(), &StatusMessage::Cancelled);
        assert!(!panes.results().is_loaded());
        assert_eq!(panes.cancel_query(), None);
    }

    #[test]
    fn completion_reports_row_count_and_elapsed() {
        let mut ids = JobIdGenerator::new();
        let mut panes = PaneCollection::new("dev");
        let job = QueryJob::start(ids.next_id(), "SELECT 1", FetchMode::Replace);
        let job_id = job.id;
        panes.begin_query(job);

        assert!(panes.finish_query(job_id, Duration::from_millis(12), Ok(one_row())));
        assert_eq!(panes.status().right_text(), "✓ 1 rows in 12.0ms");
        assert_eq!(panes.results().row_count(), 1);
    }

    #[test]
    fn load_more_needs_a_result_with_more_rows() {
        let mut ids = JobIdGenerator::new();
        let mut panes = PaneCollection::new("dev");
        assert_eq!(panes.prepare_load_more(), Err(QueryRejection::NothingToLoad));

        let job = QueryJob::start(ids.next_id(), "SELECT id FROM t", FetchMode::Replace);
        let job_id = job.id;
        panes.begin_query(job);
        let mut page = one_row();
        page.has_more = true;
        panes.finish_query(job_id, Duration::from_millis(1), Ok(page));

        assert_eq!(
            panes.prepare_load_more(),
            Ok(("SELECT id FROM t".to_string(), 1))
        );
    }

    #[test]
    fn load_more_continues_the_query_on_screen() {
        let mut ids = JobIdGenerator::new();
        let mut panes = PaneCollection::new("dev");
        let first = QueryJob::start(ids.next_id(), "SELECT id FROM a", FetchMode::Replace);
        let first_id = first.id;
        panes.begin_query(first);
        let mut page = one_row();
        page.has_more = true;
        assert!(panes.finish_query(first_id, Duration::from_millis(1), Ok(page)));

        panes.begin_query(QueryJob::start(
            ids.next_id(),
            "SELECT id FROM b",
            FetchMode::Replace,
        ));
        panes.cancel_query();
        assert_eq!(
            panes.prepare_load_more(),
            Ok(("SELECT id FROM a".to_string(), 1))
        );

        let failed = QueryJob::start(ids.next_id(), "SELECT id FROM c", FetchMode::Replace);
        let failed_id = failed.id;
        panes.begin_query(failed);
        assert!(panes.finish_query(
            failed_id,
            Duration::from_millis(1),
            Err("no such table".to_string())
        ));
        assert_eq!(
            panes.prepare_load_more(),
            Ok(("SELECT id FROM a".to_string(), 1))
        );
    }

    #[test]
    fn editor_keys_edit_the_buffer() {
        let mut panes = PaneCollection::new("dev");
        for ch in "selct".chars() {
            panes.handle_key(key(KeyCode::Char(ch)));
        }
        panes.handle_key(key(KeyCode::Left));
        panes.handle_key(key(KeyCode::Left));
        panes.handle_key(key(KeyCode::Char('e')));
        assert_eq!(panes.editor().content(), "select");

        panes.handle_key(KeyEvent::new(KeyCode::Char('u'), KeyModifiers::CONTROL));
        assert_eq!(panes.editor().content(), "ct");
    }

    #[test]
    fn elapsed_formatting_scales_units() {
        assert_eq!(format_elapsed(Duration::from_micros(250)), "250µs");
        assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.50s");
    }
}
