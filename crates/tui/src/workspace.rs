use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::KeyEvent;
use log::{debug, info, warn};
use quarry_adapters::export::csv_export_path;
use quarry_core::clipboard::clean_clipboard_text;
use quarry_core::connection_registry::ConnectionRegistry;
use quarry_core::driver::{
    Cell, ConnConfig, DbDriver, DbSession, DriverRegistry, QueryResult, SchemaInfo,
};
use quarry_core::query_job::{CancellationToken, FetchMode, JobId, JobIdGenerator, QueryJob};
use quarry_core::settings::Settings;
use quarry_core::store::{ConnectionStore, SavedConnection};
use quarry_core::text_buffer::normalize_line_endings;
use ratatui::layout::Rect;

use crate::explorer::{Explorer, ExplorerStatus};
use crate::keys::{key_name, map_explorer_key, map_tab_key, ExplorerCommand, TabCommand};
use crate::modal::{
    ConnectionForm, DriverChoice, Modal, ModalOutcome, ModalStack, PasswordPrompt,
    PasswordPurpose,
};
use crate::panes::{connection_info, QueryRejection, StatusMessage, Tab, TabId};
use crate::render::connected_layout;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Explorer,
    Connected,
}

/// Everything that enters the controller: input, resizes, and the
/// completions of background jobs.
#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Paste(String),
    Resize {
        width: u16,
        height: u16,
    },
    Connected {
        job_id: JobId,
        connection_id: String,
        result: Result<Arc<dyn DbSession>, String>,
    },
    SchemasLoaded {
        tab_id: TabId,
        job_id: JobId,
        result: Result<Vec<SchemaInfo>, String>,
    },
    QueryFinished {
        tab_id: TabId,
        job_id: JobId,
        elapsed: Duration,
        result: Result<QueryResult, String>,
    },
    ClipboardRead {
        tab_id: TabId,
        result: Result<String, String>,
    },
    Exported {
        tab_id: TabId,
        result: Result<(usize, PathBuf), String>,
    },
}

/// Side effects requested by the controller. Each is run once in the
/// background and may answer with an [`AppEvent`].
#[derive(Debug)]
pub enum Effect {
    Connect {
        job_id: JobId,
        connection_id: String,
        driver: Arc<dyn DbDriver>,
        config: ConnConfig,
        timeout: Option<Duration>,
    },
    LoadSchemas {
        tab_id: TabId,
        job_id: JobId,
        session: Arc<dyn DbSession>,
    },
    RunQuery {
        tab_id: TabId,
        job_id: JobId,
        session: Arc<dyn DbSession>,
        sql: String,
        limit: usize,
        offset: usize,
        cancel: CancellationToken,
    },
    ReadClipboard {
        tab_id: TabId,
    },
    ExportCsv {
        tab_id: TabId,
        path: PathBuf,
        columns: Vec<String>,
        rows: Vec<Vec<Cell>>,
    },
    CloseSession {
        connection_id: String,
        session: Arc<dyn DbSession>,
    },
}

#[derive(Debug)]
struct PendingConnect {
    job_id: JobId,
    connection: SavedConnection,
}

/// The top-level state machine. It never blocks: work that touches a
/// driver, the clipboard or the filesystem is returned as [`Effect`]s.
pub struct Workspace {
    view: View,
    explorer: Explorer,
    tabs: Vec<Tab>,
    current_tab: Option<usize>,
    modals: ModalStack,
    registry: ConnectionRegistry,
    drivers: DriverRegistry,
    store: Box<dyn ConnectionStore>,
    settings: Settings,
    job_ids: JobIdGenerator,
    next_tab_id: u64,
    pending_connect: Option<PendingConnect>,
    size: (u16, u16),
    debug: bool,
    should_quit: bool,
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("view", &self.view)
            .field("tabs", &self.tabs.len())
            .field("current_tab", &self.current_tab)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl Workspace {
    /// `store` must already be loaded.
    #[must_use]
    pub fn new(
        store: Box<dyn ConnectionStore>,
        drivers: DriverRegistry,
        settings: Settings,
    ) -> Self {
        let explorer = Explorer::new(store.list().to_vec());
        Self {
            view: View::Explorer,
            explorer,
            tabs: Vec::new(),
            current_tab: None,
            modals: ModalStack::new(),
            registry: ConnectionRegistry::new(),
            drivers,
            store,
            settings,
            job_ids: JobIdGenerator::new(),
            next_tab_id: 0,
            pending_connect: None,
            size: (0, 0),
            debug: false,
            should_quit: false,
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub fn view(&self) -> View {
        self.view
    }

    #[must_use]
    pub fn explorer(&self) -> &Explorer {
        &self.explorer
    }

    #[must_use]
    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current_tab
    }

    #[must_use]
    pub fn current_tab(&self) -> Option<&Tab> {
        self.tabs.get(self.current_tab?)
    }

    #[must_use]
    pub fn modals(&self) -> &ModalStack {
        &self.modals
    }

    #[must_use]
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub fn size(&self) -> (u16, u16) {
        self.size
    }

    #[must_use]
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.pending_connect.is_some()
    }

    /// Sessions still held at shutdown, to be closed by the caller.
    pub fn take_sessions(&mut self) -> Vec<Arc<dyn DbSession>> {
        for tab in &mut self.tabs {
            tab.panes.cancel_query();
        }
        self.tabs.clear();
        self.current_tab = None;
        self.registry.drain()
    }

    pub fn handle(&mut self, event: AppEvent) -> Vec<Effect> {
        match event {
            AppEvent::Key(key) => self.handle_key(key),
            AppEvent::Paste(text) => self.handle_paste(&text),
            AppEvent::Resize { width, height } => {
                self.size = (width, height);
                self.relayout();
                Vec::new()
            }
            AppEvent::Connected {
                job_id,
                connection_id,
                result,
            } => self.on_connected(job_id, &connection_id, result),
            AppEvent::SchemasLoaded {
                tab_id,
                job_id,
                result,
            } => {
                match self.tab_mut(tab_id) {
                    Some(tab) => {
                        if !tab.panes.finish_schema_load(job_id, result) {
                            warn!("discarding stale schema listing {job_id} for {tab_id}");
                        }
                    }
                    None => warn!("schema listing {job_id} arrived for closed {tab_id}"),
                }
                Vec::new()
            }
            AppEvent::QueryFinished {
                tab_id,
                job_id,
                elapsed,
                result,
            } => {
                match self.tab_mut(tab_id) {
                    Some(tab) => {
                        if tab.panes.finish_query(job_id, elapsed, result) {
                            debug!("applied {job_id} to {tab_id} after {elapsed:?}");
                        } else {
                            warn!("discarding stale completion of {job_id} for {tab_id}");
                        }
                    }
                    None => warn!("completion of {job_id} arrived for closed {tab_id}"),
                }
                Vec::new()
            }
            AppEvent::ClipboardRead { tab_id, result } => {
                if let Some(tab) = self.tab_mut(tab_id) {
                    match result {
                        Ok(text) => tab.panes.handle_paste(clean_clipboard_text(&text)),
                        Err(message) => tab
                            .panes
                            .set_status(StatusMessage::Error(format!("clipboard: {message}"))),
                    }
                }
                Vec::new()
            }
            AppEvent::Exported { tab_id, result } => {
                if let Some(tab) = self.tab_mut(tab_id) {
                    let message = match result {
                        Ok((rows, path)) => StatusMessage::Info(format!(
                            "Exported {rows} rows to {}",
                            path.display()
                        )),
                        Err(message) => StatusMessage::Error(message),
                    };
                    tab.panes.set_status(message);
                }
                Vec::new()
            }
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        debug!("key {} in {:?}", key_name(&key), self.view);
        if self.modals.is_open() {
            return match self.modals.handle_key(key) {
                Some(outcome) => self.apply_modal_outcome(outcome),
                None => Vec::new(),
            };
        }
        match self.view {
            View::Explorer => self.handle_explorer_key(key),
            View::Connected => self.handle_tab_key(key),
        }
    }

    fn handle_paste(&mut self, text: &str) -> Vec<Effect> {
        let text = normalize_line_endings(text);
        if self.modals.is_open() {
            return match self.modals.handle_paste(&text) {
                Some(outcome) => self.apply_modal_outcome(outcome),
                None => Vec::new(),
            };
        }
        if self.view == View::Connected {
            if let Some(tab) = self.current_tab_mut() {
                tab.panes.handle_paste(&text);
            }
        }
        Vec::new()
    }

    fn handle_explorer_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        let Some(command) = map_explorer_key(key) else {
            return Vec::new();
        };
        match command {
            ExplorerCommand::Quit => self.should_quit = true,
            ExplorerCommand::Up => self.explorer.move_up(),
            ExplorerCommand::Down => self.explorer.move_down(),
            ExplorerCommand::Home => self.explorer.move_home(),
            ExplorerCommand::End => self.explorer.move_end(),
            ExplorerCommand::NewConnection => {
                let form = ConnectionForm::new(self.driver_choices());
                self.modals.open(Modal::ConnectionForm(form));
            }
            ExplorerCommand::EditConnection => {
                if let Some(selected) = self.explorer.selected() {
                    let form = ConnectionForm::edit(selected, self.driver_choices());
                    self.modals.open(Modal::ConnectionForm(form));
                }
            }
            ExplorerCommand::DeleteConnection => self.delete_selected(),
            ExplorerCommand::ChangePassword => {
                self.modals.open(Modal::PasswordPrompt(PasswordPrompt::new(
                    PasswordPurpose::Change,
                )));
            }
            ExplorerCommand::Connect => return self.connect_selected(),
            ExplorerCommand::Back => {
                if let Some(pending) = self.pending_connect.take() {
                    info!("abandoned connect {} to {}", pending.job_id, pending.connection.name);
                    self.explorer.set_status(ExplorerStatus::Info(format!(
                        "Stopped waiting for {}",
                        pending.connection.name
                    )));
                } else if self.current_tab.is_some() {
                    self.view = View::Connected;
                }
            }
        }
        Vec::new()
    }

    fn handle_tab_key(&mut self, key: KeyEvent) -> Vec<Effect> {
        let command = map_tab_key(key);
        match command {
            Some(TabCommand::CloseTab) => return self.close_current_tab(),
            Some(TabCommand::ShowExplorer) => {
                self.view = View::Explorer;
                return Vec::new();
            }
            Some(TabCommand::PreviousTab) => {
                self.switch_tab(false);
                return Vec::new();
            }
            Some(TabCommand::NextTab) => {
                self.switch_tab(true);
                return Vec::new();
            }
            _ => {}
        }

        let Some(index) = self.current_tab else {
            self.view = View::Explorer;
            return Vec::new();
        };
        let Some(command) = command else {
            self.tabs[index].panes.handle_key(key);
            return Vec::new();
        };

        match command {
            TabCommand::CycleFocus => self.tabs[index].panes.cycle_focus(),
            TabCommand::Execute => {
                let prepared = self.tabs[index].panes.prepare_execute();
                match prepared {
                    Ok(sql) => return self.start_query(index, sql, 0, FetchMode::Replace),
                    Err(rejection) => self.reject_query(index, rejection),
                }
            }
            TabCommand::LoadMore => {
                let prepared = self.tabs[index].panes.prepare_load_more();
                match prepared {
                    Ok((sql, offset)) => {
                        return self.start_query(index, sql, offset, FetchMode::Append)
                    }
                    Err(rejection) => self.reject_query(index, rejection),
                }
            }
            TabCommand::Cancel => {
                let tab = &mut self.tabs[index];
                if let Some(job_id) = tab.panes.cancel_query() {
                    info!("cancelled {job_id} on {}", tab.id);
                }
            }
            TabCommand::RefreshSchema => return self.load_schemas(index),
            TabCommand::Export => return self.export_results(index),
            TabCommand::PasteClipboard => {
                return vec![Effect::ReadClipboard {
                    tab_id: self.tabs[index].id,
                }];
            }
            TabCommand::CloseTab
            | TabCommand::ShowExplorer
            | TabCommand::PreviousTab
            | TabCommand::NextTab => {}
        }
        Vec::new()
    }

    fn export_results(&mut self, index: usize) -> Vec<Effect> {
        let export_dir = self.settings.export_dir();
        let tab = &mut self.tabs[index];
        let exportable = {
            let results = tab.panes.results();
            results.is_loaded() && !results.columns().is_empty()
        };
        if !exportable {
            tab.panes
                .set_status(StatusMessage::Info("No results to export".to_string()));
            return Vec::new();
        }
        let results = tab.panes.results();
        vec![Effect::ExportCsv {
            tab_id: tab.id,
            path: csv_export_path(&export_dir, &tab.connection.name),
            columns: results.columns().to_vec(),
            rows: results.rows().to_vec(),
        }]
    }

    fn start_query(
        &mut self,
        index: usize,
        sql: String,
        offset: usize,
        mode: FetchMode,
    ) -> Vec<Effect> {
        let job = QueryJob::start(self.job_ids.next_id(), sql, mode);
        let tab = &mut self.tabs[index];
        debug!("dispatching {} on {} at offset {offset}", job.id, tab.id);
        let effect = Effect::RunQuery {
            tab_id: tab.id,
            job_id: job.id,
            session: Arc::clone(&tab.session),
            sql: job.sql.clone(),
            limit: self.settings.query_page_size,
            offset,
            cancel: job.cancellation.clone(),
        };
        tab.panes.begin_query(job);
        vec![effect]
    }

    fn reject_query(&mut self, index: usize, rejection: QueryRejection) {
        let message = match rejection {
            QueryRejection::AlreadyRunning => "A query is already running (Ctrl+C to cancel)",
            QueryRejection::EmptyEditor => "Nothing to execute",
            QueryRejection::NothingToLoad => "No more rows to load",
        };
        debug!("rejected query on {}: {message}", self.tabs[index].id);
        self.tabs[index]
            .panes
            .set_status(StatusMessage::Info(message.to_string()));
    }

    fn load_schemas(&mut self, index: usize) -> Vec<Effect> {
        let tab = &mut self.tabs[index];
        if tab.panes.schema_loading() {
            return Vec::new();
        }
        let job_id = self.job_ids.next_id();
        tab.panes.begin_schema_load(job_id);
        vec![Effect::LoadSchemas {
            tab_id: tab.id,
            job_id,
            session: Arc::clone(&tab.session),
        }]
    }

    fn connect_selected(&mut self) -> Vec<Effect> {
        let Some(connection) = self.explorer.selected().cloned() else {
            return Vec::new();
        };
        if let Some(pending) = &self.pending_connect {
            self.explorer.set_status(ExplorerStatus::Connecting(
                pending.connection.name.clone(),
            ));
            return Vec::new();
        }
        if let Some(index) = self
            .tabs
            .iter()
            .position(|tab| tab.connection.id == connection.id)
        {
            self.current_tab = Some(index);
            self.view = View::Connected;
            return Vec::new();
        }

        let driver = match self.drivers.get(&connection.driver) {
            Ok(driver) => driver,
            Err(err) => {
                self.explorer.set_status(ExplorerStatus::Error(err.to_string()));
                return Vec::new();
            }
        };

        let job_id = self.job_ids.next_id();
        info!("connecting to {} ({job_id})", connection.name);
        self.explorer
            .set_status(ExplorerStatus::Connecting(connection.name.clone()));
        let effect = Effect::Connect {
            job_id,
            connection_id: connection.id.clone(),
            driver,
            config: connection.conn_config(),
            timeout: connection.timeout().or_else(|| self.settings.default_timeout()),
        };
        self.pending_connect = Some(PendingConnect { job_id, connection });
        vec![effect]
    }

    fn on_connected(
        &mut self,
        job_id: JobId,
        connection_id: &str,
        result: Result<Arc<dyn DbSession>, String>,
    ) -> Vec<Effect> {
        let pending = match self.pending_connect.take() {
            Some(pending) if pending.job_id == job_id => pending,
            other => {
                self.pending_connect = other;
                warn!("discarding abandoned connect {job_id} for {connection_id}");
                return match result {
                    Ok(session) => vec![Effect::CloseSession {
                        connection_id: connection_id.to_string(),
                        session,
                    }],
                    Err(_) => Vec::new(),
                };
            }
        };

        match result {
            Ok(session) => self.open_tab(pending.connection, session),
            Err(message) => {
                warn!("connect to {} failed: {message}", pending.connection.name);
                self.view = View::Explorer;
                self.explorer.set_status(ExplorerStatus::Error(message));
                Vec::new()
            }
        }
    }

    fn open_tab(
        &mut self,
        connection: SavedConnection,
        session: Arc<dyn DbSession>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(previous) = self.registry.insert(connection.id.clone(), session) {
            effects.push(Effect::CloseSession {
                connection_id: connection.id.clone(),
                session: previous,
            });
        }
        let Some(session) = self.registry.checkout(&connection.id) else {
            return effects;
        };

        self.next_tab_id += 1;
        let tab_id = TabId(self.next_tab_id);
        info!("opened {tab_id} for {}", connection.name);
        self.tabs.push(Tab::new(tab_id, connection, session));
        let index = self.tabs.len() - 1;
        self.current_tab = Some(index);
        self.view = View::Connected;
        self.explorer.set_status(ExplorerStatus::Idle);
        self.relayout();

        effects.extend(self.load_schemas(index));
        effects
    }

    fn close_current_tab(&mut self) -> Vec<Effect> {
        let Some(index) = self.current_tab else {
            self.view = View::Explorer;
            return Vec::new();
        };
        let mut tab = self.tabs.remove(index);
        tab.panes.cancel_query();
        info!("closed {} for {}", tab.id, tab.connection.name);

        if self.tabs.is_empty() {
            self.current_tab = None;
            self.view = View::Explorer;
        } else {
            self.current_tab = Some(index.min(self.tabs.len() - 1));
        }

        match self.registry.remove(&tab.connection.id) {
            Some(session) => vec![Effect::CloseSession {
                connection_id: tab.connection.id,
                session,
            }],
            None => Vec::new(),
        }
    }

    fn switch_tab(&mut self, forward: bool) {
        let Some(index) = self.current_tab else {
            return;
        };
        let count = self.tabs.len();
        self.current_tab = Some(if forward {
            (index + 1) % count
        } else {
            (index + count - 1) % count
        });
    }

    fn delete_selected(&mut self) {
        let Some(selected) = self.explorer.selected().cloned() else {
            return;
        };
        match self.store.delete(&selected.id) {
            Ok(()) => {
                info!("deleted connection {}", selected.name);
                self.refresh_explorer();
                self.explorer
                    .set_status(ExplorerStatus::Info(format!("Deleted {}", selected.name)));
            }
            Err(err) => {
                warn!("failed to delete {}: {err}", selected.name);
                self.explorer.set_status(ExplorerStatus::Error(err.to_string()));
            }
        }
    }

    fn apply_modal_outcome(&mut self, outcome: ModalOutcome) -> Vec<Effect> {
        match outcome {
            ModalOutcome::ConnectionSubmitted {
                connection,
                is_edit,
            } => {
                let saved = if is_edit {
                    self.store.update(connection.clone())
                } else {
                    self.store.add(connection.clone())
                };
                match saved {
                    Ok(()) => {
                        info!("saved connection {}", connection.name);
                        self.sync_open_tab(&connection);
                        self.refresh_explorer();
                        self.explorer.select_id(&connection.id);
                        self.explorer.set_status(ExplorerStatus::Info(format!(
                            "Saved {}",
                            connection.name
                        )));
                    }
                    Err(err) => {
                        warn!("failed to save {}: {err}", connection.name);
                        self.explorer.set_status(ExplorerStatus::Error(err.to_string()));
                    }
                }
            }
            ModalOutcome::PasswordSubmitted { password, purpose } => {
                if purpose == PasswordPurpose::Change {
                    let status = match self.store.change_password(&password) {
                        Ok(()) => ExplorerStatus::Info("Master password changed".to_string()),
                        Err(err) => ExplorerStatus::Error(err.to_string()),
                    };
                    self.explorer.set_status(status);
                }
            }
            ModalOutcome::Dismissed => {}
        }
        Vec::new()
    }

    /// Keeps an open tab's copy of a connection in line with what was saved.
    fn sync_open_tab(&mut self, connection: &SavedConnection) {
        if let Some(tab) = self
            .tabs
            .iter_mut()
            .find(|tab| tab.connection.id == connection.id)
        {
            tab.connection = connection.clone();
            tab.panes.set_connection_info(connection_info(connection));
        }
    }

    fn refresh_explorer(&mut self) {
        self.explorer.set_connections(self.store.list().to_vec());
    }

    fn driver_choices(&self) -> Vec<DriverChoice> {
        self.drivers
            .names()
            .into_iter()
            .map(|name| DriverChoice {
                default_port: self.drivers.default_port(&name).unwrap_or_default(),
                name,
            })
            .collect()
    }

    fn relayout(&mut self) {
        let (width, height) = self.size;
        self.explorer.set_height(usize::from(height));
        let layout = connected_layout(
            Rect::new(0, 0, width, height),
            self.settings.schema_pane_percent,
            self.debug,
        );
        let (schema_rows, editor_rows, results_rows) = layout.viewport_rows();
        for tab in &mut self.tabs {
            tab.panes
                .set_viewport(schema_rows, editor_rows, results_rows);
        }
    }

    fn tab_mut(&mut self, tab_id: TabId) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|tab| tab.id == tab_id)
    }

    fn current_tab_mut(&mut self) -> Option<&mut Tab> {
        self.tabs.get_mut(self.current_tab?)
    }
}
