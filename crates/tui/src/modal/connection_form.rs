use crossterm::event::{KeyCode, KeyEvent};
use quarry_core::store::{new_connection_id, SavedConnection};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::keys::{is_ctrl, printable};

const EMPTY_VALUE: &str = "____________";
const LABEL_WIDTH: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Driver,
    Host,
    Port,
    Username,
    Password,
    Database,
    Timeout,
}

const FIELDS: [FormField; 8] = [
    FormField::Name,
    FormField::Driver,
    FormField::Host,
    FormField::Port,
    FormField::Username,
    FormField::Password,
    FormField::Database,
    FormField::Timeout,
];

impl FormField {
    fn label(self) -> &'static str {
        match self {
            Self::Name => "Connection Name",
            Self::Driver => "Driver",
            Self::Host => "Host",
            Self::Port => "Port",
            Self::Username => "Username",
            Self::Password => "Password",
            Self::Database => "Database",
            Self::Timeout => "Timeout (s)",
        }
    }

    fn index(self) -> usize {
        FIELDS
            .iter()
            .position(|field| *field == self)
            .unwrap_or_default()
    }
}

/// A selectable driver and the port it listens on by default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverChoice {
    pub name: String,
    pub default_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormState {
    Open,
    Submitted,
    Dismissed,
}

/// New/edit form for a saved connection.
#[derive(Debug, Clone)]
pub struct ConnectionForm {
    editing_id: Option<String>,
    values: [String; FIELDS.len()],
    focus: FormField,
    drivers: Vec<DriverChoice>,
    driver_index: usize,
    error: Option<String>,
    state: FormState,
    submission: Option<SavedConnection>,
}

impl ConnectionForm {
    #[must_use]
    pub fn new(drivers: Vec<DriverChoice>) -> Self {
        let mut form = Self {
            editing_id: None,
            values: Default::default(),
            focus: FormField::Name,
            drivers,
            driver_index: 0,
            error: None,
            state: FormState::Open,
            submission: None,
        };
        form.set(FormField::Host, "localhost");
        form.set(FormField::Timeout, "0");
        if let Some(choice) = form.drivers.first().cloned() {
            form.set(FormField::Driver, &choice.name);
            form.set(FormField::Port, &choice.default_port.to_string());
        }
        form
    }

    /// A form prefilled from `connection`; submitting keeps its id.
    #[must_use]
    pub fn edit(connection: &SavedConnection, mut drivers: Vec<DriverChoice>) -> Self {
        let driver_index = match drivers
            .iter()
            .position(|choice| choice.name == connection.driver)
        {
            Some(index) => index,
            None => {
                drivers.push(DriverChoice {
                    name: connection.driver.clone(),
                    default_port: connection.port,
                });
                drivers.len() - 1
            }
        };

        let mut form = Self::new(drivers);
        form.editing_id = Some(connection.id.clone());
        form.driver_index = driver_index;
        form.set(FormField::Name, &connection.name);
        form.set(FormField::Driver, &connection.driver);
        form.set(FormField::Host, &connection.host);
        form.set(FormField::Port, &connection.port.to_string());
        form.set(FormField::Username, &connection.username);
        form.set(FormField::Password, &connection.password);
        form.set(FormField::Database, &connection.database);
        form.set(FormField::Timeout, &connection.timeout_secs.to_string());
        form
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == FormState::Open
    }

    #[must_use]
    pub fn is_edit(&self) -> bool {
        self.editing_id.is_some()
    }

    #[must_use]
    pub fn focus(&self) -> FormField {
        self.focus
    }

    #[must_use]
    pub fn value(&self, field: FormField) -> &str {
        &self.values[field.index()]
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The validated connection, handed out once after Enter.
    pub fn take_submission(&mut self) -> Option<SavedConnection> {
        let submission = self.submission.take();
        if submission.is_some() {
            self.state = FormState::Dismissed;
        }
        submission
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if !self.is_open() {
            return;
        }
        if key.code == KeyCode::Esc || is_ctrl(&key, 'c') {
            self.state = FormState::Dismissed;
            return;
        }
        if is_ctrl(&key, 'u') {
            if self.focus != FormField::Driver {
                self.values[self.focus.index()].clear();
            }
            return;
        }

        match key.code {
            KeyCode::Tab | KeyCode::Down => self.move_focus(1),
            KeyCode::BackTab | KeyCode::Up => self.move_focus(FIELDS.len() - 1),
            KeyCode::Left if self.focus == FormField::Driver => self.cycle_driver(false),
            KeyCode::Right if self.focus == FormField::Driver => self.cycle_driver(true),
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace if self.focus != FormField::Driver => {
                self.values[self.focus.index()].pop();
                self.error = None;
            }
            _ => {
                if let Some(ch) = printable(&key) {
                    self.type_text(&ch.to_string());
                }
            }
        }
    }

    pub fn handle_paste(&mut self, text: &str) {
        if self.is_open() {
            self.type_text(text);
        }
    }

    fn type_text(&mut self, text: &str) {
        if self.focus == FormField::Driver {
            return;
        }
        let value = &mut self.values[self.focus.index()];
        value.extend(text.chars().filter(|ch| !ch.is_control()));
        self.error = None;
    }

    fn set(&mut self, field: FormField, value: &str) {
        self.values[field.index()] = value.to_string();
    }

    fn move_focus(&mut self, step: usize) {
        let next = (self.focus.index() + step) % FIELDS.len();
        self.focus = FIELDS[next];
    }

    fn cycle_driver(&mut self, forward: bool) {
        if self.drivers.is_empty() {
            return;
        }
        let previous_port = self.drivers[self.driver_index].default_port.to_string();
        let count = self.drivers.len();
        self.driver_index = if forward {
            (self.driver_index + 1) % count
        } else {
            (self.driver_index + count - 1) % count
        };

        let choice = self.drivers[self.driver_index].clone();
        self.set(FormField::Driver, &choice.name);
        let port = self.value(FormField::Port).trim();
        if port.is_empty() || port == previous_port {
            self.set(FormField::Port, &choice.default_port.to_string());
        }
    }

    fn submit(&mut self) {
        match self.build_connection() {
            Ok(connection) => {
                self.error = None;
                self.submission = Some(connection);
                self.state = FormState::Submitted;
            }
            Err(message) => self.error = Some(message),
        }
    }

    fn build_connection(&self) -> Result<SavedConnection, String> {
        let name = self.value(FormField::Name).trim();
        if name.is_empty() {
            return Err("Connection name is required".to_string());
        }
        let driver = self.value(FormField::Driver).trim();
        if driver.is_empty() {
            return Err("No database driver available".to_string());
        }
        let host = self.value(FormField::Host).trim();
        if host.is_empty() {
            return Err("Host is required".to_string());
        }
        let port = self
            .value(FormField::Port)
            .trim()
            .parse::<u16>()
            .ok()
            .filter(|port| *port > 0)
            .ok_or_else(|| "Port must be a number between 1 and 65535".to_string())?;
        let timeout = self.value(FormField::Timeout).trim();
        let timeout_secs = if timeout.is_empty() {
            0
        } else {
            timeout
                .parse::<u64>()
                .map_err(|_| "Timeout must be a whole number of seconds".to_string())?
        };

        Ok(SavedConnection {
            id: self.editing_id.clone().unwrap_or_else(new_connection_id),
            name: name.to_string(),
            driver: driver.to_string(),
            host: host.to_string(),
            port,
            username: self.value(FormField::Username).trim().to_string(),
            password: self.value(FormField::Password).to_string(),
            database: self.value(FormField::Database).trim().to_string(),
            timeout_secs,
        })
    }

    #[must_use]
    pub fn title(&self) -> &'static str {
        if self.is_edit() {
            "Edit Connection"
        } else {
            "New Connection"
        }
    }

    #[must_use]
    pub fn render_lines(&self) -> Vec<Line<'static>> {
        let focused = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        let input = Style::default().bg(Color::DarkGray);
        let mut lines = vec![
            Line::from(Span::styled(self.title(), focused)),
            Line::from(""),
        ];

        for field in FIELDS {
            let raw = self.value(field);
            let shown = if raw.is_empty() {
                EMPTY_VALUE.to_string()
            } else if field == FormField::Password {
                "*".repeat(raw.chars().count())
            } else if field == FormField::Driver && self.drivers.len() > 1 {
                format!("◀ {raw} ▶")
            } else {
                raw.to_string()
            };
            let label = format!("{:<LABEL_WIDTH$}", format!("{}:", field.label()));

            if field == self.focus {
                lines.push(Line::from(vec![
                    Span::styled(format!("> {label}"), focused),
                    Span::styled(format!(" {shown} "), input.patch(focused)),
                ]));
            } else {
                lines.push(Line::from(vec![
                    Span::raw(format!("  {label}")),
                    Span::styled(format!(" {shown} "), input),
                ]));
            }
        }

        if let Some(error) = &self.error {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Tab/↑↓: navigate  ←/→: driver  Ctrl+U: clear field  Enter: save  Esc: cancel",
            Style::default().fg(Color::DarkGray),
        )));
        lines
    }
}
