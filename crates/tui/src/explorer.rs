use quarry_core::store::SavedConnection;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Rows used by the title, hints and status around the connection list.
const RESERVED_ROWS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplorerStatus {
    Idle,
    Info(String),
    Connecting(String),
    Error(String),
}

/// Saved-connection list shown before any tab is open.
#[derive(Debug, Clone)]
pub struct Explorer {
    connections: Vec<SavedConnection>,
    cursor: usize,
    scroll: usize,
    height: usize,
    status: ExplorerStatus,
}

impl Explorer {
    #[must_use]
    pub fn new(connections: Vec<SavedConnection>) -> Self {
        Self {
            connections,
            cursor: 0,
            scroll: 0,
            height: 0,
            status: ExplorerStatus::Idle,
        }
    }

    #[must_use]
    pub fn connections(&self) -> &[SavedConnection] {
        &self.connections
    }

    /// Replaces the list, keeping the cursor on a valid row.
    pub fn set_connections(&mut self, connections: Vec<SavedConnection>) {
        self.connections = connections;
        self.cursor = self.cursor.min(self.connections.len().saturating_sub(1));
        self.ensure_cursor_visible();
    }

    #[must_use]
    pub fn selected(&self) -> Option<&SavedConnection> {
        self.connections.get(self.cursor)
    }

    pub fn select_id(&mut self, id: &str) {
        if let Some(index) = self.connections.iter().position(|conn| conn.id == id) {
            self.cursor = index;
            self.ensure_cursor_visible();
        }
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn scroll(&self) -> usize {
        self.scroll
    }

    #[must_use]
    pub fn status(&self) -> &ExplorerStatus {
        &self.status
    }

    pub fn set_status(&mut self, status: ExplorerStatus) {
        self.status = status;
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
        self.ensure_cursor_visible();
    }

    pub fn move_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
        self.ensure_cursor_visible();
    }

    pub fn move_down(&mut self) {
        self.cursor = (self.cursor + 1).min(self.connections.len().saturating_sub(1));
        self.ensure_cursor_visible();
    }

    pub fn move_home(&mut self) {
        self.cursor = 0;
        self.ensure_cursor_visible();
    }

    pub fn move_end(&mut self) {
        self.cursor = self.connections.len().saturating_sub(1);
        self.ensure_cursor_visible();
    }

    fn visible_rows(&self) -> usize {
        self.height.saturating_sub(RESERVED_ROWS).max(1)
    }

    fn ensure_cursor_visible(&mut self) {
        let visible = self.visible_rows();
        if self.cursor < self.scroll {
            self.scroll = self.cursor;
        } else if self.cursor >= self.scroll + visible {
            self.scroll = self.cursor + 1 - visible;
        }
    }

    #[must_use]
    pub fn render_lines(&self, width: usize) -> Vec<Line<'static>> {
        let mut lines = vec![
            Line::from(Span::styled(
                "  Quarry - Database Connections",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];

        if self.connections.is_empty() {
            lines.push(Line::from("  No saved connections."));
            lines.push(Line::from(""));
            lines.push(Line::from("  Press 'n' to create a new connection."));
        } else {
            let end = (self.scroll + self.visible_rows()).min(self.connections.len());
            for (index, conn) in self
                .connections
                .iter()
                .enumerate()
                .take(end)
                .skip(self.scroll)
            {
                let selected = index == self.cursor;
                let marker = if selected { "> " } else { "  " };
                let mut text = format!(
                    "{marker}{:<25}  {} @ {}:{}",
                    conn.name, conn.driver, conn.host, conn.port
                );
                text.truncate(text.char_indices().nth(width).map_or(text.len(), |(at, _)| at));
                let style = if selected {
                    Style::default()
                        .fg(Color::Yellow)
                        .bg(Color::DarkGray)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                lines.push(Line::from(Span::styled(text, style)));
            }

            if self.connections.len() > self.visible_rows() {
                lines.push(Line::from(""));
                lines.push(Line::from(Span::styled(
                    format!(
                        "  Showing {}-{} of {}",
                        self.scroll + 1,
                        end,
                        self.connections.len()
                    ),
                    Style::default().fg(Color::DarkGray),
                )));
            }
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "  ↑/↓: navigate  Enter: connect  n: new  e: edit  d: delete  p: password  q: quit",
            Style::default().fg(Color::DarkGray),
        )));

        match &self.status {
            ExplorerStatus::Idle => {}
            ExplorerStatus::Info(message) => lines.push(Line::from(format!("  {message}"))),
            ExplorerStatus::Connecting(name) => lines.push(Line::from(Span::styled(
                format!("  Connecting to {name}… (Esc to abandon)"),
                Style::default().fg(Color::Yellow),
            ))),
            ExplorerStatus::Error(message) => lines.push(Line::from(Span::styled(
                format!("  Error: {message}"),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ))),
        }

        lines
    }
}
