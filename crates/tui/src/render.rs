use quarry_core::results_grid::{fit_to_width, sanitize_cell, ResultsGrid, COLUMN_SEPARATOR};
use quarry_core::text_buffer::TextBuffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;

use crate::panes::{Pane, PaneCollection, StatusMessage, Tab};
use crate::workspace::{View, Workspace};

const MODAL_WIDTH_PERCENT: u16 = 70;
const MODAL_HEIGHT_PERCENT: u16 = 80;
const EDITOR_HELP: &str =
    "Ctrl+Enter: run  Ctrl+C: cancel  Ctrl+L: more  Ctrl+S: export  Ctrl+V: paste  Tab: focus";

/// Areas of the connected view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedLayout {
    pub debug: Option<Rect>,
    pub tabs: Rect,
    pub schema: Rect,
    pub editor: Rect,
    pub results: Rect,
    pub status: Rect,
}

impl ConnectedLayout {
    /// Content rows of the schema, editor and results panes inside their
    /// borders.
    #[must_use]
    pub fn viewport_rows(&self) -> (usize, usize, usize) {
        let inner = |area: Rect| usize::from(area.height.saturating_sub(2));
        (inner(self.schema), inner(self.editor), inner(self.results))
    }
}

#[must_use]
pub fn connected_layout(area: Rect, schema_percent: u16, debug: bool) -> ConnectedLayout {
    let mut constraints = Vec::with_capacity(4);
    if debug {
        constraints.push(Constraint::Length(1));
    }
    constraints.extend([
        Constraint::Length(1),
        Constraint::Min(3),
        Constraint::Length(1),
    ]);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(area);
    let (debug_area, rest) = if debug {
        (Some(rows[0]), &rows[1..])
    } else {
        (None, &rows[..])
    };

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(schema_percent),
            Constraint::Percentage(100 - schema_percent),
        ])
        .split(rest[1]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[1]);

    ConnectedLayout {
        debug: debug_area,
        tabs: rest[0],
        schema: columns[0],
        editor: right[0],
        results: right[1],
        status: rest[2],
    }
}

pub fn draw(frame: &mut Frame<'_>, workspace: &Workspace) {
    let area = frame.area();
    if let Some(modal) = workspace.modals().active() {
        draw_popup(frame, modal.title(), modal.render_lines());
        return;
    }

    match (workspace.view(), workspace.current_tab()) {
        (View::Connected, Some(tab)) => draw_connected(frame, workspace, tab, area),
        _ => {
            let explorer =
                Paragraph::new(workspace.explorer().render_lines(usize::from(area.width)));
            frame.render_widget(explorer, area);
        }
    }
}

/// Clears the frame and draws `lines` in a centered bordered box.
pub fn draw_popup(frame: &mut Frame<'_>, title: &str, lines: Vec<Line<'static>>) {
    let area = frame.area();
    frame.render_widget(Clear, area);
    let popup = centered_rect(MODAL_WIDTH_PERCENT, MODAL_HEIGHT_PERCENT, area);
    let body = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(title.to_string()),
    );
    frame.render_widget(body, popup);
}

fn draw_connected(frame: &mut Frame<'_>, workspace: &Workspace, tab: &Tab, area: Rect) {
    let layout = connected_layout(
        area,
        workspace.settings().schema_pane_percent,
        workspace.debug(),
    );
    let panes = &tab.panes;

    if let Some(debug_area) = layout.debug {
        let info = format!(
            "DEBUG: FocusedPane={} | Dimensions={}x{} | LeftWidth={}%",
            panes.focus().name(),
            area.width,
            area.height,
            workspace.settings().schema_pane_percent
        );
        frame.render_widget(
            Paragraph::new(info).style(
                Style::default()
                    .fg(Color::White)
                    .bg(Color::Magenta)
                    .add_modifier(Modifier::BOLD),
            ),
            debug_area,
        );
    }

    frame.render_widget(Paragraph::new(tab_bar(workspace)), layout.tabs);

    let (schema_rows, _, _) = layout.viewport_rows();
    frame.render_widget(
        Paragraph::new(schema_lines(panes, schema_rows)).block(pane_block(
            panes,
            Pane::Schema,
            "Schema".to_string(),
        )),
        layout.schema,
    );
    frame.render_widget(
        Paragraph::new(editor_lines(panes.editor(), panes.focus() == Pane::Editor))
            .block(pane_block(panes, Pane::Editor, "Query".to_string())),
        layout.editor,
    );
    let results_title = format!("Results ({} rows)", panes.results().row_count());
    frame.render_widget(
        Paragraph::new(results_lines(
            panes.results(),
            usize::from(layout.results.width.saturating_sub(2)),
        ))
        .block(pane_block(panes, Pane::Results, results_title)),
        layout.results,
    );
    frame.render_widget(
        Paragraph::new(status_line(panes, usize::from(layout.status.width)))
            .style(Style::default().bg(Color::Black)),
        layout.status,
    );
}

fn pane_block(panes: &PaneCollection, pane: Pane, title: String) -> Block<'static> {
    let color = if panes.focus() == pane {
        Color::Cyan
    } else {
        Color::DarkGray
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(title)
}

fn tab_bar(workspace: &Workspace) -> Line<'static> {
    let mut spans = Vec::new();
    for (index, tab) in workspace.tabs().iter().enumerate() {
        let label = format!(" {}:{} ", index + 1, tab.title());
        let style = if Some(index) == workspace.current_index() {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(
        "Ctrl+T: explorer  Ctrl+W: close  Alt+←/→: switch",
        Style::default().fg(Color::DarkGray),
    ));
    Line::from(spans)
}

/// Schema tree rows, or a placeholder until the first listing arrives.
#[must_use]
pub fn schema_lines(panes: &PaneCollection, rows: usize) -> Vec<Line<'static>> {
    let hint = Style::default().fg(Color::DarkGray);
    if !panes.schemas_loaded() {
        let text = if panes.schema_loading() {
            "Loading schemas..."
        } else {
            "No schemas loaded (F5 to refresh)"
        };
        return vec![Line::from(Span::styled(text, hint))];
    }

    let tree = panes.tree();
    if tree.visible_len() == 0 {
        return vec![Line::from(Span::styled("No schemas", hint))];
    }

    tree.visible_window(rows)
        .into_iter()
        .enumerate()
        .map(|(offset, visible)| {
            let marker = match (visible.node.has_children(), visible.node.expanded) {
                (true, true) => "▾ ",
                (true, false) => "▸ ",
                (false, _) => "  ",
            };
            let text = format!("{}{marker}{}", "  ".repeat(visible.depth), visible.node.label);
            if tree.cursor() == Some(tree.scroll() + offset) {
                Line::from(Span::styled(
                    text,
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::REVERSED),
                ))
            } else {
                Line::from(text)
            }
        })
        .collect()
}

/// Numbered editor rows with a block cursor when focused, then help.
#[must_use]
pub fn editor_lines(buffer: &TextBuffer, focused: bool) -> Vec<Line<'static>> {
    let (cursor_row, cursor_col) = buffer.cursor();
    let gutter = Style::default().fg(Color::DarkGray);
    let mut lines = buffer
        .lines()
        .iter()
        .enumerate()
        .skip(buffer.scroll_top())
        .take(buffer.visible_rows())
        .map(|(row, text)| {
            let mut spans = vec![Span::styled(format!("{:>3} ", row + 1), gutter)];
            if focused && row == cursor_row {
                let before = text.chars().take(cursor_col).collect::<String>();
                let at = text.chars().nth(cursor_col).unwrap_or(' ');
                let after = text.chars().skip(cursor_col + 1).collect::<String>();
                spans.push(Span::raw(before));
                spans.push(Span::styled(
                    at.to_string(),
                    Style::default().add_modifier(Modifier::REVERSED),
                ));
                spans.push(Span::raw(after));
            } else {
                spans.push(Span::raw(text.clone()));
            }
            Line::from(spans)
        })
        .collect::<Vec<_>>();

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(EDITOR_HELP, gutter)));
    lines
}

/// Header, separator, visible rows and a position footer.
#[must_use]
pub fn results_lines(grid: &ResultsGrid, width: usize) -> Vec<Line<'static>> {
    let hint = Style::default().fg(Color::DarkGray);
    if !grid.is_loaded() {
        return vec![Line::from(Span::styled("No query executed yet", hint))];
    }
    if grid.columns().is_empty() {
        return vec![Line::from(format!(
            "Statement OK, {} rows affected",
            grid.row_count()
        ))];
    }

    let widths = grid.column_widths(width);
    let header = grid
        .columns()
        .iter()
        .zip(&widths)
        .map(|(column, width)| fit_to_width(&sanitize_cell(column), *width))
        .collect::<Vec<_>>()
        .join(COLUMN_SEPARATOR);
    let mut lines = vec![
        Line::from(Span::styled(
            header,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled("─".repeat(width), hint)),
    ];

    let mut last_shown = grid.scroll();
    for (index, row) in grid.visible_window() {
        let text = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| fit_to_width(&sanitize_cell(&cell.to_string()), *width))
            .collect::<Vec<_>>()
            .join(COLUMN_SEPARATOR);
        let style = if index == grid.cursor() {
            Style::default().bg(Color::DarkGray)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(text, style)));
        last_shown = index + 1;
    }

    lines.push(Line::from(""));
    let footer = if grid.rows().is_empty() {
        "No rows".to_string()
    } else if grid.has_more() {
        format!(
            "Showing {}-{} of {}+ rows (Ctrl+L to load more)",
            grid.scroll() + 1,
            last_shown,
            grid.rows().len()
        )
    } else {
        format!(
            "Showing {}-{} of {} rows",
            grid.scroll() + 1,
            last_shown,
            grid.rows().len()
        )
    };
    lines.push(Line::from(Span::styled(footer, hint)));
    lines
}

/// Connection info on the left, the latest outcome right-aligned.
#[must_use]
pub fn status_line(panes: &PaneCollection, width: usize) -> Line<'static> {
    let status = panes.status();
    let left = format!(" {} ", status.connection_info());
    let right = format!("{} ", status.right_text());
    let right_style = match status.message() {
        StatusMessage::Error(_) => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        StatusMessage::Cancelled => Style::default().fg(Color::Yellow),
        StatusMessage::Running => Style::default().fg(Color::Cyan),
        StatusMessage::Completed { .. } => Style::default().fg(Color::Green),
        StatusMessage::Idle | StatusMessage::Info(_) => Style::default().fg(Color::Gray),
    };
    let used = left.chars().count() + right.chars().count();
    Line::from(vec![
        Span::styled(left, Style::default().fg(Color::Gray)),
        Span::raw(" ".repeat(width.saturating_sub(used))),
        Span::styled(right, right_style),
    ])
}

fn centered_rect(width_percent: u16, height_percent: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100_u16 - height_percent) / 2),
            Constraint::Percentage(height_percent),
            Constraint::Percentage((100_u16 - height_percent) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100_u16 - width_percent) / 2),
            Constraint::Percentage(width_percent),
            Constraint::Percentage((100_u16 - width_percent) / 2),
        ])
        .split(vertical[1])[1]
}
