use std::fmt::Write as _;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::driver::{Cell, QueryResult};

pub const MAX_COLUMN_WIDTH: usize = 30;
pub const MIN_COLUMN_WIDTH: usize = 4;
pub const WIDTH_SAMPLE_ROWS: usize = 200;
pub const COLUMN_SEPARATOR: &str = " │ ";
pub const PAGE_STEP: usize = 10;
/// Title, header, separator and footer rows.
pub const RESERVED_ROWS: usize = 4;

/// Replaces control characters with visible escapes so a cell always
/// renders on one line.
#[must_use]
pub fn sanitize_cell(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            ch if ch.is_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(ch));
            }
            ch => out.push(ch),
        }
    }
    out
}

#[must_use]
pub fn display_width(value: &str) -> usize {
    UnicodeWidthStr::width(value)
}

/// Pads or truncates `value` to exactly `width` terminal columns.
#[must_use]
pub fn fit_to_width(value: &str, width: usize) -> String {
    let current = display_width(value);
    if current <= width {
        let mut padded = value.to_string();
        padded.extend(std::iter::repeat(' ').take(width - current));
        return padded;
    }
    if width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in value.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width > width - 1 {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out.push('…');
    used += 1;
    out.extend(std::iter::repeat(' ').take(width.saturating_sub(used)));
    out
}

/// Smallest width a column may be shrunk to.
#[must_use]
pub fn column_floor(natural: usize) -> usize {
    natural.min(MIN_COLUMN_WIDTH)
}

fn separators_width(columns: usize) -> usize {
    columns.saturating_sub(1) * display_width(COLUMN_SEPARATOR)
}

/// Assigns a width to each column so the row fits in `available` columns.
///
/// Natural widths are used when they fit. Otherwise widths shrink in
/// proportion to their natural share, never below [`column_floor`], and the
/// remainder is handed out one column at a time from the left. Trailing
/// columns that cannot fit even at their floor are dropped, so the result
/// may be shorter than `natural`.
#[must_use]
pub fn solve_column_widths(natural: &[usize], available: usize) -> Vec<usize> {
    if natural.iter().sum::<usize>() + separators_width(natural.len()) <= available {
        return natural.to_vec();
    }

    let floors = natural.iter().map(|width| column_floor(*width)).collect::<Vec<_>>();
    let mut count = natural.len();
    while count > 0 && floors[..count].iter().sum::<usize>() + separators_width(count) > available
    {
        count -= 1;
    }
    if count == 0 {
        return Vec::new();
    }

    let natural = &natural[..count];
    let floors = &floors[..count];
    let budget = available - separators_width(count);
    let total = natural.iter().sum::<usize>();
    if total <= budget {
        return natural.to_vec();
    }

    let mut widths = natural
        .iter()
        .zip(floors)
        .map(|(width, floor)| (width * budget / total).max(*floor))
        .collect::<Vec<_>>();

    let mut used = widths.iter().sum::<usize>();
    while used > budget {
        let widest = widths
            .iter()
            .enumerate()
            .filter(|(index, width)| **width > floors[*index])
            .max_by_key(|(_, width)| **width)
            .map(|(index, _)| index);
        let Some(index) = widest else {
            break;
        };
        widths[index] -= 1;
        used -= 1;
    }

    let mut leftover = budget.saturating_sub(used);
    while leftover > 0 {
        let mut grew = false;
        for (width, natural) in widths.iter_mut().zip(natural) {
            if leftover == 0 {
                break;
            }
            if *width < *natural {
                *width += 1;
                leftover -= 1;
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    widths
}

/// Paginated tabular result viewer state.
#[derive(Debug, Clone, Default)]
pub struct ResultsGrid {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    row_count: usize,
    has_more: bool,
    loaded: bool,
    cursor: usize,
    scroll: usize,
    viewport_height: usize,
}

impl ResultsGrid {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_result(&mut self, result: QueryResult) {
        self.columns = result.columns;
        self.rows = result.rows;
        self.row_count = result.row_count;
        self.has_more = result.has_more;
        self.loaded = true;
        self.cursor = 0;
        self.scroll = 0;
    }

    /// Adds the next page of a result already on screen.
    pub fn append_result(&mut self, result: QueryResult) {
        if !self.loaded || (!result.columns.is_empty() && result.columns != self.columns) {
            self.set_result(result);
            return;
        }
        self.rows.extend(result.rows);
        self.row_count = self.rows.len();
        self.has_more = result.has_more;
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Offset the next page fetch continues from.
    #[must_use]
    pub fn fetched_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn has_more(&self) -> bool {
        self.has_more
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
    pub fn visible_rows(&self) -> usize {
        self.viewport_height.saturating_sub(RESERVED_ROWS).max(1)
    }

    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height;
        self.ensure_cursor_visible();
    }

    pub fn move_up(&mut self) {
        self.move_to(self.cursor.saturating_sub(1));
    }

    pub fn move_down(&mut self) {
        self.move_to(self.cursor + 1);
    }

    pub fn page_up(&mut self) {
        self.move_to(self.cursor.saturating_sub(PAGE_STEP));
    }

    pub fn page_down(&mut self) {
        self.move_to(self.cursor + PAGE_STEP);
    }

    pub fn move_home(&mut self) {
        self.move_to(0);
    }

    pub fn move_end(&mut self) {
        self.move_to(usize::MAX);
    }

    /// Widths for the columns that fit in `available`, measured on a
    /// bounded sample of rows.
    #[must_use]
    pub fn column_widths(&self, available: usize) -> Vec<usize> {
        let mut natural = self
            .columns
            .iter()
            .map(|column| display_width(&sanitize_cell(column)).min(MAX_COLUMN_WIDTH))
            .collect::<Vec<_>>();

        for row in self.rows.iter().take(WIDTH_SAMPLE_ROWS) {
            for (width, cell) in natural.iter_mut().zip(row) {
                let cell_width = display_width(&sanitize_cell(&cell.to_string()));
                *width = (*width).max(cell_width.min(MAX_COLUMN_WIDTH));
            }
        }

        solve_column_widths(&natural, available)
    }

    /// Rows in the scroll window with their absolute index.
    pub fn visible_window(&self) -> impl Iterator<Item = (usize, &[Cell])> {
        self.rows
            .iter()
            .enumerate()
            .skip(self.scroll)
            .take(self.visible_rows())
            .map(|(index, row)| (index, row.as_slice()))
    }

    fn move_to(&mut self, target: usize) {
        self.cursor = target.min(self.rows.len().saturating_sub(1));
        self.ensure_cursor_visible();
    }

    fn ensure_cursor_visible(&mut self) {
        let visible = self.visible_rows();
        if self.cursor < self.scroll {
            self.scroll = self.cursor;
        } else if self.cursor >= self.scroll + visible {
            self.scroll = self.cursor + 1 - visible;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        column_floor, display_width, fit_to_width, sanitize_cell, separators_width,
        solve_column_widths, ResultsGrid, MAX_COLUMN_WIDTH,
    };
    use crate::driver::{Cell, QueryResult};

    fn result(columns: &[&str], rows: usize, has_more: bool) -> QueryResult {
        QueryResult {
            columns: columns.iter().map(|column| (*column).to_string()).collect(),
            rows: (0..rows)
                .map(|index| {
                    columns
                        .iter()
                        .map(|_| Cell::Int(i64::try_from(index).unwrap_or(0)))
                        .collect()
                })
                .collect(),
            row_count: rows,
            has_more,
        }
    }

    #[test]
    fn sanitizer_escapes_control_characters() {
        assert_eq!(sanitize_cell("a\nb\tc\rd\\e"), "a\\nb\\tc\\rd\\\\e");
        assert_eq!(sanitize_cell("bell\u{7}"), "bell\\x07");
        assert_eq!(sanitize_cell("plain ünïcode"), "plain ünïcode");
    }

    #[test]
    fn fit_pads_short_values_and_truncates_long_ones() {
        assert_eq!(fit_to_width("ab", 4), "ab  ");
        assert_eq!(fit_to_width("abcdef", 4), "abc…");
        assert_eq!(display_width(&fit_to_width("日本語テキスト", 5)), 5);
    }

    #[test]
    fn natural_widths_are_used_when_they_fit() {
        assert_eq!(solve_column_widths(&[5, 10, 2], 40), vec![5, 10, 2]);
    }

    #[test]
    fn shrunk_widths_fill_the_budget_exactly() {
        let widths = solve_column_widths(&[30, 30, 10], 40);
        let total = widths.iter().sum::<usize>() + separators_width(widths.len());
        assert_eq!(widths.len(), 3);
        assert_eq!(total, 40);
        assert!(widths[0] >= widths[2]);
    }

    #[test]
    fn trailing_columns_are_dropped_when_floors_cannot_fit() {
        let widths = solve_column_widths(&[20, 20, 20, 20], 12);
        assert_eq!(widths.len(), 2);
        assert!(widths.iter().sum::<usize>() + separators_width(2) <= 12);
        assert!(solve_column_widths(&[20], 0).is_empty());
    }

    #[test]
    fn solver_respects_budget_and_floors_for_many_shapes() {
        let shapes: [&[usize]; 5] = [
            &[30, 30, 30, 30, 30, 30],
            &[1, 30, 2, 30],
            &[0, 0, 8],
            &[12],
            &[4, 4, 4, 25, 3, 30, 17],
        ];
        for natural in shapes {
            for available in 0..120 {
                let widths = solve_column_widths(natural, available);
                let total = widths.iter().sum::<usize>() + separators_width(widths.len());
                assert!(total <= available, "{natural:?} at {available}: {widths:?}");
                for (width, natural) in widths.iter().zip(natural.iter()) {
                    assert!(*width >= column_floor(*natural), "{natural:?} at {available}");
                }
            }
        }
    }

    #[test]
    fn column_widths_measure_sanitized_cells_and_cap_at_maximum() {
        let mut grid = ResultsGrid::new();
        grid.set_result(QueryResult {
            columns: vec!["id".to_string(), "note".to_string()],
            rows: vec![vec![Cell::Int(1), Cell::Text("x".repeat(80))], vec![
                Cell::Int(22),
                Cell::Text("a\nb".to_string()),
            ]],
            row_count: 2,
            has_more: false,
        });
        assert_eq!(grid.column_widths(200), vec![2, MAX_COLUMN_WIDTH]);
    }

    #[test]
    fn append_extends_rows_and_tracks_offset() {
        let mut grid = ResultsGrid::new();
        grid.set_result(result(&["a"], 3, true));
        assert_eq!(grid.fetched_rows(), 3);
        assert!(grid.has_more());

        grid.append_result(result(&["a"], 2, false));
        assert_eq!(grid.fetched_rows(), 5);
        assert_eq!(grid.row_count(), 5);
        assert!(!grid.has_more());
    }

    #[test]
    fn cursor_navigation_keeps_selection_visible() {
        let mut grid = ResultsGrid::new();
        grid.set_viewport_height(7);
        grid.set_result(result(&["a"], 40, false));
        assert_eq!(grid.visible_rows(), 3);

        grid.page_down();
        assert_eq!(grid.cursor(), 10);
        assert_eq!(grid.scroll(), 8);

        grid.move_end();
        assert_eq!(grid.cursor(), 39);
        assert_eq!(grid.scroll(), 37);
        let window = grid.visible_window().map(|(index, _)| index).collect::<Vec<_>>();
        assert_eq!(window, vec![37, 38, 39]);

        grid.move_home();
        assert_eq!((grid.cursor(), grid.scroll()), (0, 0));
    }
}
