/// Rows kept out of the scroll window for the title and help lines.
pub const RESERVED_ROWS: usize = 2;

/// Multi-line editable text with a cursor.
///
/// Columns are counted in `char`s, so the cursor never lands inside a
/// multi-byte sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBuffer {
    lines: Vec<String>,
    cursor_row: usize,
    cursor_col: usize,
    scroll_top: usize,
    viewport_height: usize,
}

impl Default for TextBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
            cursor_row: 0,
            cursor_col: 0,
            scroll_top: 0,
            viewport_height: 0,
        }
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn cursor(&self) -> (usize, usize) {
        (self.cursor_row, self.cursor_col)
    }

    #[must_use]
    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }

    /// Number of text rows that fit once the title and help rows are taken.
    #[must_use]
    pub fn visible_rows(&self) -> usize {
        self.viewport_height.saturating_sub(RESERVED_ROWS).max(1)
    }

    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height;
        self.ensure_cursor_visible();
    }

    /// Replaces the whole buffer and resets cursor and scroll.
    pub fn set_content(&mut self, content: &str) {
        self.lines = content.split('\n').map(str::to_string).collect();
        self.cursor_row = 0;
        self.cursor_col = 0;
        self.scroll_top = 0;
    }

    #[must_use]
    pub fn content(&self) -> String {
        self.lines.join("\n")
    }

    pub fn move_up(&mut self) {
        if self.cursor_row > 0 {
            self.cursor_row -= 1;
            self.clamp_col();
        }
        self.ensure_cursor_visible();
    }

    pub fn move_down(&mut self) {
        if self.cursor_row + 1 < self.lines.len() {
            self.cursor_row += 1;
            self.clamp_col();
        }
        self.ensure_cursor_visible();
    }

    pub fn move_left(&mut self) {
        if self.cursor_col > 0 {
            self.cursor_col -= 1;
        } else if self.cursor_row > 0 {
            self.cursor_row -= 1;
            self.cursor_col = self.current_len();
        }
        self.ensure_cursor_visible();
    }

    pub fn move_right(&mut self) {
        if self.cursor_col < self.current_len() {
            self.cursor_col += 1;
        } else if self.cursor_row + 1 < self.lines.len() {
            self.cursor_row += 1;
            self.cursor_col = 0;
        }
        self.ensure_cursor_visible();
    }

    pub fn move_home(&mut self) {
        self.cursor_col = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor_col = self.current_len();
    }

    pub fn insert_char(&mut self, ch: char) {
        if ch == '\n' {
            self.split_line();
            return;
        }
        let at = self.byte_offset(self.cursor_col);
        self.lines[self.cursor_row].insert(at, ch);
        self.cursor_col += 1;
    }

    /// Splits the current line at the cursor; the cursor moves to the start
    /// of the new second half.
    pub fn split_line(&mut self) {
        let at = self.byte_offset(self.cursor_col);
        let tail = self.lines[self.cursor_row].split_off(at);
        self.lines.insert(self.cursor_row + 1, tail);
        self.cursor_row += 1;
        self.cursor_col = 0;
        self.ensure_cursor_visible();
    }

    pub fn backspace(&mut self) {
        if self.cursor_col > 0 {
            let start = self.byte_offset(self.cursor_col - 1);
            let end = self.byte_offset(self.cursor_col);
            self.lines[self.cursor_row].replace_range(start..end, "");
            self.cursor_col -= 1;
        } else if self.cursor_row > 0 {
            let current = self.lines.remove(self.cursor_row);
            self.cursor_row -= 1;
            self.cursor_col = self.current_len();
            self.lines[self.cursor_row].push_str(&current);
        }
        self.ensure_cursor_visible();
    }

    pub fn kill_to_line_start(&mut self) {
        let at = self.byte_offset(self.cursor_col);
        self.lines[self.cursor_row].replace_range(..at, "");
        self.cursor_col = 0;
    }

    pub fn kill_to_line_end(&mut self) {
        let at = self.byte_offset(self.cursor_col);
        self.lines[self.cursor_row].truncate(at);
    }

    /// Inserts pasted text at the cursor. Line endings are normalized first;
    /// the text after the cursor is carried onto the last pasted line and
    /// the cursor ends right after the last fragment.
    pub fn insert_text(&mut self, text: &str) {
        let normalized = normalize_line_endings(text);
        let mut fragments = normalized.split('\n');
        let Some(first) = fragments.next() else {
            return;
        };

        let at = self.byte_offset(self.cursor_col);
        let tail = self.lines[self.cursor_row].split_off(at);
        self.lines[self.cursor_row].push_str(first);
        self.cursor_col += first.chars().count();

        let mut multi_line = false;
        for fragment in fragments {
            multi_line = true;
            self.cursor_row += 1;
            self.lines.insert(self.cursor_row, fragment.to_string());
            self.cursor_col = fragment.chars().count();
        }

        // A multi-line paste leaves the text after the cursor on its own line.
        if multi_line {
            self.lines.insert(self.cursor_row + 1, tail);
        } else {
            self.lines[self.cursor_row].push_str(&tail);
        }
        self.ensure_cursor_visible();
    }

    fn ensure_cursor_visible(&mut self) {
        let visible = self.visible_rows();
        if self.cursor_row < self.scroll_top {
            self.scroll_top = self.cursor_row;
        } else if self.cursor_row >= self.scroll_top + visible {
            self.scroll_top = self.cursor_row + 1 - visible;
        }
    }

    fn clamp_col(&mut self) {
        self.cursor_col = self.cursor_col.min(self.current_len());
    }

    fn current_len(&self) -> usize {
        self.lines[self.cursor_row].chars().count()
    }

    fn byte_offset(&self, col: usize) -> usize {
        let line = &self.lines[self.cursor_row];
        line.char_indices()
            .nth(col)
            .map_or(line.len(), |(offset, _)| offset)
    }
}

#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
