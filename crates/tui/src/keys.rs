use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Shortcuts of the connected view that act regardless of pane focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabCommand {
    CycleFocus,
    Execute,
    Cancel,
    RefreshSchema,
    LoadMore,
    Export,
    PasteClipboard,
    CloseTab,
    ShowExplorer,
    PreviousTab,
    NextTab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorerCommand {
    Quit,
    NewConnection,
    EditConnection,
    DeleteConnection,
    ChangePassword,
    Connect,
    Back,
    Up,
    Down,
    Home,
    End,
}

pub fn map_tab_key(key: KeyEvent) -> Option<TabCommand> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let alt = key.modifiers.contains(KeyModifiers::ALT);
    match key.code {
        KeyCode::Tab if key.modifiers.is_empty() => Some(TabCommand::CycleFocus),
        KeyCode::Enter if ctrl || alt => Some(TabCommand::Execute),
        KeyCode::F(5) => Some(TabCommand::RefreshSchema),
        KeyCode::Left if alt => Some(TabCommand::PreviousTab),
        KeyCode::Right if alt => Some(TabCommand::NextTab),
        KeyCode::Char(ch) if ctrl => match ch.to_ascii_lowercase() {
            'e' => Some(TabCommand::Execute),
            'c' => Some(TabCommand::Cancel),
            'r' => Some(TabCommand::RefreshSchema),
            'l' => Some(TabCommand::LoadMore),
            's' => Some(TabCommand::Export),
            'v' => Some(TabCommand::PasteClipboard),
            'w' => Some(TabCommand::CloseTab),
            't' => Some(TabCommand::ShowExplorer),
            _ => None,
        },
        _ => None,
    }
}

pub fn map_explorer_key(key: KeyEvent) -> Option<ExplorerCommand> {
    match (key.modifiers, key.code) {
        (KeyModifiers::CONTROL, KeyCode::Char('c')) | (_, KeyCode::Char('q')) => {
            Some(ExplorerCommand::Quit)
        }
        (_, KeyCode::Char('n')) => Some(ExplorerCommand::NewConnection),
        (_, KeyCode::Char('e')) => Some(ExplorerCommand::EditConnection),
        (_, KeyCode::Char('d')) => Some(ExplorerCommand::DeleteConnection),
        (_, KeyCode::Char('p')) => Some(ExplorerCommand::ChangePassword),
        (_, KeyCode::Enter) => Some(ExplorerCommand::Connect),
        (_, KeyCode::Esc) => Some(ExplorerCommand::Back),
        (_, KeyCode::Up | KeyCode::Char('k')) => Some(ExplorerCommand::Up),
        (_, KeyCode::Down | KeyCode::Char('j')) => Some(ExplorerCommand::Down),
        (_, KeyCode::Home) => Some(ExplorerCommand::Home),
        (_, KeyCode::End) => Some(ExplorerCommand::End),
        _ => None,
    }
}

/// The character a key types, if it types one.
#[must_use]
pub fn printable(key: &KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(ch)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            Some(ch)
        }
        _ => None,
    }
}

#[must_use]
pub fn is_ctrl(key: &KeyEvent, ch: char) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char(ch)
}

/// Compact name such as `ctrl+enter`, used in debug logs and the overlay.
#[must_use]
pub fn key_name(key: &KeyEvent) -> String {
    let mut name = String::new();
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        name.push_str("ctrl+");
    }
    if key.modifiers.contains(KeyModifiers::ALT) {
        name.push_str("alt+");
    }
    if key.modifiers.contains(KeyModifiers::SHIFT) && !matches!(key.code, KeyCode::Char(_)) {
        name.push_str("shift+");
    }
    match key.code {
        KeyCode::Char(' ') => name.push_str("space"),
        KeyCode::Char(ch) => name.push(ch),
        KeyCode::F(number) => name.push_str(&format!("f{number}")),
        KeyCode::BackTab => name.push_str("shift+tab"),
        other => name.push_str(&format!("{other:?}").to_lowercase()),
    }
    name
}
