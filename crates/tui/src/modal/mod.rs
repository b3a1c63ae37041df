mod connection_form;
mod password_prompt;

use crossterm::event::KeyEvent;
use quarry_core::store::SavedConnection;
use ratatui::text::Line;

pub use connection_form::{ConnectionForm, DriverChoice, FormField};
pub use password_prompt::{PasswordPrompt, PasswordPurpose};

/// An exclusive overlay that captures all input while open.
#[derive(Debug, Clone)]
pub enum Modal {
    ConnectionForm(ConnectionForm),
    PasswordPrompt(PasswordPrompt),
}

impl Modal {
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            Self::ConnectionForm(form) => form.is_open(),
            Self::PasswordPrompt(prompt) => prompt.is_open(),
        }
    }

    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::ConnectionForm(form) => form.title(),
            Self::PasswordPrompt(prompt) => prompt.title(),
        }
    }

    #[must_use]
    pub fn render_lines(&self) -> Vec<Line<'static>> {
        match self {
            Self::ConnectionForm(form) => form.render_lines(),
            Self::PasswordPrompt(prompt) => prompt.render_lines(),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) {
        match self {
            Self::ConnectionForm(form) => form.handle_key(key),
            Self::PasswordPrompt(prompt) => prompt.handle_key(key),
        }
    }

    fn handle_paste(&mut self, text: &str) {
        match self {
            Self::ConnectionForm(form) => form.handle_paste(text),
            Self::PasswordPrompt(prompt) => prompt.handle_paste(text),
        }
    }

    fn into_outcome(self) -> ModalOutcome {
        match self {
            Self::ConnectionForm(mut form) => {
                let is_edit = form.is_edit();
                match form.take_submission() {
                    Some(connection) => ModalOutcome::ConnectionSubmitted {
                        connection,
                        is_edit,
                    },
                    None => ModalOutcome::Dismissed,
                }
            }
            Self::PasswordPrompt(mut prompt) => {
                let purpose = prompt.purpose();
                match prompt.take_password() {
                    Some(password) => ModalOutcome::PasswordSubmitted { password, purpose },
                    None => ModalOutcome::Dismissed,
                }
            }
        }
    }
}

/// What a modal left behind when it closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModalOutcome {
    ConnectionSubmitted {
        connection: SavedConnection,
        is_edit: bool,
    },
    PasswordSubmitted {
        password: String,
        purpose: PasswordPurpose,
    },
    Dismissed,
}

/// Holds at most one open modal. A closed modal is dropped as soon as it
/// stops being open, and its outcome is returned exactly once.
#[derive(Debug, Default)]
pub struct ModalStack {
    active: Option<Modal>,
}

impl ModalStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `modal` unless one is already open. Returns whether it opened.
    pub fn open(&mut self, modal: Modal) -> bool {
        if self.is_open() {
            return false;
        }
        self.active = Some(modal);
        true
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.active.as_ref().is_some_and(Modal::is_open)
    }

    #[must_use]
    pub fn active(&self) -> Option<&Modal> {
        self.active.as_ref()
    }

    /// Delivers a key to the open modal and returns its outcome if the key
    /// closed it.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<ModalOutcome> {
        self.active.as_mut()?.handle_key(key);
        self.close_if_done()
    }

    pub fn handle_paste(&mut self, text: &str) -> Option<ModalOutcome> {
        self.active.as_mut()?.handle_paste(text);
        self.close_if_done()
    }

    fn close_if_done(&mut self) -> Option<ModalOutcome> {
        if self.is_open() {
            return None;
        }
        self.active.take().map(Modal::into_outcome)
    }
}
