use crossterm::event::{KeyCode, KeyEvent};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

use crate::keys::{is_ctrl, printable};

const EMPTY_MASK: &str = "____________";

/// What the entered password is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPurpose {
    /// Decrypt an existing store.
    Unlock,
    /// First run: choose the password that encrypts a new store.
    Setup,
    /// Re-encrypt the loaded store under a new password.
    Change,
}

impl PasswordPurpose {
    fn needs_confirmation(self) -> bool {
        !matches!(self, Self::Unlock)
    }

    fn title(self) -> &'static str {
        match self {
            Self::Unlock => "Enter Master Password",
            Self::Setup => "Setup Master Password",
            Self::Change => "Change Master Password",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptState {
    Open,
    Submitted,
    Dismissed,
}

#[derive(Debug, Clone)]
pub struct PasswordPrompt {
    purpose: PasswordPurpose,
    password: String,
    confirmation: String,
    focus_confirmation: bool,
    error: Option<String>,
    state: PromptState,
}

impl PasswordPrompt {
    #[must_use]
    pub fn new(purpose: PasswordPurpose) -> Self {
        Self {
            purpose,
            password: String::new(),
            confirmation: String::new(),
            focus_confirmation: false,
            error: None,
            state: PromptState::Open,
        }
    }

    #[must_use]
    pub fn purpose(&self) -> PasswordPurpose {
        self.purpose
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == PromptState::Open
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.state == PromptState::Submitted
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Reopens the prompt with a message, e.g. after a failed unlock.
    pub fn reject(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.password.clear();
        self.confirmation.clear();
        self.focus_confirmation = false;
        self.state = PromptState::Open;
    }

    /// The submitted password, once.
    pub fn take_password(&mut self) -> Option<String> {
        if self.is_submitted() {
            self.confirmation.clear();
            self.state = PromptState::Dismissed;
            Some(std::mem::take(&mut self.password))
        } else {
            None
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if !self.is_open() {
            return;
        }
        if key.code == KeyCode::Esc || is_ctrl(&key, 'c') {
            self.password.clear();
            self.confirmation.clear();
            self.state = PromptState::Dismissed;
            return;
        }

        match key.code {
            KeyCode::Tab | KeyCode::BackTab if self.purpose.needs_confirmation() => {
                self.focus_confirmation = !self.focus_confirmation;
            }
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                if self.active_field().pop().is_some() {
                    self.error = None;
                }
            }
            _ => {
                if let Some(ch) = printable(&key) {
                    self.active_field().push(ch);
                    self.error = None;
                }
            }
        }
    }

    pub fn handle_paste(&mut self, text: &str) {
        if !self.is_open() {
            return;
        }
        let field = self.active_field();
        field.extend(text.chars().filter(|ch| !ch.is_control()));
        self.error = None;
    }

    fn active_field(&mut self) -> &mut String {
        if self.focus_confirmation {
            &mut self.confirmation
        } else {
            &mut self.password
        }
    }

    fn submit(&mut self) {
        if self.password.is_empty() {
            self.error = Some("Password cannot be empty".to_string());
            return;
        }
        if self.purpose.needs_confirmation() {
            if !self.focus_confirmation {
                self.focus_confirmation = true;
                return;
            }
            if self.confirmation.is_empty() {
                self.error = Some("Please confirm password".to_string());
                return;
            }
            if self.password != self.confirmation {
                self.reject("Passwords do not match");
                return;
            }
        }
        self.error = None;
        self.state = PromptState::Submitted;
    }

    #[must_use]
    pub fn title(&self) -> &'static str {
        self.purpose.title()
    }

    #[must_use]
    pub fn render_lines(&self) -> Vec<Line<'static>> {
        let hint = Style::default().fg(Color::DarkGray);
        let mut lines = vec![
            Line::from(Span::styled(
                self.title(),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
        ];

        if self.purpose.needs_confirmation() {
            lines.push(Line::from("This password will encrypt your saved connections."));
            lines.push(Line::from("Make sure you remember it!"));
            lines.push(Line::from(""));
        }

        let marker = |focused: bool| if focused { "> " } else { "  " };
        lines.push(Line::from(format!(
            "{}Password: {}",
            marker(!self.focus_confirmation),
            mask(&self.password)
        )));

        if self.purpose.needs_confirmation() {
            lines.push(Line::from(format!(
                "{}Confirm:  {}",
                marker(self.focus_confirmation),
                mask(&self.confirmation)
            )));
            lines.push(Line::from(""));
            let step = match (self.focus_confirmation, self.confirmation.is_empty()) {
                (false, _) if self.password.is_empty() => {
                    Span::styled("Step 1: Enter your master password", hint)
                }
                (false, _) => Span::styled(
                    "✓ Password entered! Press Enter to continue...",
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                ),
                (true, true) => Span::styled("Step 2: Type the password again to confirm", hint),
                (true, false) => Span::styled(
                    "✓ Confirmed! Press Enter to save...",
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                ),
            };
            lines.push(Line::from(step));
        }

        if let Some(error) = &self.error {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        }

        lines.push(Line::from(""));
        let escape = if self.purpose == PasswordPurpose::Change {
            "cancel"
        } else {
            "quit"
        };
        lines.push(Line::from(Span::styled(
            format!("Press Enter to continue, Esc to {escape}"),
            hint,
        )));
        lines
    }
}

fn mask(value: &str) -> String {
    if value.is_empty() {
        EMPTY_MASK.to_string()
    } else {
        "*".repeat(value.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    use super::{PasswordPrompt, PasswordPurpose};

    fn type_text(prompt: &mut PasswordPrompt, text: &str) {
        for ch in text.chars() {
            prompt.handle_key(KeyEvent::new(KeyCode::Char(ch), KeyModifiers::NONE));
        }
    }

    fn press(prompt: &mut PasswordPrompt, code: KeyCode) {
        prompt.handle_key(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn rendered(prompt: &PasswordPrompt) -> String {
        prompt
            .render_lines()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn unlock_rejects_empty_password() {
        let mut prompt = PasswordPrompt::new(PasswordPurpose::Unlock);
        press(&mut prompt, KeyCode::Enter);
        assert!(prompt.is_open());
        assert_eq!(prompt.error(), Some("Password cannot be empty"));
    }

    #[test]
    fn unlock_submits_the_typed_password_once() {
        let mut prompt = PasswordPrompt::new(PasswordPurpose::Unlock);
        type_text(&mut prompt, "hunter2");
        assert!(rendered(&prompt).contains("Password: *******"));
        press(&mut prompt, KeyCode::Enter);
        assert!(!prompt.is_open());
        assert_eq!(prompt.take_password().as_deref(), Some("hunter2"));
        assert_eq!(prompt.take_password(), None);
    }

    #[test]
    fn setup_requires_matching_confirmation() {
        let mut prompt = PasswordPrompt::new(PasswordPurpose::Setup);
        type_text(&mut prompt, "secret");
        press(&mut prompt, KeyCode::Enter);
        assert!(prompt.is_open());
        press(&mut prompt, KeyCode::Enter);
        assert_eq!(prompt.error(), Some("Please confirm password"));

        type_text(&mut prompt, "secreT");
        press(&mut prompt, KeyCode::Enter);
        assert_eq!(prompt.error(), Some("Passwords do not match"));
        assert!(rendered(&prompt).contains("> Password: ____________"));

        type_text(&mut prompt, "secret");
        press(&mut prompt, KeyCode::Enter);
        type_text(&mut prompt, "secret");
        press(&mut prompt, KeyCode::Enter);
        assert!(prompt.is_submitted());
    }

    #[test]
    fn escape_dismisses_without_submission() {
        let mut prompt = PasswordPrompt::new(PasswordPurpose::Change);
        type_text(&mut prompt, "abc");
        press(&mut prompt, KeyCode::Esc);
        assert!(!prompt.is_open());
        assert!(!prompt.is_submitted());
        assert_eq!(prompt.take_password(), None);
    }

    #[test]
    fn reject_reopens_with_message() {
        let mut prompt = PasswordPrompt::new(PasswordPurpose::Unlock);
        type_text(&mut prompt, "wrong");
        press(&mut prompt, KeyCode::Enter);
        prompt.reject("Invalid password");
        assert!(prompt.is_open());
        assert!(rendered(&prompt).contains("Invalid password"));
    }
}
