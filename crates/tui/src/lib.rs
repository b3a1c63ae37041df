pub mod explorer;
pub mod jobs;
pub mod keys;
pub mod modal;
pub mod panes;
pub mod render;
pub mod workspace;

#[cfg(test)]
mod test_support;

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind,
    KeyboardEnhancementFlags, PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use log::{debug, info, warn};
use quarry_core::clipboard::ClipboardReader;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::modal::{PasswordPrompt, PasswordPurpose};
use crate::workspace::{AppEvent, Effect, Workspace};

const TICK_RATE: Duration = Duration::from_millis(120);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum TuiError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Drives `workspace` until it asks to quit. Background effects are spawned
/// on `runtime` and report back through a channel drained every tick.
pub fn run(
    mut workspace: Workspace,
    runtime: &Handle,
    clipboard: Arc<dyn ClipboardReader>,
) -> Result<(), TuiError> {
    let mut terminal = setup_terminal()?;
    let run_result = run_loop(&mut terminal, &mut workspace, runtime, &clipboard);
    let restore_result = restore_terminal(&mut terminal);
    close_sessions(&mut workspace, runtime);

    if let Err(error) = run_result {
        restore_result?;
        return Err(error);
    }

    restore_result?;
    Ok(())
}

/// Asks for the master password before the workspace exists. Returns `None`
/// when the user backs out.
pub fn prompt_master_password(purpose: PasswordPurpose) -> Result<Option<String>, TuiError> {
    let mut terminal = setup_terminal()?;
    let prompt_result = prompt_loop(&mut terminal, PasswordPrompt::new(purpose));
    let restore_result = restore_terminal(&mut terminal);

    match prompt_result {
        Ok(password) => {
            restore_result?;
            Ok(password)
        }
        Err(error) => {
            restore_result?;
            Err(error)
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>, TuiError> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableBracketedPaste,
        PushKeyboardEnhancementFlags(
            KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
        )
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<(), TuiError> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        PopKeyboardEnhancementFlags,
        DisableBracketedPaste,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    workspace: &mut Workspace,
    runtime: &Handle,
    clipboard: &Arc<dyn ClipboardReader>,
) -> Result<(), TuiError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let size = terminal.size()?;
    let effects = workspace.handle(AppEvent::Resize {
        width: size.width,
        height: size.height,
    });
    dispatch(effects, runtime, &tx, clipboard);

    loop {
        drain_completions(workspace, &mut rx, runtime, &tx, clipboard);
        terminal.draw(|frame| render::draw(frame, workspace))?;

        if workspace.should_quit() {
            break;
        }

        if event::poll(TICK_RATE)? {
            if let Some(app_event) = map_terminal_event(event::read()?) {
                let effects = workspace.handle(app_event);
                dispatch(effects, runtime, &tx, clipboard);
            }
        }
    }

    Ok(())
}

fn prompt_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut prompt: PasswordPrompt,
) -> Result<Option<String>, TuiError> {
    loop {
        terminal.draw(|frame| render::draw_popup(frame, prompt.title(), prompt.render_lines()))?;

        if !prompt.is_open() {
            return Ok(prompt.take_password());
        }

        if event::poll(TICK_RATE)? {
            match map_terminal_event(event::read()?) {
                Some(AppEvent::Key(key)) => prompt.handle_key(key),
                Some(AppEvent::Paste(text)) => prompt.handle_paste(&text),
                _ => {}
            }
        }
    }
}

/// Terminal input the controller cares about. Key releases and repeats
/// reported by the keyboard enhancement protocol are dropped.
fn map_terminal_event(event: Event) -> Option<AppEvent> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => Some(AppEvent::Key(key)),
        Event::Paste(text) => Some(AppEvent::Paste(text)),
        Event::Resize(width, height) => Some(AppEvent::Resize { width, height }),
        _ => None,
    }
}

fn drain_completions(
    workspace: &mut Workspace,
    rx: &mut UnboundedReceiver<AppEvent>,
    runtime: &Handle,
    tx: &UnboundedSender<AppEvent>,
    clipboard: &Arc<dyn ClipboardReader>,
) {
    while let Ok(event) = rx.try_recv() {
        let effects = workspace.handle(event);
        dispatch(effects, runtime, tx, clipboard);
    }
}

fn dispatch(
    effects: Vec<Effect>,
    runtime: &Handle,
    tx: &UnboundedSender<AppEvent>,
    clipboard: &Arc<dyn ClipboardReader>,
) {
    for effect in effects {
        let tx = tx.clone();
        let clipboard = Arc::clone(clipboard);
        runtime.spawn(async move {
            if let Some(event) = jobs::perform(effect, clipboard).await {
                if tx.send(event).is_err() {
                    debug!("completion arrived after the event loop stopped");
                }
            }
        });
    }
}

fn close_sessions(workspace: &mut Workspace, runtime: &Handle) {
    let sessions = workspace.take_sessions();
    if sessions.is_empty() {
        return;
    }
    info!("closing {} session(s)", sessions.len());
    runtime.block_on(async {
        for session in sessions {
            match tokio::time::timeout(CLOSE_TIMEOUT, session.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!("failed to close session: {err}"),
                Err(_) => warn!("gave up closing a session after {CLOSE_TIMEOUT:?}"),
            }
        }
    });
}
