use std::io::ErrorKind;

use async_trait::async_trait;
use log::debug;
use quarry_core::clipboard::{ClipboardError, ClipboardReader};
use tokio::process::Command;

/// A paste command and its arguments.
type PasteCommand = (&'static str, &'static [&'static str]);

#[cfg(target_os = "macos")]
const PASTE_COMMANDS: &[PasteCommand] = &[("pbpaste", &[])];

#[cfg(target_os = "windows")]
const PASTE_COMMANDS: &[PasteCommand] = &[(
    "powershell",
    &["-NoProfile", "-Command", "Get-Clipboard -Raw"],
)];

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const PASTE_COMMANDS: &[PasteCommand] = &[
    ("wl-paste", &["--no-newline"]),
    ("xclip", &["-selection", "clipboard", "-o"]),
    ("xsel", &["--clipboard", "--output"]),
];

/// Reads the system clipboard through the platform's command-line tools,
/// trying each candidate until one is installed.
#[derive(Debug, Clone)]
pub struct SystemClipboard {
    commands: &'static [PasteCommand],
}

impl Default for SystemClipboard {
    fn default() -> Self {
        Self {
            commands: PASTE_COMMANDS,
        }
    }
}

impl SystemClipboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_commands(commands: &'static [PasteCommand]) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl ClipboardReader for SystemClipboard {
    async fn read_text(&self) -> Result<String, ClipboardError> {
        for (program, args) in self.commands {
            let output = match Command::new(program).args(*args).output().await {
                Ok(output) => output,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!("clipboard tool {program} is not installed");
                    continue;
                }
                Err(err) => {
                    return Err(ClipboardError::Command {
                        command: (*program).to_string(),
                        message: err.to_string(),
                    })
                }
            };

            if !output.status.success() {
                return Err(ClipboardError::Command {
                    command: (*program).to_string(),
                    message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        Err(ClipboardError::Unavailable)
    }
}
