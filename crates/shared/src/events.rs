//! Transcript lines and modal dialogs shown by the chat window.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One line of the scrollback. Lines carry their own speaker prefix
/// ("You: ", "Bot: ") as part of `text`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    pub timestamp: DateTime<Local>,
    pub text: String,
}

impl LogLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            text: text.into(),
        }
    }

    /// Format timestamp for display
    pub fn formatted_time(&self) -> String {
        self.timestamp.format("%H:%M:%S").to_string()
    }
}

/// Append-only scrollback
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Vec<LogLine>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line and return its index.
    pub fn push(&mut self, text: impl Into<String>) -> usize {
        let line = LogLine::new(text);
        tracing::debug!(target: "transcript", "{}", line.text);
        self.lines.push(line);
        self.lines.len() - 1
    }

    /// Append text to an existing line (used while a reply streams in).
    /// Out-of-range indices start a new line instead.
    pub fn append_to(&mut self, index: usize, fragment: &str) -> usize {
        match self.lines.get_mut(index) {
            Some(line) => {
                line.text.push_str(fragment);
                index
            }
            None => self.push(fragment),
        }
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogKind {
    Info,
    Critical,
}

/// A modal message box. Only one is shown at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub title: String,
    pub body: String,
    /// Close the application once the user dismisses this dialog
    pub quit_on_close: bool,
}

impl Dialog {
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::Info,
            title: title.into(),
            body: body.into(),
            quit_on_close: false,
        }
    }

    pub fn critical(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: DialogKind::Critical,
            title: title.into(),
            body: body.into(),
            quit_on_close: false,
        }
    }

    pub fn then_quit(mut self) -> Self {
        self.quit_on_close = true;
        self
    }
}
