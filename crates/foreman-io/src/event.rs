//! Typed IO events captured from a process run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Provenance of one captured fragment of process IO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoKind {
    /// Text fed to the process's standard input.
    Input,
    /// Text produced on the process's standard output.
    Output,
    /// Text produced on the process's standard error.
    Error,
    /// Diagnostic information recorded by the engine itself.
    Meta,
}

impl IoKind {
    /// All kinds, in ledger partition order.
    pub const ALL: [IoKind; 4] = [IoKind::Input, IoKind::Output, IoKind::Error, IoKind::Meta];

    /// Short lowercase label, as used in dumps and logs.
    pub fn label(&self) -> &'static str {
        match self {
            IoKind::Input => "input",
            IoKind::Output => "output",
            IoKind::Error => "error",
            IoKind::Meta => "meta",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            IoKind::Input => 0,
            IoKind::Output => 1,
            IoKind::Error => 2,
            IoKind::Meta => 3,
        }
    }
}

impl fmt::Display for IoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One immutable fragment of text captured from a process run.
///
/// Events are created by the [`IoLedger`](crate::IoLedger) and never change
/// kind or text afterwards; they are shared as `Arc<IoEvent>` for the
/// lifetime of their run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoEvent {
    kind: IoKind,
    text: String,
    seq: u64,
    at: DateTime<Utc>,
}

impl IoEvent {
    pub(crate) fn new(kind: IoKind, text: String, seq: u64) -> Self {
        Self {
            kind,
            text,
            seq,
            at: Utc::now(),
        }
    }

    /// Provenance of this event.
    pub fn kind(&self) -> IoKind {
        self.kind
    }

    /// Raw text, formatting markers included.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Position in the ledger's arrival order.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// When the event was recorded.
    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    /// Splits the text into lines on CR, LF, or CRLF.
    ///
    /// Anything that is not a line terminator — ANSI escapes included — is
    /// opaque text and survives the split untouched.
    pub fn lines(&self) -> Vec<&str> {
        split_lines(&self.text)
    }
}

impl fmt::Display for IoEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.text)
    }
}

/// Splits `text` on CR, LF, and CRLF terminators.
///
/// A CRLF pair counts as a single terminator. No trailing empty line is
/// produced for terminator-ended input.
pub fn split_lines(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(&text[start..i]);
                i += 1;
                start = i;
            }
            b'\r' => {
                lines.push(&text[start..i]);
                i += 1;
                if bytes.get(i) == Some(&b'\n') {
                    i += 1;
                }
                start = i;
            }
            _ => i += 1,
        }
    }
    if start < bytes.len() {
        lines.push(&text[start..]);
    }
    lines
}
