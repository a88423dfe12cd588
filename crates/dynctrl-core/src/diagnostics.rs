//! Caller-facing diagnostic log
//!
//! The log collects every problem found while processing a document, in the
//! order it was found. Collection is opt-in: a disabled log accepts appends
//! and drops them, so batch callers pay nothing for messages they never read.

use serde::Serialize;
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

use crate::document::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// One logged message; line and column are 0 when unknown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticMessage {
    pub severity: Severity,
    pub line: u32,
    pub column: u32,
    pub text: String,
}

impl DiagnosticMessage {
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Compiler-style rendering: `source:line:col: severity: text`, dropping
    /// the position parts that are unknown.
    pub fn render(&self, source: &str) -> String {
        match (self.line, self.column) {
            (0, _) => format!("{}: {}: {}", source, self.severity, self.text),
            (line, 0) => format!("{}:{}: {}: {}", source, line, self.severity, self.text),
            (line, column) => format!(
                "{}:{}:{}: {}: {}",
                source, line, column, self.severity, self.text
            ),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogError {
    #[error("out of memory while recording a diagnostic message")]
    OutOfMemory,
}

/// Append-only message log owned by a session
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    enabled: bool,
    messages: Vec<DiagnosticMessage>,
}

impl DiagnosticLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            messages: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record a message. Does nothing (and succeeds) when collection is disabled.
    pub fn append(
        &mut self,
        severity: Severity,
        position: Position,
        text: fmt::Arguments<'_>,
    ) -> Result<(), LogError> {
        if !self.enabled {
            return Ok(());
        }
        self.messages
            .try_reserve(1)
            .map_err(|_| LogError::OutOfMemory)?;
        self.messages.push(DiagnosticMessage {
            severity,
            line: position.line,
            column: position.column,
            text: text.to_string(),
        });
        Ok(())
    }

    pub fn info(&mut self, position: Position, text: fmt::Arguments<'_>) -> Result<(), LogError> {
        self.append(Severity::Info, position, text)
    }

    pub fn warning(&mut self, position: Position, text: fmt::Arguments<'_>) -> Result<(), LogError> {
        self.append(Severity::Warning, position, text)
    }

    pub fn error(&mut self, position: Position, text: fmt::Arguments<'_>) -> Result<(), LogError> {
        self.append(Severity::Error, position, text)
    }

    pub fn messages(&self) -> &[DiagnosticMessage] {
        &self.messages
    }

    /// Hand the collected messages to the caller
    pub fn finish(self) -> Diagnostics {
        Diagnostics(self.messages)
    }
}

/// The finished, read-only message sequence of a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<DiagnosticMessage>);

impl Diagnostics {
    pub fn count(&self, severity: Severity) -> usize {
        self.0.iter().filter(|m| m.severity == severity).count()
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(|m| m.severity == Severity::Error)
    }
}

impl Deref for Diagnostics {
    type Target = [DiagnosticMessage];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a DiagnosticMessage;
    type IntoIter = std::slice::Iter<'a, DiagnosticMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
