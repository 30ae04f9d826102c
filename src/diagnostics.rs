//! Per-statement diagnostics area.

use crate::error::ServerError;

/// Severity of a diagnostics entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational note (`Mysqlx.Notice.Warning.Level.NOTE`)
    Info,
    /// Warning
    Warning,
    /// Error; aborts the statement when reported by the server
    Error,
}

impl Severity {
    /// Map an X Protocol warning level (1 = note, 2 = warning, 3 = error).
    pub fn from_warning_level(level: u32) -> Self {
        match level {
            1 => Severity::Info,
            3 => Severity::Error,
            _ => Severity::Warning,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One warning or error recorded for a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub severity: Severity,
    pub code: u32,
    /// SQLSTATE, empty for warnings delivered as notices
    pub sql_state: String,
    pub message: String,
}

impl From<ServerError> for Entry {
    fn from(err: ServerError) -> Self {
        Self {
            severity: err.severity,
            code: err.code,
            sql_state: err.sql_state,
            message: err.message,
        }
    }
}

/// Ordered, append-only log of warnings and errors.
///
/// Owned by a single statement. Entries arrive from server notices and
/// from error replies, in wire order.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Entry>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Number of entries with at least the given severity.
    pub fn entry_count(&self, min: Severity) -> usize {
        self.entries.iter().filter(|e| e.severity >= min).count()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first error entry, if any.
    pub fn error(&self) -> Option<ServerError> {
        self.entries
            .iter()
            .find(|e| e.severity == Severity::Error)
            .map(|e| ServerError {
                severity: e.severity,
                code: e.code,
                sql_state: e.sql_state.clone(),
                message: e.message.clone(),
            })
    }

    /// All entries below error severity.
    pub fn warnings(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| e.severity < Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }
}
