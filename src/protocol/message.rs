//! Decoded server messages.
//!
//! These are the already-decoded forms of the X Protocol server messages that
//! matter to statement replies. Turning frame payloads into these values is a
//! codec's job (see `sync::Codec`).

use crate::diagnostics::Severity;
use crate::error::{Error, Result, ServerError};

/// A decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// `Mysqlx.Ok`
    Ok(String),
    /// `Mysqlx.Error`
    Error(ServerError),
    /// `Mysqlx.Notice.Frame`
    Notice(Notice),
    /// `Mysqlx.Resultset.ColumnMetaData`
    ColumnMetaData(ColumnInfo),
    /// `Mysqlx.Resultset.Row`
    Row(Row),
    /// `Mysqlx.Resultset.FetchDone`
    FetchDone,
    /// `Mysqlx.Resultset.FetchSuspended`
    FetchSuspended,
    /// `Mysqlx.Resultset.FetchDoneMoreResultsets`
    FetchDoneMoreResultsets,
    /// `Mysqlx.Resultset.FetchDoneMoreOutParams`
    FetchDoneMoreOutParams,
    /// `Mysqlx.Sql.StmtExecuteOk`
    StmtExecuteOk,
}

impl ServerMessage {
    /// Message name used in protocol errors.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Ok(_) => "Ok",
            ServerMessage::Error(_) => "Error",
            ServerMessage::Notice(_) => "Notice",
            ServerMessage::ColumnMetaData(_) => "ColumnMetaData",
            ServerMessage::Row(_) => "Row",
            ServerMessage::FetchDone => "FetchDone",
            ServerMessage::FetchSuspended => "FetchSuspended",
            ServerMessage::FetchDoneMoreResultsets => "FetchDoneMoreResultsets",
            ServerMessage::FetchDoneMoreOutParams => "FetchDoneMoreOutParams",
            ServerMessage::StmtExecuteOk => "StmtExecuteOk",
        }
    }
}

/// Column description from `ColumnMetaData`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnInfo {
    /// Column label
    pub name: String,
    pub original_name: Option<String>,
    pub table: Option<String>,
    pub schema: Option<String>,
    /// `Mysqlx.Resultset.ColumnMetaData.FieldType`
    pub field_type: u32,
    pub length: u32,
    pub fractional_digits: u32,
    pub flags: u32,
    pub collation: u64,
}

impl ColumnInfo {
    /// Column with only a label set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One row of raw field values.
///
/// Fields keep the server's encoding; converting them to Rust values is left
/// to the caller. `None` is SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    fields: Vec<Option<Vec<u8>>>,
}

impl Row {
    pub fn new(fields: Vec<Option<Vec<u8>>>) -> Self {
        Self { fields }
    }

    /// Row of non-null text fields.
    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        Self {
            fields: texts
                .iter()
                .map(|t| Some(t.as_ref().as_bytes().to_vec()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw bytes of field `idx`; `None` for NULL or out of range.
    pub fn get(&self, idx: usize) -> Option<&[u8]> {
        self.fields.get(idx).and_then(|f| f.as_deref())
    }

    /// Field `idx` as UTF-8 text.
    pub fn get_str(&self, idx: usize) -> Result<Option<&str>> {
        match self.get(idx) {
            Some(bytes) => simdutf8::basic::from_utf8(bytes)
                .map(Some)
                .map_err(|_e| Error::Protocol(format!("field {}: invalid UTF-8", idx))),
            None => Ok(None),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&[u8]>> {
        self.fields.iter().map(|f| f.as_deref())
    }
}

/// Notice scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeScope {
    /// Applies to the statement being executed
    Local,
    /// Applies to the session
    Global,
}

/// Server notice (`Mysqlx.Notice.Frame`).
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub scope: NoticeScope,
    pub payload: NoticePayload,
}

impl Notice {
    pub fn local(payload: NoticePayload) -> Self {
        Self {
            scope: NoticeScope::Local,
            payload,
        }
    }

    pub fn global(payload: NoticePayload) -> Self {
        Self {
            scope: NoticeScope::Global,
            payload,
        }
    }
}

/// Notice content.
#[derive(Debug, Clone, PartialEq)]
pub enum NoticePayload {
    /// `Mysqlx.Notice.Warning`
    Warning {
        level: Severity,
        code: u32,
        message: String,
    },
    /// `Mysqlx.Notice.SessionVariableChanged`
    SessionVariableChanged { name: String, value: Option<String> },
    /// `Mysqlx.Notice.SessionStateChanged`
    SessionStateChanged(StateChange),
    /// A notice type this client does not interpret
    Other { frame_type: u32 },
}

/// `Mysqlx.Notice.SessionStateChanged` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    CurrentSchema(String),
    AccountExpired,
    GeneratedInsertId(u64),
    RowsAffected(u64),
    RowsFound(u64),
    RowsMatched(u64),
    TrxCommitted,
    TrxRolledBack,
    ProducedMessage(String),
    ClientIdAssigned(u64),
    GeneratedDocumentIds(Vec<String>),
}
