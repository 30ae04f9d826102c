//! Statement reply state machine.
//!
//! One machine per statement. It owns the command, at most one child
//! [`Operation`], and everything the reply has delivered so far. It never
//! looks at other statements: ordering against the predecessor is the
//! session's job, which calls the primitives here in the right order.
//!
//! ```text
//! WAIT → SEND → OK ────────────────────────────┐
//!           └──→ MDATA → ROWS | DISCARD → NEXT ─┤→ FINISH → DONE
//!                  ↑                        │   │
//!                  └────────────────────────┘   │
//!                     (ERROR from anywhere) ────┘
//! ```

use std::collections::VecDeque;

use crate::command::{Command, ReplyShape};
use crate::diagnostics::{Diagnostics, Entry};
use crate::error::{Error, Result, ServerError};
use crate::protocol::message::{ColumnInfo, Notice, NoticePayload, NoticeScope, Row, StateChange};
use crate::protocol::reply::ReplyProcessor;

use super::action::{Event, Operation, Transport};

/// Statement reply state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for the predecessor to send its command
    Wait,
    /// Sending the command
    Send,
    /// Waiting for a plain OK or error
    Ok,
    /// Waiting for result set metadata
    Mdata,
    /// Rows of the current result set are readable
    Rows,
    /// Rows are read and dropped
    Discard,
    /// Another result set follows; its metadata was not requested yet
    Next,
    /// Waiting for the reply that closes the exchange
    Finish,
    /// Fully drained
    Done,
    /// Failed; only cleanup remains
    Error,
}

/// Execution statistics reported through statement-scoped notices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub rows_affected: u64,
    pub rows_found: u64,
    pub rows_matched: u64,
    /// `LAST_INSERT_ID()` of an auto-increment insert
    pub last_insert_id: Option<u64>,
    /// `_id`s generated for inserted documents
    pub generated_ids: Vec<String>,
    /// Informational message (e.g. "Rows matched: 1  Changed: 1  Warnings: 0")
    pub info: Option<String>,
}

impl ExecStats {
    /// Record a state change. Returns false if it is not a statistic.
    pub fn apply(&mut self, change: &StateChange) -> bool {
        match change {
            StateChange::RowsAffected(n) => self.rows_affected = *n,
            StateChange::RowsFound(n) => self.rows_found = *n,
            StateChange::RowsMatched(n) => self.rows_matched = *n,
            StateChange::GeneratedInsertId(id) => self.last_insert_id = Some(*id),
            StateChange::GeneratedDocumentIds(ids) => self.generated_ids.extend(ids.iter().cloned()),
            StateChange::ProducedMessage(msg) => self.info = Some(msg.clone()),
            StateChange::CurrentSchema(_)
            | StateChange::AccountExpired
            | StateChange::TrxCommitted
            | StateChange::TrxRolledBack
            | StateChange::ClientIdAssigned(_) => return false,
        }
        true
    }
}

/// Everything the reply callbacks touch.
#[derive(Debug)]
struct ReplyState {
    state: State,
    /// Sticky; rows are never surfaced once set
    discard: bool,
    /// Set when a metadata operation is dispatched, consumed when it completes
    mdata_seen: bool,
    columns: Vec<ColumnInfo>,
    rows: VecDeque<Row>,
    diagnostics: Diagnostics,
    stats: ExecStats,
    /// Notices for the session
    forwarded: Vec<Notice>,
}

impl ReplyState {
    fn new() -> Self {
        Self {
            state: State::Wait,
            discard: false,
            mdata_seen: false,
            columns: Vec::new(),
            rows: VecDeque::new(),
            diagnostics: Diagnostics::new(),
            stats: ExecStats::default(),
            forwarded: Vec::new(),
        }
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            tracing::trace!(from = ?self.state, to = ?state, "statement state");
            self.state = state;
        }
    }

    fn discarding(&self) -> bool {
        self.discard || self.state == State::Discard
    }
}

impl ReplyProcessor for ReplyState {
    fn on_ok(&mut self, _message: &str) {
        self.set_state(State::Done);
    }

    fn on_execute_ok(&mut self) {
        self.set_state(State::Done);
    }

    fn on_column(&mut self, column: ColumnInfo) {
        self.columns.push(column);
    }

    fn on_row(&mut self, row: Row) {
        if !self.discarding() {
            self.rows.push_back(row);
        }
    }

    fn on_statement_boundary(&mut self, end_of_data: bool, more_results: bool) {
        if !end_of_data {
            return;
        }
        if !more_results {
            self.set_state(State::Finish);
        } else if self.state == State::Mdata {
            // Empty part: read the next metadata instead of settling on zero columns
            self.mdata_seen = false;
        } else if self.discarding() {
            self.set_state(State::Mdata);
        } else {
            self.set_state(State::Next);
        }
    }

    fn on_notice(&mut self, notice: Notice) {
        if notice.scope == NoticeScope::Local {
            match &notice.payload {
                NoticePayload::Warning {
                    level,
                    code,
                    message,
                } => {
                    self.diagnostics.push(Entry {
                        severity: *level,
                        code: *code,
                        sql_state: String::new(),
                        message: message.clone(),
                    });
                    return;
                }
                NoticePayload::SessionStateChanged(change) if self.stats.apply(change) => return,
                _ => {}
            }
        }
        self.forwarded.push(notice);
    }

    fn on_server_error(&mut self, error: ServerError) {
        let is_error = error.is_error();
        self.diagnostics.push(error.into());
        if is_error {
            self.set_state(State::Error);
        }
    }
}

/// Reply state machine of one statement.
pub struct StatementMachine {
    command: Command,
    op: Option<Box<dyn Operation>>,
    reply: ReplyState,
}

impl std::fmt::Debug for StatementMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementMachine")
            .field("command", &self.command.kind())
            .field("state", &self.reply.state)
            .field("discard", &self.reply.discard)
            .field("has_op", &self.op.is_some())
            .finish()
    }
}

impl StatementMachine {
    /// Create a new statement machine in `State::Wait`.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            op: None,
            reply: ReplyState::new(),
        }
    }

    pub fn state(&self) -> State {
        self.reply.state
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.reply.columns
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.reply.diagnostics
    }

    pub fn stats(&self) -> &ExecStats {
        &self.reply.stats
    }

    pub fn is_discarding(&self) -> bool {
        self.reply.discard
    }

    pub fn has_op(&self) -> bool {
        self.op.is_some()
    }

    /// Returns true once the command is written (or there was nothing to write).
    pub fn has_sent(&self) -> bool {
        !matches!(self.reply.state, State::Wait | State::Send)
    }

    /// Returns true once the statement is fully drained or failed.
    pub fn is_completed(&self) -> bool {
        match self.reply.state {
            State::Error => true,
            State::Done => self.op.is_none(),
            _ => false,
        }
    }

    /// A result set waits for the caller to read or discard it.
    pub fn has_pending_results(&self) -> bool {
        matches!(self.reply.state, State::Rows | State::Next) && !self.reply.discard
    }

    /// Returns true at a point where only the caller can move the statement on.
    pub fn is_stable(&self) -> bool {
        self.is_completed() || (self.has_pending_results() && self.op.is_none())
    }

    pub fn has_buffered_rows(&self) -> bool {
        !self.reply.rows.is_empty()
    }

    pub fn waiting_for(&self) -> Option<Event> {
        self.op.as_ref().and_then(|op| op.waiting_for())
    }

    pub fn cancel(&mut self) {
        if let Some(op) = self.op.as_mut() {
            op.cancel();
        }
    }

    /// Notices the session should handle.
    pub fn take_forwarded(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.reply.forwarded)
    }

    /// Start sending the command. `WAIT → SEND`, or `WAIT → DONE` for a no-op.
    pub fn begin_send(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if self.reply.state != State::Wait {
            return Err(Error::InvalidState(format!(
                "cannot send a statement in state {:?}",
                self.reply.state
            )));
        }
        if self.command.is_noop() {
            self.reply.set_state(State::Done);
            return Ok(());
        }
        self.op = Some(transport.send(&self.command)?);
        self.reply.set_state(State::Send);
        Ok(())
    }

    /// Drive the child operation. Returns true if there is none left to drive.
    pub fn poll_op(&mut self) -> Result<bool> {
        match self.op.as_mut() {
            Some(op) => op.resume(&mut self.reply),
            None => Ok(true),
        }
    }

    /// The send completed: move to the phase the command's reply starts with.
    pub fn finish_send(&mut self) {
        self.op = None;
        self.reply.mdata_seen = false;
        if self.reply.state == State::Send {
            let next = match self.command.reply_shape() {
                ReplyShape::Ok => State::Ok,
                ReplyShape::ResultSet => State::Mdata,
            };
            self.reply.set_state(next);
        }
    }

    /// With the discard flag set, `ROWS → DISCARD` and `NEXT → MDATA`.
    pub fn coerce_discard(&mut self) {
        if !self.reply.discard {
            return;
        }
        match self.reply.state {
            State::Rows => self.reply.set_state(State::Discard),
            State::Next => self.reply.set_state(State::Mdata),
            _ => {}
        }
    }

    /// Create the receive operation the current state calls for.
    ///
    /// `ROWS` creates nothing: rows are fetched by the cursor.
    pub fn dispatch(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if self.op.is_some() {
            return Err(Error::Internal("dispatch with an operation in flight".into()));
        }
        let op = match self.reply.state {
            State::Ok => transport.receive_reply(),
            State::Mdata => {
                self.reply.columns.clear();
                self.reply.rows.clear();
                self.reply.mdata_seen = true;
                transport.receive_metadata()
            }
            State::Discard => transport.receive_rows(),
            State::Finish => transport.receive_reply_after_prepare(),
            State::Wait
            | State::Send
            | State::Rows
            | State::Next
            | State::Done
            | State::Error => return Ok(()),
        };
        self.op = Some(op);
        Ok(())
    }

    /// Start reading the next batch of rows of the current result set.
    pub fn begin_fetch(&mut self, transport: &mut dyn Transport) -> Result<()> {
        if self.reply.state != State::Rows || self.op.is_some() {
            return Err(Error::InvalidState(format!(
                "cannot fetch rows in state {:?}",
                self.reply.state
            )));
        }
        self.op = Some(transport.receive_rows());
        Ok(())
    }

    /// The child operation completed: clear it and settle the state.
    pub fn complete_op(&mut self) {
        self.op = None;
        if std::mem::take(&mut self.reply.mdata_seen) && self.reply.state == State::Mdata {
            let next = if self.reply.columns.is_empty() {
                State::Finish
            } else if self.reply.discard {
                State::Discard
            } else {
                State::Rows
            };
            self.reply.set_state(next);
        }
        if self.reply.state == State::Ok {
            self.reply.set_state(State::Finish);
        }
    }

    /// Drop the child operation without settling the state.
    pub fn clear_op(&mut self) {
        self.op = None;
    }

    /// Abandon the statement after a local failure.
    pub fn fail(&mut self) {
        self.op = None;
        self.reply.set_state(State::Error);
    }

    /// Set the discard flag and drop buffered rows.
    pub fn set_discard(&mut self) {
        self.reply.discard = true;
        self.reply.rows.clear();
    }

    /// Discard at a stable point: `ROWS → DISCARD`; `NEXT`, `DONE` and
    /// `ERROR` only set the flag.
    pub fn discard(&mut self) -> Result<()> {
        match self.reply.state {
            State::Rows => {
                self.set_discard();
                self.reply.set_state(State::Discard);
                Ok(())
            }
            State::Next | State::Done | State::Error => {
                self.set_discard();
                Ok(())
            }
            state => Err(Error::InvalidState(format!(
                "cannot discard in state {:?}",
                state
            ))),
        }
    }

    /// `NEXT → MDATA`.
    pub fn advance(&mut self) -> Result<()> {
        if self.reply.state != State::Next {
            return Err(Error::InvalidState(format!(
                "no next result in state {:?}",
                self.reply.state
            )));
        }
        self.reply.set_state(State::Mdata);
        Ok(())
    }

    pub fn pop_row(&mut self) -> Option<Row> {
        self.reply.rows.pop_front()
    }

    /// The server error that failed this statement, if any.
    ///
    /// Error-level entries of a statement that still completed (warning
    /// notices) stay in the diagnostics only.
    pub fn server_error(&self) -> Option<ServerError> {
        if self.reply.state != State::Error {
            return None;
        }
        self.reply.diagnostics.error()
    }
}
