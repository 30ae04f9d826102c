//! In-memory wire replaying a scripted server conversation.
//!
//! Useful for exercising code built on a [`Session`](crate::Session) without a
//! server. Every write, every receive operation and every consumed message is
//! recorded in a journal.
//!
//! ```
//! use zero_mysqlx::protocol::reply::XProtocol;
//! use zero_mysqlx::protocol::scripted::ScriptedWire;
//! use zero_mysqlx::{Command, Session};
//!
//! let wire = ScriptedWire::new()
//!     .result_set(&["n"], &[&["1"], &["2"]])
//!     .fetch_done()
//!     .execute_ok();
//! let session = Session::new(XProtocol::new(wire));
//! let stmt = session.execute(Command::sql("SELECT n FROM t")).unwrap();
//! assert_eq!(stmt.fetch_all().unwrap().len(), 2);
//! ```

use std::collections::VecDeque;

use crate::command::Command;
use crate::error::{Error, Result, ServerError};
use crate::state::action::Event;

use super::message::{ColumnInfo, Notice, Row, ServerMessage};
use super::reply::{ReceiveKind, Wire};

/// One step of the scripted server.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Message(ServerMessage),
    /// Nothing arrives until the reader waits for `Event::Readable`.
    Stall,
}

/// Journal entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Journal {
    /// A command was written
    Write(Command),
    /// A receive operation was created
    Receive(ReceiveKind),
    /// A message was consumed (pushed-back messages are recorded once)
    Read(ServerMessage),
    /// The reader blocked on an event
    Wait(Event),
    /// The wire was closed
    Close,
}

/// Scripted in-memory wire.
#[derive(Debug, Default)]
pub struct ScriptedWire {
    steps: VecDeque<Step>,
    pushed_back: Option<ServerMessage>,
    write_stalls: usize,
    journal: Vec<Journal>,
    closed: bool,
}

impl ScriptedWire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a server message.
    pub fn push(mut self, message: ServerMessage) -> Self {
        self.steps.push_back(Step::Message(message));
        self
    }

    /// Append a stall: reads report "nothing yet" until the reader waits.
    pub fn stall(mut self) -> Self {
        self.steps.push_back(Step::Stall);
        self
    }

    /// Make the next `n` writes report "not yet" once each.
    pub fn stall_writes(mut self, n: usize) -> Self {
        self.write_stalls = n;
        self
    }

    pub fn ok(self, message: &str) -> Self {
        self.push(ServerMessage::Ok(message.to_string()))
    }

    pub fn execute_ok(self) -> Self {
        self.push(ServerMessage::StmtExecuteOk)
    }

    pub fn error(self, error: ServerError) -> Self {
        self.push(ServerMessage::Error(error))
    }

    pub fn notice(self, notice: Notice) -> Self {
        self.push(ServerMessage::Notice(notice))
    }

    /// Column metadata followed by text rows.
    pub fn result_set(mut self, columns: &[&str], rows: &[&[&str]]) -> Self {
        for name in columns {
            self = self.push(ServerMessage::ColumnMetaData(ColumnInfo::named(*name)));
        }
        self.rows(rows)
    }

    /// Text rows without metadata, e.g. a batch after `FetchSuspended`.
    pub fn rows(mut self, rows: &[&[&str]]) -> Self {
        for row in rows {
            self = self.push(ServerMessage::Row(Row::from_texts(*row)));
        }
        self
    }

    pub fn fetch_done(self) -> Self {
        self.push(ServerMessage::FetchDone)
    }

    pub fn fetch_suspended(self) -> Self {
        self.push(ServerMessage::FetchSuspended)
    }

    pub fn fetch_done_more_resultsets(self) -> Self {
        self.push(ServerMessage::FetchDoneMoreResultsets)
    }

    pub fn journal(&self) -> &[Journal] {
        &self.journal
    }

    /// Commands written so far, in order.
    pub fn writes(&self) -> Vec<&Command> {
        self.journal
            .iter()
            .filter_map(|entry| match entry {
                Journal::Write(cmd) => Some(cmd),
                _ => None,
            })
            .collect()
    }

    /// Number of scripted messages not consumed yet.
    pub fn remaining(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, Step::Message(_)))
            .count()
            + usize::from(self.pushed_back.is_some())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Wire for ScriptedWire {
    fn poll_message(&mut self) -> Result<Option<ServerMessage>> {
        if self.closed {
            return Err(Error::Io(std::io::ErrorKind::NotConnected.into()));
        }
        if let Some(message) = self.pushed_back.take() {
            return Ok(Some(message));
        }
        match self.steps.front() {
            Some(Step::Stall) => Ok(None),
            Some(Step::Message(_)) => match self.steps.pop_front() {
                Some(Step::Message(message)) => {
                    self.journal.push(Journal::Read(message.clone()));
                    Ok(Some(message))
                }
                _ => Err(Error::Internal("scripted step vanished".into())),
            },
            None => Err(Error::Io(std::io::ErrorKind::UnexpectedEof.into())),
        }
    }

    fn unread(&mut self, message: ServerMessage) {
        self.pushed_back = Some(message);
    }

    fn poll_write(&mut self, command: &Command) -> Result<bool> {
        if self.closed {
            return Err(Error::Io(std::io::ErrorKind::NotConnected.into()));
        }
        if self.write_stalls > 0 {
            return Ok(false);
        }
        self.journal.push(Journal::Write(command.clone()));
        Ok(true)
    }

    fn wait(&mut self, event: Event) -> Result<()> {
        self.journal.push(Journal::Wait(event));
        match event {
            Event::Readable => {
                if matches!(self.steps.front(), Some(Step::Stall)) {
                    self.steps.pop_front();
                }
            }
            Event::Writable => {
                self.write_stalls = self.write_stalls.saturating_sub(1);
            }
        }
        Ok(())
    }

    fn receive_started(&mut self, kind: ReceiveKind) {
        self.journal.push(Journal::Receive(kind));
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.journal.push(Journal::Close);
        Ok(())
    }
}
