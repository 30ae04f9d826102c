//! Reply processing and the X Protocol transport.
//!
//! [`XProtocol`] turns a [`Wire`] (something that reads decoded server
//! messages and writes commands) into the operation factories a statement
//! needs. Each receive operation reads messages until the part of the reply
//! it is responsible for is complete, and reports what it saw through the
//! [`ReplyProcessor`] callbacks.

use std::cell::RefCell;
use std::rc::Rc;

use crate::command::Command;
use crate::error::{Error, Result, ServerError};
use crate::state::action::{Event, Operation, Transport};

use super::message::{ColumnInfo, Notice, Row, ServerMessage};

/// Callbacks invoked by receive operations.
///
/// Callback patterns by reply:
/// - statement without result set: `on_execute_ok` (or `on_ok`)
/// - result set: `on_column*` → `on_row*` → `on_statement_boundary`
/// - any point: `on_notice*`, and `on_server_error` ending the reply
pub trait ReplyProcessor {
    /// `Mysqlx.Ok` received.
    fn on_ok(&mut self, message: &str);

    /// `StmtExecuteOk` received.
    fn on_execute_ok(&mut self);

    /// One column of result set metadata.
    fn on_column(&mut self, column: ColumnInfo);

    /// One row of the current result set.
    fn on_row(&mut self, row: Row);

    /// A batch of rows ended.
    ///
    /// `end_of_data` is false when more row batches of the same result set
    /// follow; `more_results` is true when another result set follows.
    fn on_statement_boundary(&mut self, end_of_data: bool, more_results: bool);

    /// Server notice.
    fn on_notice(&mut self, notice: Notice);

    /// Server error or warning reply.
    fn on_server_error(&mut self, error: ServerError);
}

/// A connection that exchanges decoded messages with the server.
pub trait Wire {
    /// Next server message, or `None` if nothing has arrived yet.
    fn poll_message(&mut self) -> Result<Option<ServerMessage>>;

    /// Push back a message; the next `poll_message` returns it.
    fn unread(&mut self, message: ServerMessage);

    /// Write `command`. Returns `Ok(false)` if the write could not complete yet.
    fn poll_write(&mut self, command: &Command) -> Result<bool>;

    /// Block until `event` may have become ready.
    fn wait(&mut self, event: Event) -> Result<()>;

    /// Called each time a receive operation is created.
    fn receive_started(&mut self, kind: ReceiveKind) {
        let _ = kind;
    }

    /// Close the connection.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// The four kinds of receive operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveKind {
    Reply,
    Metadata,
    Rows,
    ReplyAfterPrepare,
}

/// X Protocol transport over a [`Wire`].
pub struct XProtocol<W> {
    wire: Rc<RefCell<W>>,
}

impl<W: Wire + 'static> XProtocol<W> {
    pub fn new(wire: W) -> Self {
        Self::from_shared(Rc::new(RefCell::new(wire)))
    }

    /// Build over a wire the caller keeps a handle to.
    pub fn from_shared(wire: Rc<RefCell<W>>) -> Self {
        Self { wire }
    }

    pub fn wire(&self) -> Rc<RefCell<W>> {
        Rc::clone(&self.wire)
    }

    fn receive(&mut self, kind: ReceiveKind) -> Box<dyn Operation> {
        self.wire.borrow_mut().receive_started(kind);
        tracing::trace!(?kind, "receive started");
        Box::new(ReceiveOp {
            wire: Rc::clone(&self.wire),
            kind,
            columns_seen: false,
            done: false,
            cancelled: false,
        })
    }
}

impl<W: Wire + 'static> Transport for XProtocol<W> {
    fn send(&mut self, command: &Command) -> Result<Box<dyn Operation>> {
        tracing::trace!(kind = command.kind(), "send started");
        Ok(Box::new(SendOp {
            wire: Rc::clone(&self.wire),
            command: command.clone(),
            done: false,
            cancelled: false,
        }))
    }

    fn receive_reply(&mut self) -> Box<dyn Operation> {
        self.receive(ReceiveKind::Reply)
    }

    fn receive_metadata(&mut self) -> Box<dyn Operation> {
        self.receive(ReceiveKind::Metadata)
    }

    fn receive_rows(&mut self) -> Box<dyn Operation> {
        self.receive(ReceiveKind::Rows)
    }

    fn receive_reply_after_prepare(&mut self) -> Box<dyn Operation> {
        self.receive(ReceiveKind::ReplyAfterPrepare)
    }

    fn wait(&mut self, event: Event) -> Result<()> {
        self.wire.borrow_mut().wait(event)
    }

    fn close(&mut self) -> Result<()> {
        self.wire.borrow_mut().close()
    }
}

/// Writes one command.
struct SendOp<W> {
    wire: Rc<RefCell<W>>,
    command: Command,
    done: bool,
    cancelled: bool,
}

impl<W: Wire> Operation for SendOp<W> {
    fn resume(&mut self, _sink: &mut dyn ReplyProcessor) -> Result<bool> {
        if self.cancelled {
            return Err(Error::Cancelled);
        }
        if !self.done {
            self.done = self.wire.borrow_mut().poll_write(&self.command)?;
        }
        Ok(self.done)
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }

    fn waiting_for(&self) -> Option<Event> {
        if self.done || self.cancelled {
            None
        } else {
            Some(Event::Writable)
        }
    }
}

/// Reads one part of a reply.
struct ReceiveOp<W> {
    wire: Rc<RefCell<W>>,
    kind: ReceiveKind,
    columns_seen: bool,
    done: bool,
    cancelled: bool,
}

impl<W: Wire> ReceiveOp<W> {
    /// Handle one message. Returns true when this operation is complete.
    fn handle(&mut self, message: ServerMessage, sink: &mut dyn ReplyProcessor) -> Result<bool> {
        match (self.kind, message) {
            (_, ServerMessage::Notice(notice)) => {
                sink.on_notice(notice);
                Ok(false)
            }
            (_, ServerMessage::Error(err)) => {
                sink.on_server_error(err);
                Ok(true)
            }

            (ReceiveKind::Reply | ReceiveKind::ReplyAfterPrepare, ServerMessage::Ok(msg)) => {
                sink.on_ok(&msg);
                Ok(true)
            }
            (ReceiveKind::Reply | ReceiveKind::ReplyAfterPrepare, ServerMessage::StmtExecuteOk) => {
                sink.on_execute_ok();
                Ok(true)
            }
            (ReceiveKind::Reply, ServerMessage::FetchDoneMoreResultsets) => {
                // Multi-statement reply whose first part had no result set
                sink.on_statement_boundary(true, true);
                Ok(true)
            }

            (ReceiveKind::Metadata, ServerMessage::ColumnMetaData(column)) => {
                self.columns_seen = true;
                sink.on_column(column);
                Ok(false)
            }
            (ReceiveKind::Metadata, message) if self.columns_seen => {
                // First message after the metadata belongs to the row phase
                self.wire.borrow_mut().unread(message);
                Ok(true)
            }
            (
                ReceiveKind::Metadata,
                ServerMessage::FetchDoneMoreResultsets | ServerMessage::FetchDoneMoreOutParams,
            ) => {
                // This part carried no result set, another one follows
                sink.on_statement_boundary(true, true);
                Ok(true)
            }
            (ReceiveKind::Metadata, ServerMessage::StmtExecuteOk) => {
                sink.on_execute_ok();
                Ok(true)
            }
            (ReceiveKind::Metadata, ServerMessage::Ok(msg)) => {
                sink.on_ok(&msg);
                Ok(true)
            }
            (ReceiveKind::Metadata, ServerMessage::FetchDone) => {
                // Empty result without metadata; the closing reply follows
                Ok(true)
            }

            (ReceiveKind::Rows, ServerMessage::Row(row)) => {
                sink.on_row(row);
                Ok(false)
            }
            (ReceiveKind::Rows, ServerMessage::FetchDone) => {
                sink.on_statement_boundary(true, false);
                Ok(true)
            }
            (
                ReceiveKind::Rows,
                ServerMessage::FetchDoneMoreResultsets | ServerMessage::FetchDoneMoreOutParams,
            ) => {
                sink.on_statement_boundary(true, true);
                Ok(true)
            }
            (ReceiveKind::Rows, ServerMessage::FetchSuspended) => {
                sink.on_statement_boundary(false, false);
                Ok(true)
            }

            (kind, message) => Err(Error::Protocol(format!(
                "unexpected {} while receiving {:?}",
                message.name(),
                kind
            ))),
        }
    }
}

impl<W: Wire> Operation for ReceiveOp<W> {
    fn resume(&mut self, sink: &mut dyn ReplyProcessor) -> Result<bool> {
        if self.cancelled {
            return Err(Error::Cancelled);
        }
        while !self.done {
            let message = self.wire.borrow_mut().poll_message()?;
            let Some(message) = message else {
                return Ok(false);
            };
            self.done = self.handle(message, sink)?;
        }
        Ok(true)
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }

    fn waiting_for(&self) -> Option<Event> {
        if self.done || self.cancelled {
            None
        } else {
            Some(Event::Readable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::scripted::ScriptedWire;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl ReplyProcessor for Recorder {
        fn on_ok(&mut self, message: &str) {
            self.events.push(format!("ok:{message}"));
        }
        fn on_execute_ok(&mut self) {
            self.events.push("execute_ok".into());
        }
        fn on_column(&mut self, column: ColumnInfo) {
            self.events.push(format!("column:{}", column.name));
        }
        fn on_row(&mut self, row: Row) {
            self.events.push(format!("row:{}", row.len()));
        }
        fn on_statement_boundary(&mut self, end_of_data: bool, more_results: bool) {
            self.events
                .push(format!("boundary:{end_of_data}:{more_results}"));
        }
        fn on_notice(&mut self, _notice: Notice) {
            self.events.push("notice".into());
        }
        fn on_server_error(&mut self, error: ServerError) {
            self.events.push(format!("error:{}", error.code));
        }
    }

    fn drive(op: &mut Box<dyn Operation>, sink: &mut Recorder) -> bool {
        op.resume(sink).unwrap()
    }

    #[test]
    fn metadata_stops_before_rows() {
        let wire = ScriptedWire::new()
            .result_set(&["a", "b"], &[&["1", "2"]])
            .fetch_done()
            .execute_ok();
        let mut xp = XProtocol::new(wire);
        let mut sink = Recorder::default();

        let mut meta = xp.receive_metadata();
        assert!(drive(&mut meta, &mut sink));
        assert_eq!(sink.events, vec!["column:a", "column:b"]);

        let mut rows = xp.receive_rows();
        assert!(drive(&mut rows, &mut sink));
        let mut fin = xp.receive_reply_after_prepare();
        assert!(drive(&mut fin, &mut sink));
        assert_eq!(
            &sink.events[2..],
            &["row:2", "boundary:true:false", "execute_ok"]
        );
    }

    #[test]
    fn metadata_accepts_empty_part() {
        let wire = ScriptedWire::new()
            .fetch_done_more_resultsets()
            .result_set(&["a"], &[&["1"]]);
        let mut xp = XProtocol::new(wire);
        let mut sink = Recorder::default();

        let mut meta = xp.receive_metadata();
        assert!(drive(&mut meta, &mut sink));
        assert_eq!(sink.events, vec!["boundary:true:true"]);

        let mut meta = xp.receive_metadata();
        assert!(drive(&mut meta, &mut sink));
        assert_eq!(&sink.events[1..], &["column:a"]);
    }

    #[test]
    fn stalled_receive_reports_event() {
        let wire = ScriptedWire::new().stall().execute_ok();
        let mut xp = XProtocol::new(wire);
        let mut sink = Recorder::default();

        let mut op = xp.receive_reply();
        assert!(!drive(&mut op, &mut sink));
        assert_eq!(op.waiting_for(), Some(Event::Readable));
        xp.wait(Event::Readable).unwrap();
        assert!(drive(&mut op, &mut sink));
        assert_eq!(op.waiting_for(), None);
        assert_eq!(sink.events, vec!["execute_ok"]);
    }

    #[test]
    fn unexpected_message_is_protocol_error() {
        let wire = ScriptedWire::new().push(ServerMessage::Row(Row::default()));
        let mut xp = XProtocol::new(wire);
        let mut sink = Recorder::default();
        let mut op = xp.receive_reply();
        assert!(matches!(op.resume(&mut sink), Err(Error::Protocol(_))));
    }

    #[test]
    fn cancelled_operation_fails() {
        let wire = ScriptedWire::new().execute_ok();
        let mut xp = XProtocol::new(wire);
        let mut sink = Recorder::default();
        let mut op = xp.receive_reply();
        op.cancel();
        assert!(matches!(op.resume(&mut sink), Err(Error::Cancelled)));
        assert_eq!(op.waiting_for(), None);
    }
}
