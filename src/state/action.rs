//! Asynchronous operation contract.
//!
//! Network sends, network receives and whole statements are all activities
//! that may need several calls before they complete. They share the same
//! shape: drive it with a non-blocking call that reports completion, and ask
//! it which event to block on between calls.

use crate::command::Command;
use crate::error::Result;
use crate::protocol::reply::ReplyProcessor;

/// What an unfinished operation is waiting for.
///
/// Callers doing their own I/O multiplexing can poll on this; the session
/// hands it to [`Transport::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The connection has data to read
    Readable,
    /// The connection can accept more bytes
    Writable,
}

/// A child operation created by a [`Transport`].
///
/// A statement owns at most one of these at a time.
pub trait Operation {
    /// Make progress without blocking.
    ///
    /// Returns `Ok(true)` once the operation is complete. Server replies are
    /// delivered to `sink` as they are read. Must not be called again after
    /// it returned `Ok(true)`.
    fn resume(&mut self, sink: &mut dyn ReplyProcessor) -> Result<bool>;

    /// Abandon the operation.
    fn cancel(&mut self);

    /// Event to wait for before calling `resume` again, if any.
    fn waiting_for(&self) -> Option<Event>;
}

/// The protocol transport a session pipelines its statements over.
///
/// One send factory and four receive factories. Each factory returns a fresh
/// [`Operation`]; only one of them is in flight at any time.
pub trait Transport {
    /// Write `command` to the server.
    fn send(&mut self, command: &Command) -> Result<Box<dyn Operation>>;

    /// Receive a plain OK or error reply.
    fn receive_reply(&mut self) -> Box<dyn Operation>;

    /// Receive the column metadata of a result set.
    fn receive_metadata(&mut self) -> Box<dyn Operation>;

    /// Receive one batch of rows, up to the next statement boundary.
    fn receive_rows(&mut self) -> Box<dyn Operation>;

    /// Receive the reply that closes a result set exchange.
    fn receive_reply_after_prepare(&mut self) -> Box<dyn Operation>;

    /// Block until `event` may have become ready.
    fn wait(&mut self, event: Event) -> Result<()>;

    /// Close the connection.
    fn close(&mut self) -> Result<()>;
}

/// An activity driven to completion by repeated `continue_progress` calls.
///
/// Implemented by statements, so a statement can wait on its predecessor
/// the same way it waits on its own network operation.
pub trait AsyncOp {
    /// Make progress without blocking. Returns true once completed.
    fn continue_progress(&mut self) -> Result<bool>;

    /// Block until completed, or until the caller has to act.
    fn wait(&mut self) -> Result<()>;

    /// Cancel the operation currently in flight.
    fn cancel(&mut self);

    /// Event the operation is blocked on, if any.
    fn waiting_for(&self) -> Option<Event>;

    /// Returns true once the operation is completed.
    fn is_completed(&self) -> bool;
}
