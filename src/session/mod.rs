//! Session façade.
//!
//! A [`Session`] pipelines statements over one transport. Every
//! [`execute`](Session::execute) writes its command right away; replies are
//! read later, strictly in execution order, whenever some statement needs
//! them.

mod shared;
mod statement;

use std::cell::RefCell;
use std::rc::Rc;

use crate::command::{Command, Scalar, TransactionOp};
use crate::error::{Error, Result};
use crate::protocol::message::Notice;
use crate::state::action::Transport;

use self::shared::SessionCore;

pub use statement::Statement;

/// MySQL X Protocol session.
///
/// # Example
///
/// ```
/// use zero_mysqlx::protocol::reply::XProtocol;
/// use zero_mysqlx::protocol::scripted::ScriptedWire;
/// use zero_mysqlx::Session;
///
/// let wire = ScriptedWire::new()
///     .execute_ok()
///     .result_set(&["id"], &[&["1"]])
///     .fetch_done()
///     .execute_ok();
/// let session = Session::new(XProtocol::new(wire));
///
/// let insert = session.sql("INSERT INTO t VALUES (1)").unwrap();
/// let select = session.sql("SELECT id FROM t").unwrap();
///
/// // Reading the SELECT drains the INSERT's reply first
/// let rows = select.fetch_all().unwrap();
/// assert_eq!(rows[0].get_str(0).unwrap(), Some("1"));
/// assert!(insert.is_completed());
/// ```
pub struct Session {
    core: Rc<RefCell<SessionCore>>,
}

impl Session {
    /// Create a new session over an established transport.
    ///
    /// The connection behind `transport` must already be authenticated.
    pub fn new<T: Transport + 'static>(transport: T) -> Self {
        Self {
            core: Rc::new(RefCell::new(SessionCore::new(Box::new(transport)))),
        }
    }

    fn with_core<T>(&self, f: impl FnOnce(&mut SessionCore) -> Result<T>) -> Result<T> {
        let mut core = self
            .core
            .try_borrow_mut()
            .map_err(|_e| Error::InvalidState("session is busy".into()))?;
        f(&mut core)
    }

    /// Execute a command.
    ///
    /// The command is written before this returns; its reply is read when
    /// the returned statement, or one executed after it, is driven.
    pub fn execute(&self, command: Command) -> Result<Statement> {
        let id = self.with_core(|core| core.register(command))?;
        let stmt = Statement::new(Rc::downgrade(&self.core), id);
        self.with_core(|core| core.send(id))?;
        Ok(stmt)
    }

    /// Execute an SQL statement.
    pub fn sql(&self, stmt: &str) -> Result<Statement> {
        self.execute(Command::sql(stmt))
    }

    /// Execute an SQL statement with `?` placeholders bound to `args`.
    pub fn sql_with(&self, stmt: &str, args: Vec<Scalar>) -> Result<Statement> {
        self.execute(Command::Sql {
            stmt: stmt.to_string(),
            args,
        })
    }

    fn transaction(&self, op: TransactionOp) -> Result<()> {
        let stmt = self.execute(Command::Transaction(op))?;
        stmt.wait()?;
        match stmt.error() {
            Some(err) => Err(Error::Server(err)),
            None => Ok(()),
        }
    }

    /// Start a transaction.
    pub fn begin(&self) -> Result<()> {
        self.transaction(TransactionOp::Begin)
    }

    pub fn commit(&self) -> Result<()> {
        self.transaction(TransactionOp::Commit)
    }

    pub fn rollback(&self) -> Result<()> {
        self.transaction(TransactionOp::Rollback)
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise.
    pub fn run_transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Session) -> Result<R>,
    {
        self.begin()?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = self.rollback() {
                    tracing::warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Notices that were not about a particular statement, oldest first.
    pub fn take_notices(&self) -> Vec<Notice> {
        self.with_core(|core| Ok(core.take_notices()))
            .unwrap_or_default()
    }

    /// Schema last reported by the server.
    pub fn current_schema(&self) -> Option<String> {
        self.core
            .try_borrow()
            .ok()
            .and_then(|core| core.current_schema().map(str::to_string))
    }

    /// Client id the server assigned to this session.
    pub fn client_id(&self) -> Option<u64> {
        self.core.try_borrow().ok().and_then(|core| core.client_id())
    }

    /// Number of statements whose reply has not been fully read.
    pub fn pending(&self) -> usize {
        self.core.try_borrow().map_or(0, |core| core.pending())
    }

    /// Returns true if an I/O or protocol failure left the connection unusable.
    pub fn is_broken(&self) -> bool {
        self.core.try_borrow().is_ok_and(|core| core.is_broken())
    }

    /// Drain every pending statement and close the connection.
    ///
    /// Unread rows are discarded. Statements executed on this session
    /// report [`Error::SessionClosed`] afterwards.
    pub fn close(self) -> Result<()> {
        self.with_core(|core| core.close())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(mut core) = self.core.try_borrow_mut() {
            if let Err(e) = core.close() {
                tracing::debug!(error = %e, "error closing session");
            }
        }
    }
}
