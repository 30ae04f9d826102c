//! Caller-side statement handle.

use std::cell::RefCell;
use std::rc::Weak;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result, ServerError};
use crate::protocol::message::{ColumnInfo, Row};
use crate::state::action::{AsyncOp, Event};
use crate::state::chain::StmtId;
use crate::state::statement::{ExecStats, State};

use super::shared::SessionCore;

/// A statement executed on a [`Session`](super::Session).
///
/// The handle does not own the session. Once the session is gone, every
/// method returns [`Error::SessionClosed`] and [`is_completed`](Self::is_completed)
/// reports true.
///
/// Dropping the handle discards whatever the statement has not read yet, so
/// later statements are never blocked behind it.
#[derive(Debug)]
pub struct Statement {
    core: Weak<RefCell<SessionCore>>,
    id: StmtId,
}

impl Statement {
    pub(crate) fn new(core: Weak<RefCell<SessionCore>>, id: StmtId) -> Self {
        Self { core, id }
    }

    fn with_core<T>(&self, f: impl FnOnce(&mut SessionCore) -> Result<T>) -> Result<T> {
        let core = self.core.upgrade().ok_or(Error::SessionClosed)?;
        let mut core = core
            .try_borrow_mut()
            .map_err(|_e| Error::InvalidState("session is busy".into()))?;
        f(&mut core)
    }

    /// Statement id, unique within the session.
    pub fn id(&self) -> StmtId {
        self.id
    }

    /// Drive the statement until its command is written.
    ///
    /// [`Session::execute`](super::Session::execute) already does this.
    pub fn send(&self) -> Result<()> {
        self.with_core(|core| core.send(self.id))
    }

    /// Make progress without blocking. Returns true once completed.
    pub fn continue_progress(&self) -> Result<bool> {
        self.with_core(|core| core.continue_progress(self.id))
    }

    /// Block until the statement completes, or stops at a result set.
    ///
    /// Drives every statement executed before this one first. A server
    /// error does not make this fail; check [`diagnostics`](Self::diagnostics).
    ///
    /// # Errors
    ///
    /// Returns `Error::ReplyBlocked` if an earlier statement holds a result
    /// set that was neither read nor discarded.
    pub fn wait(&self) -> Result<()> {
        self.with_core(|core| core.wait(self.id))
    }

    /// Returns true once the reply is fully drained or the statement failed.
    pub fn is_completed(&self) -> bool {
        let Some(core) = self.core.upgrade() else {
            return true;
        };
        let Ok(core) = core.try_borrow() else {
            return false;
        };
        core.machine(self.id).map_or(true, |m| m.is_completed())
    }

    /// Cancel the operation in flight. The session cannot be used afterwards.
    pub fn cancel(&self) {
        if let Some(core) = self.core.upgrade() {
            if let Ok(mut core) = core.try_borrow_mut() {
                core.cancel(self.id);
            }
        }
    }

    /// Event the statement is blocked on, if any.
    pub fn waiting_for(&self) -> Option<Event> {
        let core = self.core.upgrade()?;
        let core = core.try_borrow().ok()?;
        core.machine(self.id).ok().and_then(|m| m.waiting_for())
    }

    /// Skip the rest of this statement's rows, in every remaining result set.
    pub fn discard_remaining(&self) -> Result<()> {
        self.with_core(|core| core.discard_remaining(self.id))
    }

    /// Returns true if a result set is readable or another one follows.
    pub fn has_more_results(&self) -> Result<bool> {
        self.with_core(|core| core.has_more_results(self.id))
    }

    /// Move to the next result set.
    ///
    /// Returns false if there is none, or if rows of the current result set
    /// are still unread.
    pub fn next_result(&self) -> Result<bool> {
        self.with_core(|core| core.next_result(self.id))
    }

    /// Columns of the current result set.
    pub fn columns(&self) -> Result<Vec<ColumnInfo>> {
        self.with_core(|core| core.columns(self.id))
    }

    /// Next row of the current result set.
    pub fn fetch_row(&self) -> Result<Option<Row>> {
        self.with_core(|core| core.fetch_row(self.id))
    }

    /// Remaining rows of the current result set.
    pub fn fetch_all(&self) -> Result<Vec<Row>> {
        self.with_core(|core| {
            let mut rows = Vec::new();
            while let Some(row) = core.fetch_row(self.id)? {
                rows.push(row);
            }
            Ok(rows)
        })
    }

    pub fn diagnostics(&self) -> Result<Diagnostics> {
        self.with_core(|core| Ok(core.machine(self.id)?.diagnostics().clone()))
    }

    /// The server error this statement failed with.
    pub fn error(&self) -> Option<ServerError> {
        self.with_core(|core| Ok(core.machine(self.id)?.server_error()))
            .ok()
            .flatten()
    }

    pub fn stats(&self) -> Result<ExecStats> {
        self.with_core(|core| Ok(core.machine(self.id)?.stats().clone()))
    }

    pub fn state(&self) -> Result<State> {
        self.with_core(|core| Ok(core.machine(self.id)?.state()))
    }
}

impl AsyncOp for Statement {
    fn continue_progress(&mut self) -> Result<bool> {
        Statement::continue_progress(self)
    }

    fn wait(&mut self) -> Result<()> {
        Statement::wait(self)
    }

    fn cancel(&mut self) {
        Statement::cancel(self);
    }

    fn waiting_for(&self) -> Option<Event> {
        Statement::waiting_for(self)
    }

    fn is_completed(&self) -> bool {
        Statement::is_completed(self)
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            if let Ok(mut core) = core.try_borrow_mut() {
                core.release(self.id);
            }
        }
    }
}
