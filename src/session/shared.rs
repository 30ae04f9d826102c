//! Shared session state: the transport, the chain and every live statement.

use std::collections::{BTreeMap, VecDeque};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::protocol::message::{ColumnInfo, Notice, NoticePayload, Row, StateChange};
use crate::state::action::{Event, Transport};
use crate::state::chain::{Chain, StmtId};
use crate::state::statement::{State, StatementMachine};

struct Slot {
    machine: StatementMachine,
    /// The caller's handle is gone
    released: bool,
}

pub(crate) struct SessionCore {
    transport: Box<dyn Transport>,
    chain: Chain,
    slots: BTreeMap<StmtId, Slot>,
    next_id: StmtId,
    notices: VecDeque<Notice>,
    current_schema: Option<String>,
    client_id: Option<u64>,
    is_broken: bool,
    closed: bool,
}

fn slot_machine(slots: &mut BTreeMap<StmtId, Slot>, id: StmtId) -> Result<&mut StatementMachine> {
    slots
        .get_mut(&id)
        .map(|slot| &mut slot.machine)
        .ok_or_else(|| Error::Internal(format!("statement {} is gone", id)))
}

impl SessionCore {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            chain: Chain::new(),
            slots: BTreeMap::new(),
            next_id: 1,
            notices: VecDeque::new(),
            current_schema: None,
            client_id: None,
            is_broken: false,
            closed: false,
        }
    }

    pub fn machine(&self, id: StmtId) -> Result<&StatementMachine> {
        self.slots
            .get(&id)
            .map(|slot| &slot.machine)
            .ok_or_else(|| Error::Internal(format!("statement {} is gone", id)))
    }

    fn machine_mut(&mut self, id: StmtId) -> Result<&mut StatementMachine> {
        slot_machine(&mut self.slots, id)
    }

    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    pub fn pending(&self) -> usize {
        self.chain.len()
    }

    pub fn current_schema(&self) -> Option<&str> {
        self.current_schema.as_deref()
    }

    pub fn client_id(&self) -> Option<u64> {
        self.client_id
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    /// Create a statement at the tail of the chain.
    pub fn register(&mut self, command: Command) -> Result<StmtId> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        if self.is_broken {
            return Err(Error::InvalidState("connection is broken".into()));
        }
        let id = self.next_id;
        self.next_id += 1;
        tracing::trace!(id, kind = command.kind(), "statement created");
        self.slots.insert(
            id,
            Slot {
                machine: StatementMachine::new(command),
                released: false,
            },
        );
        self.chain.register(id);
        Ok(id)
    }

    /// The caller dropped its handle.
    ///
    /// Whatever the statement still has to read is discarded the next time
    /// something drives it.
    pub fn release(&mut self, id: StmtId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.released = true;
            slot.machine.set_discard();
            if slot.machine.is_completed() {
                self.chain.deregister(id);
            }
        }
        self.reap(id);
    }

    fn reap(&mut self, id: StmtId) {
        if !self.chain.contains(id) && self.slots.get(&id).is_some_and(|slot| slot.released) {
            self.slots.remove(&id);
            tracing::trace!(id, "statement reaped");
        }
    }

    /// Run `f` against statement `id`, keeping the books whatever it returns.
    ///
    /// A failure forces the statement into `State::Error` and, if the wire
    /// position is lost, marks the session broken. Forwarded notices are
    /// applied and a completed statement leaves the chain.
    fn guarded<T>(&mut self, id: StmtId, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = f(self);
        if let Err(e) = &result {
            if let Some(slot) = self.slots.get_mut(&id) {
                slot.machine.fail();
            }
            if e.is_connection_broken() {
                self.is_broken = true;
            }
            tracing::debug!(id, error = %e, "statement failed");
        }
        self.collect_notices(id);
        if self.slots.get(&id).is_some_and(|slot| slot.machine.is_completed()) {
            self.chain.deregister(id);
            self.reap(id);
        }
        result
    }

    fn collect_notices(&mut self, id: StmtId) {
        let Some(slot) = self.slots.get_mut(&id) else {
            return;
        };
        for notice in slot.machine.take_forwarded() {
            if let NoticePayload::SessionStateChanged(change) = &notice.payload {
                match change {
                    StateChange::CurrentSchema(schema) => {
                        self.current_schema = Some(schema.clone());
                    }
                    StateChange::ClientIdAssigned(client_id) => {
                        self.client_id = Some(*client_id);
                    }
                    _ => {}
                }
            }
            self.notices.push_back(notice);
        }
    }

    /// Make progress on statement `id` without blocking.
    pub fn continue_progress(&mut self, id: StmtId) -> Result<bool> {
        self.guarded(id, |core| core.progress(id))
    }

    fn progress(&mut self, id: StmtId) -> Result<bool> {
        if self.machine(id)?.is_completed() {
            return Ok(true);
        }
        if self.closed {
            return Err(Error::SessionClosed);
        }
        if self.is_broken {
            // The wire position is unknown; any read could belong to another statement
            return Err(Error::InvalidState("connection is broken".into()));
        }

        if self.machine(id)?.state() == State::Wait {
            // Commands go on the wire in registration order
            if let Some(pred) = self.chain.predecessor(id) {
                if !self.machine(pred)?.has_sent() {
                    self.continue_progress(pred)?;
                    return Ok(false);
                }
            }
            let Self {
                transport, slots, ..
            } = self;
            let machine = slot_machine(slots, id)?;
            machine.begin_send(transport.as_mut())?;
            if machine.is_completed() {
                return Ok(true);
            }
        }

        if self.machine(id)?.state() == State::Send {
            let machine = self.machine_mut(id)?;
            if !machine.poll_op()? {
                return Ok(false);
            }
            machine.finish_send();
            return Ok(machine.is_completed());
        }

        if !self.machine(id)?.has_op() {
            // Replies come off the wire in registration order
            if !self.drain_predecessors(id)? {
                return Ok(false);
            }
            let Self {
                transport, slots, ..
            } = self;
            let machine = slot_machine(slots, id)?;
            machine.coerce_discard();
            machine.dispatch(transport.as_mut())?;
        }

        let machine = self.machine_mut(id)?;
        if !machine.poll_op()? {
            return Ok(false);
        }
        if machine.state() == State::Error {
            machine.clear_op();
            return Ok(true);
        }
        machine.complete_op();
        Ok(machine.is_completed())
    }

    /// Drive every predecessor of `id` until it leaves the chain.
    ///
    /// Returns false if one of them could not be drained during this call.
    fn drain_predecessors(&mut self, id: StmtId) -> Result<bool> {
        while let Some(pred) = self.chain.predecessor(id) {
            self.continue_progress(pred)?;
            if self.chain.contains(pred) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Event blocking the first unfinished operation at or before `id`.
    fn pending_event(&self, id: StmtId) -> Option<Event> {
        for cid in self.chain.ids() {
            if let Some(event) = self.slots.get(&cid).and_then(|s| s.machine.waiting_for()) {
                return Some(event);
            }
            if cid == id {
                break;
            }
        }
        None
    }

    fn blocked_by_predecessor(&self, id: StmtId) -> bool {
        let mut cursor = self.chain.predecessor(id);
        while let Some(pred) = cursor {
            if self
                .slots
                .get(&pred)
                .is_some_and(|s| s.machine.has_pending_results())
            {
                return true;
            }
            cursor = self.chain.predecessor(pred);
        }
        false
    }

    fn wait_event(&mut self, event: Event) -> Result<()> {
        let result = self.transport.wait(event);
        if let Err(e) = &result {
            if e.is_connection_broken() {
                self.is_broken = true;
            }
        }
        result
    }

    /// Block until `id` completes or stops at a result set the caller has
    /// to read.
    pub fn wait(&mut self, id: StmtId) -> Result<()> {
        loop {
            if self.continue_progress(id)? {
                return Ok(());
            }
            if self.machine(id)?.is_stable() {
                return Ok(());
            }
            match self.pending_event(id) {
                Some(event) => self.wait_event(event)?,
                None if self.blocked_by_predecessor(id) => return Err(Error::ReplyBlocked),
                None => {}
            }
        }
    }

    /// Drive `id` until its command is on the wire.
    pub fn send(&mut self, id: StmtId) -> Result<()> {
        while !self.machine(id)?.has_sent() {
            if self.continue_progress(id)? {
                break;
            }
            if self.machine(id)?.has_sent() {
                break;
            }
            if let Some(event) = self.pending_event(id) {
                self.wait_event(event)?;
            }
        }
        Ok(())
    }

    pub fn cancel(&mut self, id: StmtId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.machine.cancel();
        }
    }

    pub fn has_more_results(&mut self, id: StmtId) -> Result<bool> {
        self.wait(id)?;
        Ok(matches!(self.machine(id)?.state(), State::Rows | State::Next))
    }

    pub fn discard_remaining(&mut self, id: StmtId) -> Result<()> {
        let machine = self.machine(id)?;
        if machine.is_discarding() || machine.state() == State::Error {
            return Ok(());
        }
        self.wait(id)?;
        self.machine_mut(id)?.discard()
    }

    pub fn next_result(&mut self, id: StmtId) -> Result<bool> {
        if !self.has_more_results(id)? {
            return Ok(false);
        }
        let machine = self.machine_mut(id)?;
        if machine.state() != State::Next || machine.has_buffered_rows() {
            return Ok(false);
        }
        machine.advance()?;
        self.wait(id)?;
        Ok(self.machine(id)?.state() == State::Rows)
    }

    pub fn columns(&mut self, id: StmtId) -> Result<Vec<ColumnInfo>> {
        self.wait(id)?;
        Ok(self.machine(id)?.columns().to_vec())
    }

    /// Next row of the current result set, reading another batch if needed.
    pub fn fetch_row(&mut self, id: StmtId) -> Result<Option<Row>> {
        self.wait(id)?;
        loop {
            let machine = self.machine_mut(id)?;
            if let Some(row) = machine.pop_row() {
                return Ok(Some(row));
            }
            match machine.state() {
                State::Error => {
                    return Err(machine.server_error().map_or_else(
                        || Error::InvalidState("statement failed".into()),
                        Error::Server,
                    ));
                }
                State::Rows if !machine.has_op() && !machine.is_discarding() => {
                    self.read_batch(id)?;
                }
                _ => return Ok(None),
            }
        }
    }

    fn read_batch(&mut self, id: StmtId) -> Result<()> {
        self.guarded(id, |core| {
            let Self {
                transport, slots, ..
            } = core;
            slot_machine(slots, id)?.begin_fetch(transport.as_mut())
        })?;
        while !self.guarded(id, |core| core.fetch_step(id))? {
            match self.machine(id)?.waiting_for() {
                Some(event) => self.wait_event(event)?,
                None => return Err(Error::Internal("row fetch stalled".into())),
            }
        }
        if self.machine(id)?.state() == State::Finish {
            self.wait(id)?;
        }
        Ok(())
    }

    fn fetch_step(&mut self, id: StmtId) -> Result<bool> {
        let machine = self.machine_mut(id)?;
        if !machine.poll_op()? {
            return Ok(false);
        }
        if machine.state() == State::Error {
            machine.clear_op();
        } else {
            machine.complete_op();
        }
        Ok(true)
    }

    /// Drain every statement still in the chain, then close the transport.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if !self.is_broken {
            for id in self.chain.ids() {
                if !self.chain.contains(id) {
                    continue;
                }
                if let Some(slot) = self.slots.get_mut(&id) {
                    slot.machine.set_discard();
                }
                if let Err(e) = self.wait(id) {
                    tracing::warn!(id, error = %e, "failed to drain statement on close");
                    if self.is_broken {
                        break;
                    }
                }
            }
        }
        for id in self.chain.ids() {
            if let Some(slot) = self.slots.get_mut(&id) {
                if !slot.machine.is_completed() {
                    slot.machine.fail();
                }
            }
            self.chain.deregister(id);
            self.reap(id);
        }
        self.closed = true;
        self.transport.close()
    }
}
