//! Statement chain registry.
//!
//! Statements that were sent but not fully drained, in submission order.
//! Replies arrive in the same order commands were written, so a statement
//! looks up its predecessor here to find the reply it has to wait behind.
//!
//! The chain stores ids only. Statements themselves live elsewhere.

use std::collections::BTreeMap;

/// Identifier of a statement within its session.
///
/// Ids increase monotonically, so registration order equals id order.
pub type StmtId = u64;

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    prev: Option<StmtId>,
    next: Option<StmtId>,
}

/// Doubly linked list of statement ids.
#[derive(Debug, Default)]
pub struct Chain {
    links: BTreeMap<StmtId, Link>,
    head: Option<StmtId>,
    tail: Option<StmtId>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` at the tail. Its predecessor is the previous tail.
    ///
    /// Registering an id that is already in the chain does nothing.
    pub fn register(&mut self, id: StmtId) {
        if self.links.contains_key(&id) {
            return;
        }
        let prev = self.tail;
        if let Some(link) = prev.and_then(|p| self.links.get_mut(&p)) {
            link.next = Some(id);
        }
        self.links.insert(id, Link { prev, next: None });
        self.tail = Some(id);
        if self.head.is_none() {
            self.head = Some(id);
        }
        tracing::debug!(id, ?prev, "statement registered");
    }

    /// Splice `id` out of the chain. No-op if it is not registered.
    pub fn deregister(&mut self, id: StmtId) {
        let Some(link) = self.links.remove(&id) else {
            return;
        };
        match link.prev.and_then(|p| self.links.get_mut(&p)) {
            Some(prev) => prev.next = link.next,
            None => self.head = link.next,
        }
        match link.next.and_then(|n| self.links.get_mut(&n)) {
            Some(next) => next.prev = link.prev,
            None => self.tail = link.prev,
        }
        tracing::debug!(id, "statement deregistered");
    }

    pub fn predecessor(&self, id: StmtId) -> Option<StmtId> {
        self.links.get(&id).and_then(|l| l.prev)
    }

    pub fn successor(&self, id: StmtId) -> Option<StmtId> {
        self.links.get(&id).and_then(|l| l.next)
    }

    pub fn head(&self) -> Option<StmtId> {
        self.head
    }

    pub fn tail(&self) -> Option<StmtId> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, id: StmtId) -> bool {
        self.links.contains_key(&id)
    }

    /// Registered ids from head to tail.
    pub fn ids(&self) -> Vec<StmtId> {
        let mut ids = Vec::with_capacity(self.links.len());
        let mut cursor = self.head;
        while let Some(id) = cursor {
            ids.push(id);
            cursor = self.successor(id);
        }
        ids
    }
}
