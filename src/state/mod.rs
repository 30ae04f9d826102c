//! Statement state machines.
//!
//! The machines here never block. They create child operations through a
//! [`Transport`](action::Transport) and report whether they are done; the
//! session decides when to drive which statement.

pub mod action;
pub mod chain;
pub mod statement;

pub use action::{AsyncOp, Event, Operation, Transport};
pub use chain::{Chain, StmtId};
pub use statement::{ExecStats, State, StatementMachine};
