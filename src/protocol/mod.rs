//! MySQL X Protocol types.
//!
//! # Structure
//!
//! - `frame`: Frame header and message type ids
//! - `message`: Decoded server messages
//! - `reply`: Reply callbacks and the transport built on a message wire
//! - `scripted`: In-memory wire for tests

pub mod frame;
pub mod message;
pub mod reply;
pub mod scripted;

pub use message::{ColumnInfo, Notice, NoticePayload, NoticeScope, Row, ServerMessage, StateChange};
pub use reply::{ReceiveKind, ReplyProcessor, Wire, XProtocol};
