//! A pipelining MySQL X Protocol client core.
//!
//! # Features
//!
//! - **Pipelining**: every statement's command is written immediately; replies
//!   are read later, in order, when somebody needs them
//! - **Sans-I/O state machines**: the statement reply logic never blocks and
//!   never touches a socket
//! - **Pluggable transport**: any [`Transport`](state::Transport), a blocking
//!   socket transport in [`sync`], or a scripted in-memory wire for tests
//!
//! # Example
//!
//! ```no_run
//! use zero_mysqlx::sync::{self, Codec};
//! use zero_mysqlx::Opts;
//!
//! fn run<C: Codec + 'static>(codec: C) -> zero_mysqlx::Result<()> {
//!     let opts = Opts::try_from("mysqlx://app@localhost/shop")?;
//!     let session = sync::connect(opts, codec, |_wire, _opts| Ok(()))?;
//!
//!     let insert = session.sql("INSERT INTO orders (item) VALUES ('pen')")?;
//!     let select = session.sql("SELECT item FROM orders")?;
//!     for row in select.fetch_all()? {
//!         println!("{:?}", row.get_str(0)?);
//!     }
//!     assert!(insert.is_completed());
//!
//!     session.close()
//! }
//! ```

pub mod command;
pub mod diagnostics;
pub mod error;
pub mod opts;
pub mod protocol;
pub mod session;
pub mod state;

#[cfg(feature = "sync")]
pub mod sync;

pub use command::{Command, ReplyShape, Scalar, Target, TransactionOp, ViewAction};
pub use diagnostics::{Diagnostics, Entry, Severity};
pub use error::{Error, Result, ServerError};
pub use opts::Opts;
pub use protocol::message::{ColumnInfo, Notice, Row};
pub use session::{Session, Statement};
pub use state::{AsyncOp, Event, ExecStats, State};
