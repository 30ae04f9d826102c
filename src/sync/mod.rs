//! Blocking transport.
//!
//! Frames go over a TCP or Unix socket; encoding message payloads is left to
//! a [`Codec`].

mod stream;
mod wire;

pub use stream::Stream;
pub use wire::{Codec, FramedWire};

use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::reply::XProtocol;
use crate::session::Session;

/// Create a session over an already authenticated wire.
pub fn session<C: Codec + 'static>(wire: FramedWire<C>) -> Session {
    Session::new(XProtocol::new(wire))
}

/// Connect to the X Plugin and open a session.
///
/// `handshake` runs on the fresh wire before any statement is sent; it is
/// where capability negotiation and authentication happen.
pub fn connect<O, C, F>(opts: O, codec: C, handshake: F) -> Result<Session>
where
    O: TryInto<Opts>,
    Error: From<O::Error>,
    C: Codec + 'static,
    F: FnOnce(&mut FramedWire<C>, &Opts) -> Result<()>,
{
    let opts = opts.try_into()?;
    let stream = Stream::connect(&opts)?;
    let mut wire = FramedWire::new(stream, codec);
    handshake(&mut wire, &opts)?;
    Ok(session(wire))
}
