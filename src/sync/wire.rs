//! Blocking framed wire.

use crate::command::Command;
use crate::error::Result;
use crate::protocol::frame::{FrameBuilder, FrameHeader, HEADER_LEN, client_msg, command_type};
use crate::protocol::message::ServerMessage;
use crate::protocol::reply::Wire;
use crate::state::action::Event;

use super::stream::Stream;

/// Message payload encoding.
///
/// Framing is done by [`FramedWire`]; a codec only turns commands into
/// payload bytes and payload bytes into messages.
pub trait Codec {
    /// Append the payload of `command` to `buf`.
    fn encode(&mut self, command: &Command, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode the payload of a server frame.
    fn decode(&mut self, msg_type: u8, payload: &[u8]) -> Result<ServerMessage>;
}

/// [`Wire`] over a blocking [`Stream`].
///
/// Reads and writes always complete before returning, so operations built on
/// it never report an [`Event`] to wait for.
pub struct FramedWire<C> {
    stream: Stream,
    codec: C,
    read_buffer: Vec<u8>,
    write_buffer: Vec<u8>,
    pushed_back: Option<ServerMessage>,
}

impl<C: Codec> FramedWire<C> {
    pub fn new(stream: Stream, codec: C) -> Self {
        Self {
            stream,
            codec,
            read_buffer: Vec::new(),
            write_buffer: Vec::new(),
            pushed_back: None,
        }
    }

    /// Read one frame into the read buffer. Returns the message type.
    fn fill_frame(&mut self) -> Result<u8> {
        let mut header = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header)?;
        let header = FrameHeader::parse(&header)?;
        self.read_buffer.clear();
        self.read_buffer.resize(header.payload_len(), 0);
        self.stream.read_exact(&mut self.read_buffer)?;
        tracing::trace!(msg_type = header.msg_type, len = self.read_buffer.len(), "frame read");
        Ok(header.msg_type)
    }

    /// Read one raw frame, e.g. during the authentication exchange.
    pub fn read_frame(&mut self) -> Result<(u8, &[u8])> {
        let msg_type = self.fill_frame()?;
        Ok((msg_type, &self.read_buffer))
    }

    /// Write one raw frame and flush.
    pub fn write_frame(&mut self, msg_type: u8, payload: &[u8]) -> Result<()> {
        self.write_buffer.clear();
        let mut frame = FrameBuilder::new(&mut self.write_buffer, msg_type);
        frame.buf().extend_from_slice(payload);
        frame.finish()?;
        self.stream.write_all(&self.write_buffer)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn codec_mut(&mut self) -> &mut C {
        &mut self.codec
    }
}

impl<C: Codec> Wire for FramedWire<C> {
    fn poll_message(&mut self) -> Result<Option<ServerMessage>> {
        if let Some(message) = self.pushed_back.take() {
            return Ok(Some(message));
        }
        let msg_type = self.fill_frame()?;
        let message = self.codec.decode(msg_type, &self.read_buffer)?;
        Ok(Some(message))
    }

    fn unread(&mut self, message: ServerMessage) {
        self.pushed_back = Some(message);
    }

    fn poll_write(&mut self, command: &Command) -> Result<bool> {
        self.write_buffer.clear();
        let mut frame = FrameBuilder::new(&mut self.write_buffer, command_type(command));
        self.codec.encode(command, frame.buf())?;
        frame.finish()?;
        self.stream.write_all(&self.write_buffer)?;
        self.stream.flush()?;
        tracing::trace!(kind = command.kind(), len = self.write_buffer.len(), "frame written");
        Ok(true)
    }

    fn wait(&mut self, _event: Event) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.write_frame(client_msg::CON_CLOSE, &[])
    }
}
