//! X Protocol framing.
//!
//! Every message on the wire is `length (u32, little-endian) | type (u8) | payload`.
//! `length` counts the type byte and the payload, not itself.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::command::{Command, ViewAction};
use crate::error::{Error, Result};

/// Size of the frame header.
pub const HEADER_LEN: usize = 5;

/// Largest frame accepted from or sent to the server.
pub const MAX_FRAME_LEN: u32 = 1 << 30;

/// Server → client message types.
pub mod server_msg {
    pub const OK: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const CONN_CAPABILITIES: u8 = 2;
    pub const SESS_AUTHENTICATE_CONTINUE: u8 = 3;
    pub const SESS_AUTHENTICATE_OK: u8 = 4;
    pub const NOTICE: u8 = 11;
    pub const RESULTSET_COLUMN_META_DATA: u8 = 12;
    pub const RESULTSET_ROW: u8 = 13;
    pub const RESULTSET_FETCH_DONE: u8 = 14;
    pub const RESULTSET_FETCH_SUSPENDED: u8 = 15;
    pub const RESULTSET_FETCH_DONE_MORE_RESULTSETS: u8 = 16;
    pub const SQL_STMT_EXECUTE_OK: u8 = 17;
    pub const RESULTSET_FETCH_DONE_MORE_OUT_PARAMS: u8 = 18;
    pub const COMPRESSION: u8 = 19;
}

/// Client → server message types.
pub mod client_msg {
    pub const CON_CAPABILITIES_GET: u8 = 1;
    pub const CON_CAPABILITIES_SET: u8 = 2;
    pub const CON_CLOSE: u8 = 3;
    pub const SESS_AUTHENTICATE_START: u8 = 4;
    pub const SESS_AUTHENTICATE_CONTINUE: u8 = 5;
    pub const SESS_RESET: u8 = 6;
    pub const SESS_CLOSE: u8 = 7;
    pub const SQL_STMT_EXECUTE: u8 = 12;
    pub const CRUD_FIND: u8 = 17;
    pub const CRUD_INSERT: u8 = 18;
    pub const CRUD_UPDATE: u8 = 19;
    pub const CRUD_DELETE: u8 = 20;
    pub const EXPECT_OPEN: u8 = 24;
    pub const EXPECT_CLOSE: u8 = 25;
    pub const CRUD_CREATE_VIEW: u8 = 30;
    pub const CRUD_MODIFY_VIEW: u8 = 31;
    pub const CRUD_DROP_VIEW: u8 = 32;
    pub const PREPARE_PREPARE: u8 = 40;
    pub const PREPARE_EXECUTE: u8 = 41;
    pub const PREPARE_DEALLOCATE: u8 = 42;
    pub const CURSOR_OPEN: u8 = 43;
    pub const CURSOR_CLOSE: u8 = 44;
    pub const CURSOR_FETCH: u8 = 45;
    pub const COMPRESSION: u8 = 46;
}

/// Little-endian 32-bit unsigned integer for zerocopy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct U32LE([u8; 4]);

impl U32LE {
    /// Create a new U32LE from a native u32.
    pub const fn new(value: u32) -> Self {
        Self(value.to_le_bytes())
    }

    /// Get the native u32 value.
    pub const fn get(self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

/// Frame header as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct FrameHeader {
    pub length: U32LE,
    pub msg_type: u8,
}

impl FrameHeader {
    /// Header for a payload of `payload_len` bytes.
    pub fn new(msg_type: u8, payload_len: usize) -> Result<Self> {
        let length = u32::try_from(payload_len)
            .ok()
            .and_then(|n| n.checked_add(1))
            .filter(|n| *n <= MAX_FRAME_LEN)
            .ok_or_else(|| Error::Protocol(format!("frame too large: {} bytes", payload_len)))?;
        Ok(Self {
            length: U32LE::new(length),
            msg_type,
        })
    }

    /// Parse and validate a header from the first [`HEADER_LEN`] bytes.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let Some(bytes) = data.get(..HEADER_LEN) else {
            return Err(Error::Protocol(format!(
                "frame header: buffer too short: {} < {}",
                data.len(),
                HEADER_LEN
            )));
        };
        let header = FrameHeader::read_from_bytes(bytes)
            .map_err(|e| Error::Protocol(format!("frame header: {e:?}")))?;
        let length = header.length.get();
        if length == 0 {
            return Err(Error::Protocol("frame header: zero length".into()));
        }
        if length > MAX_FRAME_LEN {
            return Err(Error::Protocol(format!(
                "frame header: length {} exceeds {}",
                length, MAX_FRAME_LEN
            )));
        }
        Ok(header)
    }

    /// Number of payload bytes following the header.
    pub fn payload_len(&self) -> usize {
        self.length.get().saturating_sub(1) as usize
    }
}

/// Client message type used to send a command.
pub fn command_type(command: &Command) -> u8 {
    match command {
        Command::Sql { .. } | Command::Transaction(_) | Command::Admin { .. } => {
            client_msg::SQL_STMT_EXECUTE
        }
        Command::Find { .. } => client_msg::CRUD_FIND,
        Command::Insert { .. } => client_msg::CRUD_INSERT,
        Command::Update { .. } => client_msg::CRUD_UPDATE,
        Command::Delete { .. } => client_msg::CRUD_DELETE,
        Command::View { action, .. } => match action {
            ViewAction::Create => client_msg::CRUD_CREATE_VIEW,
            ViewAction::Modify => client_msg::CRUD_MODIFY_VIEW,
            ViewAction::Drop => client_msg::CRUD_DROP_VIEW,
        },
        Command::PreparedExecute { .. } => client_msg::PREPARE_EXECUTE,
        Command::PrepareDeallocate { .. } => client_msg::PREPARE_DEALLOCATE,
    }
}

/// Frame builder that fills in the length once the payload is written.
pub struct FrameBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> FrameBuilder<'a> {
    /// Start a frame of the given type at the end of `buf`.
    pub fn new(buf: &'a mut Vec<u8>, msg_type: u8) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]); // Placeholder for length
        buf.push(msg_type);
        Self { buf, start }
    }

    /// Payload buffer.
    pub fn buf(&mut self) -> &mut Vec<u8> {
        self.buf
    }

    /// Finish the frame and fill in the length field.
    pub fn finish(self) -> Result<()> {
        let payload_len = self.buf.len() - self.start - HEADER_LEN;
        let msg_type = self.buf.get(self.start + 4).copied().unwrap_or_default();
        let header = FrameHeader::new(msg_type, payload_len)?;
        if let Some(slot) = self.buf.get_mut(self.start..self.start + HEADER_LEN) {
            slot.copy_from_slice(header.as_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let header = FrameHeader::new(client_msg::SQL_STMT_EXECUTE, 9).unwrap();
        assert_eq!(header.as_bytes(), &[10, 0, 0, 0, 12]);

        let parsed = FrameHeader::parse(&[10, 0, 0, 0, 12, 0xff]).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.payload_len(), 9);
    }

    #[test]
    fn rejects_invalid_headers() {
        assert!(FrameHeader::parse(&[1, 0, 0]).is_err());
        assert!(FrameHeader::parse(&[0, 0, 0, 0, 0]).is_err());
        assert!(FrameHeader::parse(&[0xff, 0xff, 0xff, 0xff, 0]).is_err());
    }

    #[test]
    fn builder_fills_length() {
        let mut buf = vec![0xaa];
        let mut frame = FrameBuilder::new(&mut buf, client_msg::CON_CLOSE);
        frame.buf().extend_from_slice(b"abc");
        frame.finish().unwrap();
        assert_eq!(buf, vec![0xaa, 4, 0, 0, 0, client_msg::CON_CLOSE, b'a', b'b', b'c']);
    }

    #[test]
    fn command_types() {
        assert_eq!(command_type(&Command::sql("SELECT 1")), client_msg::SQL_STMT_EXECUTE);
        assert_eq!(
            command_type(&Command::PrepareDeallocate { stmt_id: 1 }),
            client_msg::PREPARE_DEALLOCATE
        );
    }
}
