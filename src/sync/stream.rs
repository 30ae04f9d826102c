use std::io::{BufReader, Read, Write};
use std::net::TcpStream;
use std::os::unix::net::UnixStream;

use crate::error::{Error, Result};
use crate::opts::Opts;

/// Blocking connection to the X Plugin.
pub enum Stream {
    Tcp(BufReader<TcpStream>),
    Unix(BufReader<UnixStream>),
}

impl Stream {
    pub fn tcp(stream: TcpStream) -> Self {
        Self::Tcp(BufReader::new(stream))
    }

    pub fn unix(stream: UnixStream) -> Self {
        Self::Unix(BufReader::new(stream))
    }

    /// Open the socket described by `opts`.
    ///
    /// `opts.socket` takes precedence over `opts.host`.
    pub fn connect(opts: &Opts) -> Result<Self> {
        if let Some(path) = &opts.socket {
            let stream = UnixStream::connect(path)?;
            stream.set_read_timeout(opts.read_timeout)?;
            return Ok(Self::unix(stream));
        }
        if opts.host.is_empty() {
            return Err(Error::InvalidUsage("host is empty".into()));
        }
        let tcp = TcpStream::connect((opts.host.as_str(), opts.port))?;
        tcp.set_nodelay(opts.tcp_nodelay)?;
        tcp.set_read_timeout(opts.read_timeout)?;
        Ok(Self::tcp(tcp))
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.read_exact(buf),
            Stream::Unix(r) => r.read_exact(buf),
        }
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().write_all(buf),
            Stream::Unix(r) => r.get_mut().write_all(buf),
        }
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(r) => r.get_mut().flush(),
            Stream::Unix(r) => r.get_mut().flush(),
        }
    }
}
