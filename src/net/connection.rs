//! Per-socket connection state.
//!
//! # Responsibilities
//! - Own the socket, its buffer and byte counters
//! - Track the exchange state (Idle → Forwarding | Tunneling)
//! - Hold the counterpart as a token looked up in the arena, never owned
//! - Decide how many buffered bytes may be relayed right now

use std::io::{self, ErrorKind, Write};
use std::net::SocketAddr;
use std::time::Instant;

use mio::net::TcpStream;
use mio::Token;

use crate::error::Result;
use crate::http::{end_of_header_block, Request, Response};
use crate::net::buffer::Buffer;

/// Which side of the proxy a connection faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Upstream,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Upstream => "upstream",
        }
    }
}

/// Exchange state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Awaiting a new request. Initial state and the reset target.
    #[default]
    Idle,
    /// GET in flight.
    Forwarding,
    /// CONNECT established; blind relay until closed.
    Tunneling,
}

/// One proxied socket.
#[derive(Debug)]
pub struct Connection {
    pub(crate) role: Role,
    pub(crate) stream: TcpStream,
    pub(crate) peer: SocketAddr,
    pub(crate) buffer: Buffer,
    pub(crate) state: ConnectionState,
    pub(crate) bytes_read: u64,
    pub(crate) bytes_written: u64,
    pub(crate) counterpart: Option<Token>,
    /// Last parsed request. Client only.
    pub(crate) request: Option<Request>,
    /// Response of the current exchange. Upstream only, GET only.
    pub(crate) response: Option<Response>,
    /// Reading stopped because the buffer is full.
    pub(crate) read_paused: bool,
    /// The peer sent EOF.
    pub(crate) peer_closed: bool,
    pub(crate) last_activity: Instant,
}

impl Connection {
    pub fn client(stream: TcpStream, peer: SocketAddr, capacity: usize) -> Self {
        Self::new(Role::Client, stream, peer, capacity)
    }

    pub fn upstream(stream: TcpStream, peer: SocketAddr, capacity: usize) -> Self {
        Self::new(Role::Upstream, stream, peer, capacity)
    }

    fn new(role: Role, stream: TcpStream, peer: SocketAddr, capacity: usize) -> Self {
        Self {
            role,
            stream,
            peer,
            buffer: Buffer::with_capacity(capacity),
            state: ConnectionState::Idle,
            bytes_read: 0,
            bytes_written: 0,
            counterpart: None,
            request: None,
            response: None,
            read_paused: false,
            peer_closed: false,
            last_activity: Instant::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn counterpart(&self) -> Option<Token> {
        self.counterpart
    }

    /// Whether the buffer front holds an incomplete header block that must
    /// be parsed in place.
    fn awaiting_header(&self) -> bool {
        match (self.role, self.state) {
            (Role::Client, ConnectionState::Idle) => true,
            (Role::Upstream, ConnectionState::Forwarding) => self.response.is_none(),
            _ => false,
        }
    }

    /// Read until the socket would block, the peer closes, or the buffer is
    /// full. A full buffer still waiting on its header block doubles up to
    /// `max_capacity`; any other full buffer pauses reading.
    ///
    /// A client with a GET in flight is not read; its bytes stay in the
    /// socket until the exchange resets to Idle. Its EOF is still noticed so
    /// the pair can be torn down early.
    pub fn fill_buffer(&mut self, max_capacity: usize) -> Result<usize> {
        if self.peer_closed {
            return Ok(0);
        }
        if self.role == Role::Client && self.state == ConnectionState::Forwarding {
            self.detect_close()?;
            return Ok(0);
        }

        let mut total = 0;
        self.read_paused = false;
        loop {
            if self.buffer.is_full() {
                let header_complete =
                    end_of_header_block(self.buffer.filled(), self.buffer.len()).is_some();
                if !self.awaiting_header() || header_complete {
                    self.read_paused = true;
                    break;
                }
                let capacity = self.buffer.grow(max_capacity)?;
                tracing::debug!(
                    role = self.role.as_str(),
                    peer = %self.peer,
                    capacity,
                    "Header block exceeds buffer, growing"
                );
            }

            match self.buffer.read_from(&mut self.stream) {
                Ok(0) => {
                    self.peer_closed = true;
                    break;
                }
                Ok(n) => {
                    self.bytes_read += n as u64;
                    total += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if total > 0 {
            self.last_activity = Instant::now();
        }
        Ok(total)
    }

    /// Peek for EOF without consuming pending bytes.
    fn detect_close(&mut self) -> io::Result<()> {
        let mut probe = [0u8; 1];
        loop {
            match self.stream.peek(&mut probe) {
                Ok(0) => {
                    self.peer_closed = true;
                    return Ok(());
                }
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Write as much of `bytes` as the socket accepts without blocking.
    pub fn write_nonblocking(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < bytes.len() {
            match self.stream.write(&bytes[written..]) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        if written > 0 {
            self.last_activity = Instant::now();
        }
        Ok(written)
    }

    /// Bytes of this connection's buffer the counterpart may send now.
    ///
    /// Upstream bytes are held until the response header is parsed, then
    /// capped so that `bytes_written` never passes header + Content-Length.
    pub fn deliverable(&self) -> usize {
        let len = self.buffer.len();
        match (self.role, self.state) {
            (_, ConnectionState::Idle) => 0,
            (_, ConnectionState::Tunneling) => len,
            (Role::Client, ConnectionState::Forwarding) => len,
            (Role::Upstream, ConnectionState::Forwarding) => match &self.response {
                None => 0,
                Some(response) => match response.remaining(self.bytes_written) {
                    Some(remaining) => len.min(usize::try_from(remaining).unwrap_or(usize::MAX)),
                    None => len,
                },
            },
        }
    }

    /// Whether the exchange framed by the current response has been fully
    /// written to the counterpart.
    pub fn is_write_complete(&self) -> bool {
        self.response
            .as_ref()
            .is_some_and(|response| response.is_complete(self.bytes_written))
    }

    /// Closed by the peer with nothing left to deliver.
    pub fn is_spent(&self) -> bool {
        self.peer_closed && self.deliverable() == 0
    }

    /// Start a fresh exchange in `state`, dropping counters, response and
    /// buffered bytes.
    pub fn reset(&mut self, state: ConnectionState) {
        self.state = state;
        self.response = None;
        self.bytes_read = 0;
        self.bytes_written = 0;
        self.read_paused = false;
        self.buffer.clear();
    }
}
